//! Data model

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter};
use uuid::Uuid;

use crate::db::Document;
use crate::utils::password_utils::PWHash;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Display,
        )]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

id_type!(
    /// Unique identifier of a login account
    UserId
);
id_type!(PatientId);
id_type!(AppointmentId);
id_type!(HistoryId);
id_type!(InvoiceId);
id_type!(AuditId);

/// Role of an account. Every access decision is keyed on it.
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, EnumIter, AsRefStr, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    #[display("admin")]
    Admin,
    #[display("staff")]
    Staff,
    #[display("doctor")]
    Doctor,
    #[display("user")]
    User,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, Display)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    #[default]
    #[display("pending")]
    Pending,
    #[display("confirmed")]
    Confirmed,
    #[display("completed")]
    Completed,
    #[display("cancelled")]
    Cancelled,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BillingStatus {
    Pending,
    Paid,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[default]
    Pending,
    Paid,
}

/// The authenticated caller of a request, resolved from its bearer token.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
    pub patient: Option<PatientId>,
}

/// A login account.
///
/// The password hash and the reset token are persisted with the document but
/// never leave the service: responses go through `UserView`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub password: PWHash,
    pub role: Role,
    pub active: bool,
    #[serde(default)]
    pub patient: Option<PatientId>,
    #[serde(default)]
    pub password_reset_token: Option<String>,
    #[serde(default)]
    pub password_reset_expires: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role,
            patient: self.patient,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: PatientId,
    pub first_name: String,
    pub last_name: String,
    pub dob: NaiveDate,
    pub gender: Gender,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    /// Login account of the patient, when one exists.
    pub user: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Age in whole years on `today`.
    pub fn age_on(&self, today: NaiveDate) -> u32 {
        let mut years = today.year() - self.dob.year();
        if (today.month(), today.day()) < (self.dob.month(), self.dob.day()) {
            years -= 1;
        }
        years.max(0) as u32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: AppointmentId,
    pub date: DateTime<Utc>,
    pub reason: String,
    pub patient: PatientId,
    /// Doctor in charge. Only this account may move the status.
    pub assigned_to: UserId,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MedicalHistory {
    pub id: HistoryId,
    pub patient: PatientId,
    pub diagnosis: String,
    pub treatment: String,
    pub medications: Vec<String>,
    pub date: DateTime<Utc>,
    /// Unset until an invoice bills this entry.
    pub billing_status: Option<BillingStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceItem {
    pub name: String,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: InvoiceId,
    pub patient: PatientId,
    pub medical_history: HistoryId,
    pub issued_by: UserId,
    pub issued_to: Option<UserId>,
    pub services: Vec<ServiceItem>,
    pub total_amount: f64,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Kind of entity an audit entry points at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
pub enum EntityKind {
    User,
    Patient,
    Appointment,
    MedicalHistory,
    Invoice,
}

/// Who performed an audited action. `role` is `"system"` and `id` is null
/// when nobody was authenticated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActorSnapshot {
    pub id: Option<UserId>,
    pub role: String,
}

impl ActorSnapshot {
    pub const SYSTEM_ROLE: &'static str = "system";

    pub fn of(actor: Option<&Actor>) -> Self {
        match actor {
            Some(actor) => Self {
                id: Some(actor.id),
                role: actor.role.to_string(),
            },
            None => Self {
                id: None,
                role: Self::SYSTEM_ROLE.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditTarget {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub id: Option<Uuid>,
}

/// One audited action. Written once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: AuditId,
    pub action: String,
    pub user: ActorSnapshot,
    pub target: AuditTarget,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A message handed to the mailer, kept in the outbox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMail {
    pub id: Uuid,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Document for User {
    const COLLECTION: &'static str = "users";
    fn key(&self) -> Uuid {
        self.id.into()
    }
}

impl Document for Patient {
    const COLLECTION: &'static str = "patients";
    fn key(&self) -> Uuid {
        self.id.into()
    }
}

impl Document for Appointment {
    const COLLECTION: &'static str = "appointments";
    fn key(&self) -> Uuid {
        self.id.into()
    }
}

impl Document for MedicalHistory {
    const COLLECTION: &'static str = "medical_history";
    fn key(&self) -> Uuid {
        self.id.into()
    }
}

impl Document for Invoice {
    const COLLECTION: &'static str = "invoices";
    fn key(&self) -> Uuid {
        self.id.into()
    }
}

impl Document for AuditLog {
    const COLLECTION: &'static str = "audit_logs";
    fn key(&self) -> Uuid {
        self.id.into()
    }
}

impl Document for OutgoingMail {
    const COLLECTION: &'static str = "outbox";
    fn key(&self) -> Uuid {
        self.id
    }
}
