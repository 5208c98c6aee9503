//! Response bodies.

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::AppResult;
use crate::models::{Appointment, Patient, PatientId, Role, User, UserId};

/// `{"status": "success", "results"?, "message"?, "data": {..}}`
#[derive(Serialize)]
pub struct Success {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    data: Map<String, Value>,
}

impl Success {
    pub fn new() -> Self {
        Self {
            status: "success",
            results: None,
            message: None,
            data: Map::new(),
        }
    }

    /// Adds `name` to the data object.
    pub fn with(mut self, name: &str, value: impl Serialize) -> AppResult<Self> {
        let value = serde_json::to_value(value).map_err(anyhow::Error::from)?;
        self.data.insert(name.to_string(), value);
        Ok(self)
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// A single named record.
    pub fn item(name: &str, value: impl Serialize) -> AppResult<Self> {
        Self::new().with(name, value)
    }

    /// A named list, with its length as `results`.
    pub fn list<T: Serialize>(name: &str, items: &[T]) -> AppResult<Self> {
        let mut body = Self::new().with(name, items)?;
        body.results = Some(items.len());
        Ok(body)
    }
}

impl IntoResponse for Success {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// An account as shown to clients: no password hash, no reset token.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub active: bool,
    pub patient: Option<PatientId>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            role: user.role,
            active: user.active,
            patient: user.patient,
            created_at: user.created_at,
        }
    }
}

pub fn user_views(users: &[User]) -> Vec<UserView> {
    users.iter().map(UserView::from).collect()
}

/// A patient with its age on the day of the request.
#[derive(Debug, Serialize)]
pub struct PatientView {
    #[serde(flatten)]
    pub patient: Patient,
    pub age: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointments: Option<Vec<Appointment>>,
}

impl PatientView {
    pub fn new(patient: Patient, appointments: Option<Vec<Appointment>>) -> Self {
        let age = patient.age_on(Utc::now().date_naive());
        Self {
            patient,
            age,
            appointments,
        }
    }
}

pub fn patient_views(patients: Vec<Patient>) -> Vec<PatientView> {
    patients.into_iter().map(|p| PatientView::new(p, None)).collect()
}

/// Body of the signup, signin and password reset responses.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub user: UserView,
    pub token: String,
}

impl AuthResponse {
    pub fn new(message: &'static str, user: &User, token: String) -> Self {
        Self {
            status: "success",
            message,
            user: UserView::from(user),
            token,
        }
    }
}
