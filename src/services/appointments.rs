//! Appointment scheduling: daily capacity per doctor, and status changes by
//! the assigned doctor

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use log::info;
use serde::Deserialize;
use serde_json::json;

use crate::authorization::Operation;
use crate::consts::{DEFAULT_APPOINTMENT_REASON, MAX_DAILY_APPOINTMENTS};
use crate::db::Filter;
use crate::error::{AppError, AppResult};
use crate::models::{
    Actor, Appointment, AppointmentId, AppointmentStatus, EntityKind, Gender, Patient, PatientId,
    Role, User, UserId,
};
use crate::services::patients::{Contact, NewPatient};
use crate::services::{invalid, Service};
use crate::utils::validation::TextInput;

/// Patient part of an appointment request. Email or phone identifies an
/// existing patient; the other fields are only needed to create one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientDetails {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub dob: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAppointment {
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
    pub assigned_to: UserId,
    pub patient: PatientDetails,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentUpdate {
    pub date: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub assigned_to: Option<UserId>,
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: AppointmentStatus,
}

/// Local-time calendar day containing `date`, as an inclusive UTC range
/// ending one millisecond before the next midnight.
pub fn day_window(date: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let day = date.with_timezone(&Local).date_naive();
    let start = local_midnight(day);
    let end = local_midnight(day + Duration::days(1)) - Duration::milliseconds(1);
    (start, end)
}

pub(crate) fn local_midnight(day: NaiveDate) -> DateTime<Utc> {
    let midnight = NaiveDateTime::from(day);
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
        // Midnight skipped by a DST change
        .unwrap_or_else(|| midnight.and_utc())
}

fn reason_or_default(reason: Option<&str>) -> AppResult<String> {
    match reason.map(str::trim).filter(|r| !r.is_empty()) {
        Some(reason) => Ok(TextInput::new_short_form(reason)
            .map_err(invalid("reason"))?
            .into_inner()),
        None => Ok(DEFAULT_APPOINTMENT_REASON.to_string()),
    }
}

impl Service {
    async fn find_appointment(&self, id: AppointmentId) -> AppResult<Appointment> {
        self.db
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("No appointment found with that ID"))
    }

    async fn find_doctor(&self, id: UserId) -> AppResult<User> {
        let user: User = self
            .db
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("Assigned doctor not found"))?;

        if user.role != Role::Doctor {
            return Err(AppError::validation("Appointments can only be assigned to doctors"));
        }
        if !user.active {
            return Err(AppError::validation("The assigned doctor's account is deactivated"));
        }
        Ok(user)
    }

    /// Fails when the doctor already has the maximum number of appointments
    /// on the day of `date`. `except` is left out of the count.
    ///
    /// Count then insert: concurrent requests may both pass.
    async fn check_capacity(
        &self,
        doctor: &User,
        date: DateTime<Utc>,
        except: Option<AppointmentId>,
    ) -> AppResult<()> {
        let (from, to) = day_window(date);
        let same_day: Vec<Appointment> = self
            .db
            .find(&Filter::And(vec![
                Filter::eq("assignedTo", doctor.id),
                Filter::DateRange { field: "date", from, to },
            ]))
            .await?;

        let booked = same_day.iter().filter(|a| Some(a.id) != except).count();
        if booked >= MAX_DAILY_APPOINTMENTS {
            return Err(AppError::Capacity(format!(
                "{} already has {MAX_DAILY_APPOINTMENTS} appointments on {}",
                doctor.full_name,
                date.with_timezone(&Local).date_naive()
            )));
        }
        Ok(())
    }

    /// Existing patient sharing the email or phone, or a new one.
    async fn resolve_patient(&self, actor: &Actor, details: PatientDetails) -> AppResult<Patient> {
        let contact = Contact::parse(details.email.as_deref(), details.phone.as_deref())?;
        if let Some(patient) = self.db.find_one::<Patient>(&contact.filter()).await? {
            return Ok(patient);
        }

        let missing = |field: &str| AppError::validation(format!("New patient: {field} is required"));
        let request = NewPatient {
            first_name: details.first_name.ok_or_else(|| missing("firstName"))?,
            last_name: details.last_name.ok_or_else(|| missing("lastName"))?,
            dob: details.dob.ok_or_else(|| missing("dob"))?,
            gender: details.gender.ok_or_else(|| missing("gender"))?,
            email: contact.email,
            phone: contact.phone,
            address: details.address,
        };
        self.register_patient(actor, request).await
    }

    pub async fn list_appointments(&self, actor: &Actor) -> AppResult<Vec<Appointment>> {
        self.enforce(actor).authorize(Operation::ListAppointments)?;

        let mut appointments: Vec<Appointment> = self.db.find(&Filter::All).await?;
        appointments.sort_by_key(|a| a.date);
        Ok(appointments)
    }

    /// Appointments assigned to the caller.
    pub async fn my_appointments(&self, actor: &Actor) -> AppResult<Vec<Appointment>> {
        self.enforce(actor).authorize(Operation::ReadAssignedAppointments)?;

        let mut appointments: Vec<Appointment> =
            self.db.find(&Filter::eq("assignedTo", actor.id)).await?;
        appointments.sort_by_key(|a| a.date);
        Ok(appointments)
    }

    pub async fn patient_appointments(
        &self,
        actor: &Actor,
        patient: PatientId,
    ) -> AppResult<Vec<Appointment>> {
        self.enforce(actor).authorize(Operation::ReadPatientAppointments)?;

        let patient = self.visible_patient(actor, patient).await?;
        let mut appointments: Vec<Appointment> =
            self.db.find(&Filter::eq("patient", patient.id)).await?;
        appointments.sort_by_key(|a| a.date);
        Ok(appointments)
    }

    pub async fn create_appointment(
        &self,
        actor: &Actor,
        request: NewAppointment,
    ) -> AppResult<Appointment> {
        self.enforce(actor).authorize(Operation::CreateAppointment)?;

        let reason = reason_or_default(request.reason.as_deref())?;
        // Fail on missing contact before touching the store
        Contact::parse(request.patient.email.as_deref(), request.patient.phone.as_deref())?;

        let doctor = self.find_doctor(request.assigned_to).await?;
        self.check_capacity(&doctor, request.date, None).await?;

        let patient = self.resolve_patient(actor, request.patient).await?;

        let appointment = Appointment {
            id: AppointmentId::new(),
            date: request.date,
            reason,
            patient: patient.id,
            assigned_to: doctor.id,
            status: AppointmentStatus::default(),
            created_at: Utc::now(),
        };
        self.db.insert(&appointment).await?;
        info!("Appointment {} booked with {}", appointment.id, doctor.email);

        self.record(
            Some(actor),
            "Create Appointment",
            EntityKind::Appointment,
            appointment.id,
            json!({ "patient": patient.id, "assignedTo": doctor.id, "date": appointment.date }),
        )
        .await;
        Ok(appointment)
    }

    /// Status change by the assigned doctor.
    pub async fn update_appointment_status(
        &self,
        actor: &Actor,
        id: AppointmentId,
        update: StatusUpdate,
    ) -> AppResult<Appointment> {
        let context = self.enforce(actor);
        context.authorize(Operation::UpdateAppointmentStatus)?;

        let mut appointment = self.find_appointment(id).await?;
        context.owns_appointment(&appointment)?;

        let previous = appointment.status;
        appointment.status = update.status;
        if !self.db.save(&appointment).await? {
            return Err(AppError::not_found("No appointment found with that ID"));
        }

        self.record(
            Some(actor),
            "Update Appointment Status",
            EntityKind::Appointment,
            id,
            json!({ "from": previous, "to": appointment.status }),
        )
        .await;
        Ok(appointment)
    }

    pub async fn update_appointment(
        &self,
        actor: &Actor,
        id: AppointmentId,
        update: AppointmentUpdate,
    ) -> AppResult<Appointment> {
        self.enforce(actor).authorize(Operation::UpdateAppointment)?;

        let mut appointment = self.find_appointment(id).await?;
        let mut changed = Vec::new();

        if let Some(reason) = &update.reason {
            appointment.reason = reason_or_default(Some(reason))?;
            changed.push("reason");
        }
        if let Some(status) = update.status {
            appointment.status = status;
            changed.push("status");
        }

        let moved = update.date.is_some_and(|d| d != appointment.date);
        let reassigned = update.assigned_to.is_some_and(|u| u != appointment.assigned_to);
        if moved || reassigned {
            let doctor_id = update.assigned_to.unwrap_or(appointment.assigned_to);
            let date = update.date.unwrap_or(appointment.date);
            let doctor = self.find_doctor(doctor_id).await?;
            self.check_capacity(&doctor, date, Some(id)).await?;

            appointment.assigned_to = doctor_id;
            appointment.date = date;
            if moved {
                changed.push("date");
            }
            if reassigned {
                changed.push("assignedTo");
            }
        }

        if !self.db.save(&appointment).await? {
            return Err(AppError::not_found("No appointment found with that ID"));
        }

        self.record(
            Some(actor),
            "Update Appointment",
            EntityKind::Appointment,
            id,
            json!({ "fields": changed }),
        )
        .await;
        Ok(appointment)
    }

    pub async fn delete_appointment(&self, actor: &Actor, id: AppointmentId) -> AppResult<()> {
        self.enforce(actor).authorize(Operation::DeleteAppointment)?;

        let appointment = self.find_appointment(id).await?;
        if !self.db.delete::<Appointment>(id).await? {
            return Err(AppError::not_found("No appointment found with that ID"));
        }

        self.record(
            Some(actor),
            "Delete Appointment",
            EntityKind::Appointment,
            id,
            json!({ "patient": appointment.patient, "date": appointment.date }),
        )
        .await;
        Ok(())
    }
}
