//! Routes behind bearer authentication. Handlers only translate between HTTP
//! and the service; every check happens in the service.

use axum::{extract::State, response::IntoResponse};
use http::StatusCode;
use serde::Deserialize;

use crate::backend::middlewares::{ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::backend::models::{patient_views, user_views, PatientView, Success, UserView};
use crate::error::AppResult;
use crate::models::{AppointmentId, HistoryId, InvoiceId, PatientId, UserId};
use crate::services::appointments::{AppointmentUpdate, NewAppointment, StatusUpdate};
use crate::services::history::{HistoryUpdate, NewHistory};
use crate::services::invoices::NewInvoice;
use crate::services::patients::{NewPatient, PatientUpdate};
use crate::services::profile::ProfileUpdate;
use crate::services::users::{RoleUpdate, StatusChange};
use crate::services::Service;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DateRangeQuery {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

// Patients

pub async fn list_patients(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
) -> AppResult<impl IntoResponse> {
    let patients = service.list_patients(&actor).await?;
    Success::list("patients", &patient_views(patients))
}

pub async fn search_patients(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> AppResult<impl IntoResponse> {
    let patients = service
        .search_patients(&actor, query.q.as_deref().unwrap_or_default())
        .await?;
    Success::list("patients", &patient_views(patients))
}

pub async fn create_patient(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiJson(request): ApiJson<NewPatient>,
) -> AppResult<impl IntoResponse> {
    let patient = service.create_patient(&actor, request).await?;
    Ok((StatusCode::CREATED, Success::item("patient", PatientView::new(patient, None))?))
}

pub async fn get_patient(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<PatientId>,
) -> AppResult<impl IntoResponse> {
    let (patient, appointments) = service.get_patient(&actor, id).await?;
    Success::item("patient", PatientView::new(patient, Some(appointments)))
}

pub async fn update_patient(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<PatientId>,
    ApiJson(update): ApiJson<PatientUpdate>,
) -> AppResult<impl IntoResponse> {
    let patient = service.update_patient(&actor, id, update).await?;
    Success::item("patient", PatientView::new(patient, None))
}

pub async fn delete_patient(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<PatientId>,
) -> AppResult<StatusCode> {
    service.delete_patient(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Appointments

pub async fn list_appointments(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
) -> AppResult<impl IntoResponse> {
    let appointments = service.list_appointments(&actor).await?;
    Success::list("appointments", &appointments)
}

pub async fn create_appointment(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiJson(request): ApiJson<NewAppointment>,
) -> AppResult<impl IntoResponse> {
    let appointment = service.create_appointment(&actor, request).await?;
    Ok((StatusCode::CREATED, Success::item("appointment", appointment)?))
}

pub async fn my_appointments(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
) -> AppResult<impl IntoResponse> {
    let appointments = service.my_appointments(&actor).await?;
    Success::list("appointments", &appointments)
}

pub async fn patient_appointments(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiPath(patient): ApiPath<PatientId>,
) -> AppResult<impl IntoResponse> {
    let appointments = service.patient_appointments(&actor, patient).await?;
    Success::list("appointments", &appointments)
}

pub async fn update_appointment_status(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<AppointmentId>,
    ApiJson(update): ApiJson<StatusUpdate>,
) -> AppResult<impl IntoResponse> {
    let appointment = service.update_appointment_status(&actor, id, update).await?;
    Success::item("appointment", appointment)
}

pub async fn update_appointment(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<AppointmentId>,
    ApiJson(update): ApiJson<AppointmentUpdate>,
) -> AppResult<impl IntoResponse> {
    let appointment = service.update_appointment(&actor, id, update).await?;
    Success::item("appointment", appointment)
}

pub async fn delete_appointment(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<AppointmentId>,
) -> AppResult<StatusCode> {
    service.delete_appointment(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Medical history

pub async fn patient_history(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiPath(patient): ApiPath<PatientId>,
) -> AppResult<impl IntoResponse> {
    let history = service.patient_history(&actor, patient).await?;
    Success::list("history", &history)
}

pub async fn create_history(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiPath(patient): ApiPath<PatientId>,
    ApiJson(request): ApiJson<NewHistory>,
) -> AppResult<impl IntoResponse> {
    let entry = service.create_history(&actor, patient, request).await?;
    Ok((StatusCode::CREATED, Success::item("history", entry)?))
}

pub async fn update_history(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<HistoryId>,
    ApiJson(update): ApiJson<HistoryUpdate>,
) -> AppResult<impl IntoResponse> {
    let entry = service.update_history(&actor, id, update).await?;
    Success::item("history", entry)
}

pub async fn delete_history(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<HistoryId>,
) -> AppResult<StatusCode> {
    service.delete_history(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Invoices

pub async fn list_invoices(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
) -> AppResult<impl IntoResponse> {
    let invoices = service.list_invoices(&actor).await?;
    Success::list("invoices", &invoices)
}

pub async fn get_invoice(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<InvoiceId>,
) -> AppResult<impl IntoResponse> {
    let invoice = service.get_invoice(&actor, id).await?;
    Success::item("invoice", invoice)
}

pub async fn create_invoice(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiJson(request): ApiJson<NewInvoice>,
) -> AppResult<impl IntoResponse> {
    let invoice = service.create_invoice(&actor, request).await?;
    Ok((StatusCode::CREATED, Success::item("invoice", invoice)?))
}

pub async fn pay_invoice(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<InvoiceId>,
) -> AppResult<impl IntoResponse> {
    let invoice = service.pay_invoice(&actor, id).await?;
    Ok(Success::item("invoice", invoice)?.message("Invoice marked as paid"))
}

// Users

pub async fn list_users(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
) -> AppResult<impl IntoResponse> {
    let users = service.list_users(&actor).await?;
    Success::list("users", &user_views(&users))
}

pub async fn update_user_role(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(update): ApiJson<RoleUpdate>,
) -> AppResult<impl IntoResponse> {
    let user = service.update_user_role(&actor, id, update).await?;
    Success::item("user", UserView::from(&user))
}

pub async fn update_user_status(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(change): ApiJson<StatusChange>,
) -> AppResult<impl IntoResponse> {
    let user = service.update_user_status(&actor, id, change).await?;
    Success::item("user", UserView::from(&user))
}

pub async fn delete_user(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<UserId>,
) -> AppResult<StatusCode> {
    service.delete_user(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Audit log, reports, profile

pub async fn audit_logs(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
) -> AppResult<impl IntoResponse> {
    let logs = service.recent_audit_logs(&actor).await?;
    Success::list("logs", &logs)
}

pub async fn summary(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
) -> AppResult<impl IntoResponse> {
    let summary = service.summary(&actor).await?;
    Success::new()
        .with("totalPatients", summary.total_patients)?
        .with("totalAppointments", summary.total_appointments)?
        .with("recentAppointments", summary.recent_appointments)
}

pub async fn appointments_by_date(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiQuery(range): ApiQuery<DateRangeQuery>,
) -> AppResult<impl IntoResponse> {
    let appointments = service
        .appointments_by_date(&actor, range.from.as_deref(), range.to.as_deref())
        .await?;
    Success::list("appointments", &appointments)
}

pub async fn frequent_diagnoses(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
) -> AppResult<impl IntoResponse> {
    let diagnoses = service.frequent_diagnoses(&actor).await?;
    Success::item("topDiagnoses", diagnoses)
}

pub async fn get_profile(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
) -> AppResult<impl IntoResponse> {
    let user = service.get_profile(&actor).await?;
    Success::item("user", UserView::from(&user))
}

pub async fn update_profile(
    State(service): State<Service>,
    AuthUser(actor): AuthUser,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> AppResult<impl IntoResponse> {
    let user = service.update_profile(&actor, update).await?;
    Success::item("user", UserView::from(&user))
}
