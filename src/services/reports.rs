//! Read-only practice statistics

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::authorization::Operation;
use crate::consts::{RECENT_APPOINTMENTS, TOP_DIAGNOSES};
use crate::db::Filter;
use crate::error::{AppError, AppResult};
use crate::models::{Actor, Appointment, MedicalHistory, Patient};
use crate::services::appointments::local_midnight;
use crate::services::Service;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_patients: usize,
    pub total_appointments: usize,
    pub recent_appointments: Vec<Appointment>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DiagnosisCount {
    pub diagnosis: String,
    pub count: usize,
}

fn report_day(value: Option<&str>, name: &str) -> AppResult<NaiveDate> {
    let value = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::validation("Please provide both from and to dates"))?;
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("Invalid {name} date, expected YYYY-MM-DD")))
}

impl Service {
    pub async fn summary(&self, actor: &Actor) -> AppResult<Summary> {
        self.enforce(actor).authorize(Operation::ReadReports)?;

        let total_patients = self.db.count::<Patient>(&Filter::All).await?;
        let mut appointments: Vec<Appointment> = self.db.find(&Filter::All).await?;
        let total_appointments = appointments.len();

        appointments.sort_by(|a, b| b.date.cmp(&a.date));
        appointments.truncate(RECENT_APPOINTMENTS);

        Ok(Summary {
            total_patients,
            total_appointments,
            recent_appointments: appointments,
        })
    }

    /// Appointments between two local calendar days, both included.
    pub async fn appointments_by_date(
        &self,
        actor: &Actor,
        from: Option<&str>,
        to: Option<&str>,
    ) -> AppResult<Vec<Appointment>> {
        self.enforce(actor).authorize(Operation::ReadReports)?;

        let first = report_day(from, "from")?;
        let last = report_day(to, "to")?;
        if last < first {
            return Err(AppError::validation("The to date must not precede the from date"));
        }

        let after = last
            .succ_opt()
            .ok_or_else(|| AppError::validation("The to date is out of range"))?;
        let range = Filter::DateRange {
            field: "date",
            from: local_midnight(first),
            to: local_midnight(after) - Duration::milliseconds(1),
        };
        let mut appointments: Vec<Appointment> = self.db.find(&range).await?;
        appointments.sort_by_key(|a| a.date);
        Ok(appointments)
    }

    /// Most frequent diagnoses, ties in alphabetical order.
    pub async fn frequent_diagnoses(&self, actor: &Actor) -> AppResult<Vec<DiagnosisCount>> {
        self.enforce(actor).authorize(Operation::ReadReports)?;

        let entries: Vec<MedicalHistory> = self.db.find(&Filter::All).await?;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for entry in entries {
            *counts.entry(entry.diagnosis).or_default() += 1;
        }

        let mut ranked: Vec<DiagnosisCount> = counts
            .into_iter()
            .map(|(diagnosis, count)| DiagnosisCount { diagnosis, count })
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.diagnosis.cmp(&b.diagnosis)));
        ranked.truncate(TOP_DIAGNOSES);
        Ok(ranked)
    }
}
