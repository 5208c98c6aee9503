//! Medical history entries

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::authorization::Operation;
use crate::db::Filter;
use crate::error::{AppError, AppResult};
use crate::models::{Actor, EntityKind, HistoryId, Invoice, MedicalHistory, PatientId};
use crate::services::{invalid, Service};
use crate::utils::validation::TextInput;

#[derive(Debug, Clone, Deserialize)]
pub struct NewHistory {
    pub diagnosis: String,
    pub treatment: String,
    #[serde(default)]
    pub medications: Vec<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryUpdate {
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub medications: Option<Vec<String>>,
    pub date: Option<DateTime<Utc>>,
}

fn medications(list: &[String]) -> AppResult<Vec<String>> {
    list.iter()
        .map(|m| {
            TextInput::new_short_form(m)
                .map(TextInput::into_inner)
                .map_err(invalid("medications"))
        })
        .collect()
}

impl Service {
    pub(crate) async fn find_history(&self, id: HistoryId) -> AppResult<MedicalHistory> {
        self.db
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("No medical history entry found with that ID"))
    }

    /// Entries of one patient, newest first.
    pub async fn patient_history(
        &self,
        actor: &Actor,
        patient: PatientId,
    ) -> AppResult<Vec<MedicalHistory>> {
        self.enforce(actor).authorize(Operation::ReadHistory)?;

        let patient = self.visible_patient(actor, patient).await?;
        let mut entries: Vec<MedicalHistory> =
            self.db.find(&Filter::eq("patient", patient.id)).await?;
        entries.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(entries)
    }

    pub async fn create_history(
        &self,
        actor: &Actor,
        patient: PatientId,
        request: NewHistory,
    ) -> AppResult<MedicalHistory> {
        self.enforce(actor).authorize(Operation::CreateHistory)?;

        let diagnosis = TextInput::new_long_form(&request.diagnosis).map_err(invalid("diagnosis"))?;
        let treatment = TextInput::new_long_form(&request.treatment).map_err(invalid("treatment"))?;
        let medications = medications(&request.medications)?;
        let patient = self.find_patient(patient).await?;

        let entry = MedicalHistory {
            id: HistoryId::new(),
            patient: patient.id,
            diagnosis: diagnosis.into_inner(),
            treatment: treatment.into_inner(),
            medications,
            date: request.date.unwrap_or_else(Utc::now),
            billing_status: None,
        };
        self.db.insert(&entry).await?;

        self.record(
            Some(actor),
            "Create Medical History",
            EntityKind::MedicalHistory,
            entry.id,
            json!({ "patient": patient.id, "diagnosis": entry.diagnosis }),
        )
        .await;
        Ok(entry)
    }

    /// Clinical fields only; the billing status follows the invoices.
    pub async fn update_history(
        &self,
        actor: &Actor,
        id: HistoryId,
        update: HistoryUpdate,
    ) -> AppResult<MedicalHistory> {
        self.enforce(actor).authorize(Operation::UpdateHistory)?;

        let mut entry = self.find_history(id).await?;
        let mut changed = Vec::new();

        if let Some(diagnosis) = &update.diagnosis {
            entry.diagnosis = TextInput::new_long_form(diagnosis)
                .map_err(invalid("diagnosis"))?
                .into_inner();
            changed.push("diagnosis");
        }
        if let Some(treatment) = &update.treatment {
            entry.treatment = TextInput::new_long_form(treatment)
                .map_err(invalid("treatment"))?
                .into_inner();
            changed.push("treatment");
        }
        if let Some(list) = &update.medications {
            entry.medications = medications(list)?;
            changed.push("medications");
        }
        if let Some(date) = update.date {
            entry.date = date;
            changed.push("date");
        }

        if !self.db.save(&entry).await? {
            return Err(AppError::not_found("No medical history entry found with that ID"));
        }

        self.record(
            Some(actor),
            "Update Medical History",
            EntityKind::MedicalHistory,
            id,
            json!({ "fields": changed }),
        )
        .await;
        Ok(entry)
    }

    pub async fn delete_history(&self, actor: &Actor, id: HistoryId) -> AppResult<()> {
        self.enforce(actor).authorize(Operation::DeleteHistory)?;

        let entry = self.find_history(id).await?;
        let invoices = self.db.count::<Invoice>(&Filter::eq("medicalHistory", id)).await?;
        if entry.billing_status.is_some() || invoices > 0 {
            return Err(AppError::conflict(
                "This medical history entry has been invoiced and cannot be deleted",
            ));
        }
        if !self.db.delete::<MedicalHistory>(id).await? {
            return Err(AppError::not_found("No medical history entry found with that ID"));
        }

        self.record(
            Some(actor),
            "Delete Medical History",
            EntityKind::MedicalHistory,
            id,
            json!({ "patient": entry.patient }),
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::models::{InvoiceStatus, Role, ServiceItem, User};
    use crate::services::invoices::NewInvoice;
    use crate::services::patients::test::new_patient;
    use crate::services::test::*;

    pub(crate) fn note(diagnosis: &str) -> NewHistory {
        NewHistory {
            diagnosis: diagnosis.to_string(),
            treatment: "Rest and fluids".to_string(),
            medications: vec!["Paracetamol 500mg".to_string()],
            date: None,
        }
    }

    #[tokio::test]
    async fn doctor_writes_user_reads_own() {
        let service = service().await;
        let staff = account(&service, Role::Staff, "staff@example.com").await;
        let doctor = account(&service, Role::Doctor, "doc@example.com").await;
        let patient = service
            .create_patient(&staff, new_patient(Some("ada@example.com"), Some("0791234567")))
            .await
            .unwrap();

        let entry = service.create_history(&doctor, patient.id, note("Influenza")).await.unwrap();
        assert_eq!(entry.billing_status, None);

        let user: User = service.db.get(patient.user.unwrap()).await.unwrap().unwrap();
        let actor = user.actor();
        let visible = service.patient_history(&actor, patient.id).await.unwrap();
        assert_eq!(visible, vec![entry.clone()]);

        assert!(matches!(
            service.create_history(&actor, patient.id, note("Self-diagnosed")).await,
            Err(AppError::Authorization(_))
        ));
        assert!(matches!(
            service.delete_history(&doctor, entry.id).await,
            Err(AppError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn history_needs_an_existing_patient() {
        let service = service().await;
        let doctor = account(&service, Role::Doctor, "doc@example.com").await;

        assert!(matches!(
            service.create_history(&doctor, PatientId::new(), note("Influenza")).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_and_delete() {
        let service = service().await;
        let staff = account(&service, Role::Staff, "staff@example.com").await;
        let patient = service
            .create_patient(&staff, new_patient(Some("ada@example.com"), None))
            .await
            .unwrap();
        let entry = service.create_history(&staff, patient.id, note("Influenza")).await.unwrap();

        let update = HistoryUpdate {
            treatment: Some("Antivirals".to_string()),
            medications: Some(vec![]),
            ..Default::default()
        };
        let updated = service.update_history(&staff, entry.id, update).await.unwrap();
        assert_eq!(updated.treatment, "Antivirals");
        assert!(updated.medications.is_empty());
        assert_eq!(updated.diagnosis, "Influenza");

        service.delete_history(&staff, entry.id).await.unwrap();
        assert!(matches!(
            service.delete_history(&staff, entry.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn invoiced_entries_are_kept() {
        let service = service().await;
        let staff = account(&service, Role::Staff, "staff@example.com").await;
        let doctor = account(&service, Role::Doctor, "doc@example.com").await;
        let patient = service
            .create_patient(&staff, new_patient(Some("ada@example.com"), None))
            .await
            .unwrap();
        let entry = service.create_history(&doctor, patient.id, note("Influenza")).await.unwrap();

        let request = NewInvoice {
            patient: patient.id,
            medical_history: entry.id,
            services: vec![ServiceItem {
                name: "Consultation".to_string(),
                cost: 80.0,
            }],
        };
        let invoice = service.create_invoice(&doctor, request).await.unwrap();

        assert!(matches!(
            service.delete_history(&staff, entry.id).await,
            Err(AppError::Conflict(_))
        ));
        let paid = service.pay_invoice(&staff, invoice.id).await.unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert!(matches!(
            service.delete_history(&staff, entry.id).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(service.find_history(entry.id).await.unwrap().id, entry.id);
    }
}
