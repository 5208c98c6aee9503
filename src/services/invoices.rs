//! Invoices, and the billing status they drive on medical history entries

use chrono::Utc;
use log::error;
use serde::Deserialize;
use serde_json::json;

use crate::authorization::Operation;
use crate::db::Filter;
use crate::error::{AppError, AppResult};
use crate::models::{
    Actor, BillingStatus, EntityKind, HistoryId, Invoice, InvoiceId, InvoiceStatus, MedicalHistory,
    PatientId, Role, ServiceItem,
};
use crate::services::{invalid, Service};
use crate::utils::validation::TextInput;

/// The total is computed from the services, and the invoice is addressed to
/// the patient's own account. Any total or recipient sent is ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInvoice {
    pub patient: PatientId,
    pub medical_history: HistoryId,
    pub services: Vec<ServiceItem>,
}

fn billed_services(services: &[ServiceItem]) -> AppResult<(Vec<ServiceItem>, f64)> {
    if services.is_empty() {
        return Err(AppError::validation("An invoice needs at least one service"));
    }

    let mut items = Vec::with_capacity(services.len());
    for item in services {
        let name = TextInput::new_short_form(&item.name).map_err(invalid("service name"))?;
        if !item.cost.is_finite() || item.cost < 0.0 {
            return Err(AppError::validation(format!(
                "Invalid cost for {name}: must be a non-negative amount"
            )));
        }
        items.push(ServiceItem {
            name: name.into_inner(),
            cost: item.cost,
        });
    }

    let total = items.iter().map(|i| i.cost).sum();
    Ok((items, total))
}

impl Service {
    /// Fetches an invoice the actor may see. Accounts with the `user` role
    /// get not-found for the others.
    async fn visible_invoice(&self, actor: &Actor, id: InvoiceId) -> AppResult<Invoice> {
        let invoice: Invoice = self
            .db
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("Invoice not found"))?;

        if !self.enforce(actor).sees_invoice(&invoice) {
            return Err(match actor.role {
                Role::User => AppError::not_found("Invoice not found"),
                _ => AppError::Authorization("You can only view invoices you issued".to_string()),
            });
        }
        Ok(invoice)
    }

    /// Invoices visible to the caller, newest first.
    pub async fn list_invoices(&self, actor: &Actor) -> AppResult<Vec<Invoice>> {
        let context = self.enforce(actor);
        context.authorize(Operation::ListInvoices)?;

        let filter = match actor.role {
            Role::Doctor => Filter::eq("issuedBy", actor.id),
            _ => Filter::All,
        };
        let mut invoices: Vec<Invoice> = self.db.find(&filter).await?;
        invoices.retain(|invoice| context.sees_invoice(invoice));
        invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(invoices)
    }

    pub async fn get_invoice(&self, actor: &Actor, id: InvoiceId) -> AppResult<Invoice> {
        self.enforce(actor).authorize(Operation::ReadInvoice)?;
        self.visible_invoice(actor, id).await
    }

    /// Bills a medical history entry, which moves to `pending`.
    pub async fn create_invoice(&self, actor: &Actor, request: NewInvoice) -> AppResult<Invoice> {
        self.enforce(actor).authorize(Operation::CreateInvoice)?;

        let (services, total_amount) = billed_services(&request.services)?;
        let patient = self.find_patient(request.patient).await?;
        let mut history = self.find_history(request.medical_history).await?;

        if history.patient != patient.id {
            return Err(AppError::validation(
                "The medical history entry does not belong to this patient",
            ));
        }
        if history.billing_status.is_some() {
            return Err(AppError::conflict(
                "This medical history entry has already been invoiced",
            ));
        }

        let invoice = Invoice {
            id: InvoiceId::new(),
            patient: patient.id,
            medical_history: history.id,
            issued_by: actor.id,
            issued_to: patient.user,
            services,
            total_amount,
            status: InvoiceStatus::default(),
            created_at: Utc::now(),
            paid_at: None,
        };
        self.db.insert(&invoice).await?;

        history.billing_status = Some(BillingStatus::Pending);
        if let Err(e) = self.db.save(&history).await {
            if let Err(undo) = self.db.delete::<Invoice>(invoice.id).await {
                error!("Failed to remove invoice {} after billing failure: {undo}", invoice.id);
            }
            return Err(e.into());
        }

        self.record(
            Some(actor),
            "Create Invoice",
            EntityKind::Invoice,
            invoice.id,
            json!({ "patient": patient.id, "medicalHistory": history.id, "total": total_amount }),
        )
        .await;
        Ok(invoice)
    }

    /// `pending` to `paid`, once. The billed history entry follows.
    pub async fn pay_invoice(&self, actor: &Actor, id: InvoiceId) -> AppResult<Invoice> {
        self.enforce(actor).authorize(Operation::PayInvoice)?;

        let mut invoice: Invoice = self
            .db
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("Invoice not found"))?;
        if invoice.status == InvoiceStatus::Paid {
            return Err(AppError::conflict("Invoice already marked as paid"));
        }

        let mut history: MedicalHistory = self
            .db
            .get(invoice.medical_history)
            .await?
            .ok_or_else(|| AppError::not_found("Associated medical history not found"))?;

        let unpaid = invoice.clone();
        invoice.status = InvoiceStatus::Paid;
        invoice.paid_at = Some(Utc::now());
        self.db.save(&invoice).await?;

        history.billing_status = Some(BillingStatus::Paid);
        if let Err(e) = self.db.save(&history).await {
            if let Err(undo) = self.db.save(&unpaid).await {
                error!("Failed to restore invoice {id} after billing failure: {undo}");
            }
            return Err(e.into());
        }

        self.record(
            Some(actor),
            "Mark Invoice Paid",
            EntityKind::Invoice,
            id,
            json!({ "medicalHistory": history.id, "total": invoice.total_amount }),
        )
        .await;
        Ok(invoice)
    }
}
