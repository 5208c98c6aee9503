//! Patient records, and the login accounts provisioned alongside them

use chrono::{NaiveDate, Utc};
use log::{error, info};
use serde::Deserialize;
use serde_json::json;

use crate::authorization::Operation;
use crate::db::Filter;
use crate::error::{AppError, AppResult};
use crate::models::{
    Actor, Appointment, EntityKind, Gender, Patient, PatientId, Role, User, UserId,
};
use crate::services::{invalid, Service};
use crate::utils::password_utils::hash_async;
use crate::utils::validation::{EmailInput, PhoneInput, TextInput};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    pub dob: NaiveDate,
    pub gender: Gender,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub dob: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Normalized email and phone of a patient. At least one is set.
pub(crate) struct Contact {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Contact {
    pub fn parse(email: Option<&str>, phone: Option<&str>) -> AppResult<Self> {
        let email = email
            .filter(|e| !e.trim().is_empty())
            .map(EmailInput::new)
            .transpose()
            .map_err(invalid("email"))?
            .map(EmailInput::into_inner);
        let phone = phone
            .filter(|p| !p.trim().is_empty())
            .map(PhoneInput::new)
            .transpose()
            .map_err(invalid("phone"))?
            .map(PhoneInput::into_inner);

        if email.is_none() && phone.is_none() {
            return Err(AppError::validation(
                "Please provide the patient's email or phone number",
            ));
        }
        Ok(Self { email, phone })
    }

    /// Matches records sharing the email or the phone.
    pub fn filter(&self) -> Filter {
        let mut any = Vec::new();
        if let Some(email) = &self.email {
            any.push(Filter::eq("email", email));
        }
        if let Some(phone) = &self.phone {
            any.push(Filter::eq("phone", phone));
        }
        Filter::Or(any)
    }
}

fn optional_text(value: Option<&str>, field: &'static str) -> AppResult<Option<String>> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(TextInput::new_short_form)
        .transpose()
        .map(|v| v.map(TextInput::into_inner))
        .map_err(invalid(field))
}

fn check_dob(dob: NaiveDate) -> AppResult<NaiveDate> {
    if dob > Utc::now().date_naive() {
        return Err(AppError::validation("Date of birth cannot be in the future"));
    }
    Ok(dob)
}

impl Service {
    pub(crate) async fn find_patient(&self, id: PatientId) -> AppResult<Patient> {
        self.db
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("No patient found with that ID"))
    }

    /// Fetches a patient the actor may see. Hidden patients are reported as
    /// missing.
    pub(crate) async fn visible_patient(&self, actor: &Actor, id: PatientId) -> AppResult<Patient> {
        let patient = self.find_patient(id).await?;
        if !self.enforce(actor).sees_patient(&patient) {
            return Err(AppError::not_found("No patient found with that ID"));
        }
        Ok(patient)
    }

    /// Rejects an email or phone already used by another patient.
    async fn check_unique_contact(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
        except: Option<PatientId>,
    ) -> AppResult<()> {
        let others = |p: &Patient| Some(p.id) != except;

        if let Some(email) = email {
            let taken: Vec<Patient> = self.db.find(&Filter::eq("email", email)).await?;
            if taken.iter().any(others) {
                return Err(AppError::conflict("A patient with this email already exists"));
            }
        }
        if let Some(phone) = phone {
            let taken: Vec<Patient> = self.db.find(&Filter::eq("phone", phone)).await?;
            if taken.iter().any(others) {
                return Err(AppError::conflict("A patient with this phone number already exists"));
            }
        }
        Ok(())
    }

    pub async fn list_patients(&self, actor: &Actor) -> AppResult<Vec<Patient>> {
        self.enforce(actor).authorize(Operation::ListPatients)?;

        let mut patients: Vec<Patient> = self.db.find(&Filter::All).await?;
        patients.sort_by(|a, b| {
            (&a.last_name, &a.first_name).cmp(&(&b.last_name, &b.first_name))
        });
        Ok(patients)
    }

    /// Case-insensitive substring search over names, email and phone.
    pub async fn search_patients(&self, actor: &Actor, query: &str) -> AppResult<Vec<Patient>> {
        self.enforce(actor).authorize(Operation::SearchPatients)?;

        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::validation("Please provide a search query"));
        }

        let mut any = vec![
            Filter::Contains("firstName", query.to_string()),
            Filter::Contains("lastName", query.to_string()),
            Filter::Contains("email", query.to_string()),
            Filter::Contains("phone", query.to_string()),
        ];
        let digits = PhoneInput::normalize(query);
        if !digits.is_empty() && digits != query {
            any.push(Filter::Contains("phone", digits));
        }

        Ok(self.db.find(&Filter::Or(any)).await?)
    }

    /// A patient with its appointments.
    pub async fn get_patient(
        &self,
        actor: &Actor,
        id: PatientId,
    ) -> AppResult<(Patient, Vec<Appointment>)> {
        self.enforce(actor).authorize(Operation::ReadPatient)?;

        let patient = self.visible_patient(actor, id).await?;
        let mut appointments: Vec<Appointment> =
            self.db.find(&Filter::eq("patient", patient.id)).await?;
        appointments.sort_by_key(|a| a.date);

        Ok((patient, appointments))
    }

    pub async fn create_patient(&self, actor: &Actor, request: NewPatient) -> AppResult<Patient> {
        self.enforce(actor).authorize(Operation::CreatePatient)?;
        self.register_patient(actor, request).await
    }

    /// Validates and stores a new patient, provisioning its login account.
    /// Shared with appointment creation, which has already been authorized.
    pub(crate) async fn register_patient(
        &self,
        actor: &Actor,
        request: NewPatient,
    ) -> AppResult<Patient> {
        let first_name = TextInput::new_short_form(&request.first_name).map_err(invalid("firstName"))?;
        let last_name = TextInput::new_short_form(&request.last_name).map_err(invalid("lastName"))?;
        let contact = Contact::parse(request.email.as_deref(), request.phone.as_deref())?;
        let address = optional_text(request.address.as_deref(), "address")?;

        self.check_unique_contact(contact.email.as_deref(), contact.phone.as_deref(), None)
            .await?;

        let patient = Patient {
            id: PatientId::new(),
            first_name: first_name.into_inner(),
            last_name: last_name.into_inner(),
            dob: check_dob(request.dob)?,
            gender: request.gender,
            email: contact.email,
            phone: contact.phone,
            address,
            user: None,
            created_at: Utc::now(),
        };

        let patient = self.provision(actor, patient).await?;
        info!("Patient {} created", patient.id);

        self.record(
            Some(actor),
            "Create Patient",
            EntityKind::Patient,
            patient.id,
            json!({ "name": patient.full_name(), "user": patient.user }),
        )
        .await;
        Ok(patient)
    }

    /// Stores `patient` linked to a login account.
    ///
    /// An account matching the email or phone is reused. Otherwise, when both
    /// are known, a `user` account is created whose password is the phone
    /// digits. The steps are user, patient, link back; a failing step undoes
    /// the previous ones.
    async fn provision(&self, actor: &Actor, mut patient: Patient) -> AppResult<Patient> {
        let contact = Contact {
            email: patient.email.clone(),
            phone: patient.phone.clone(),
        };
        let existing: Option<User> = self.db.find_one(&contact.filter()).await?;

        let (mut user, created) = match existing {
            Some(user) if user.patient.is_some() => {
                return Err(AppError::conflict(
                    "The matching account is already linked to another patient",
                ));
            }
            Some(user) => (user, false),
            None => match patient.email.clone().zip(patient.phone.clone()) {
                Some((email, phone)) => {
                    let user = User {
                        id: UserId::new(),
                        full_name: patient.full_name(),
                        email,
                        password: hash_async(phone.clone()).await?,
                        phone: Some(phone),
                        role: Role::User,
                        active: true,
                        patient: None,
                        password_reset_token: None,
                        password_reset_expires: None,
                        created_at: Utc::now(),
                    };
                    self.db.insert(&user).await?;
                    (user, true)
                }
                // No way to sign in without both
                None => {
                    self.db.insert(&patient).await?;
                    return Ok(patient);
                }
            },
        };

        patient.user = Some(user.id);
        if let Err(e) = self.db.insert(&patient).await {
            if created {
                self.undo_user(user.id).await;
            }
            return Err(e.into());
        }

        user.patient = Some(patient.id);
        if let Err(e) = self.db.save(&user).await {
            if let Err(undo) = self.db.delete::<Patient>(patient.id).await {
                error!("Failed to remove patient {} after failed link: {undo}", patient.id);
            }
            if created {
                self.undo_user(user.id).await;
            }
            return Err(e.into());
        }

        if created {
            info!("Provisioned account {} for patient {}", user.email, patient.id);
            self.record(
                Some(actor),
                "Create User",
                EntityKind::User,
                user.id,
                json!({ "email": user.email, "patient": patient.id, "autoProvisioned": true }),
            )
            .await;
        }
        Ok(patient)
    }

    async fn undo_user(&self, id: UserId) {
        if let Err(e) = self.db.delete::<User>(id).await {
            error!("Failed to remove provisioned account {id}: {e}");
        }
    }

    pub async fn update_patient(
        &self,
        actor: &Actor,
        id: PatientId,
        update: PatientUpdate,
    ) -> AppResult<Patient> {
        self.enforce(actor).authorize(Operation::UpdatePatient)?;

        let mut patient = self.find_patient(id).await?;
        let mut changed = Vec::new();

        if let Some(first_name) = &update.first_name {
            patient.first_name = TextInput::new_short_form(first_name)
                .map_err(invalid("firstName"))?
                .into_inner();
            changed.push("firstName");
        }
        if let Some(last_name) = &update.last_name {
            patient.last_name = TextInput::new_short_form(last_name)
                .map_err(invalid("lastName"))?
                .into_inner();
            changed.push("lastName");
        }
        if let Some(dob) = update.dob {
            patient.dob = check_dob(dob)?;
            changed.push("dob");
        }
        if let Some(gender) = update.gender {
            patient.gender = gender;
            changed.push("gender");
        }
        if update.address.is_some() {
            patient.address = optional_text(update.address.as_deref(), "address")?;
            changed.push("address");
        }
        if update.email.is_some() || update.phone.is_some() {
            let contact = Contact::parse(
                update.email.as_deref().or(patient.email.as_deref()),
                update.phone.as_deref().or(patient.phone.as_deref()),
            )?;
            self.check_unique_contact(contact.email.as_deref(), contact.phone.as_deref(), Some(id))
                .await?;
            if update.email.is_some() {
                changed.push("email");
            }
            if update.phone.is_some() {
                changed.push("phone");
            }
            patient.email = contact.email;
            patient.phone = contact.phone;
        }

        if !self.db.save(&patient).await? {
            return Err(AppError::not_found("No patient found with that ID"));
        }

        self.record(Some(actor), "Update Patient", EntityKind::Patient, id, json!({ "fields": changed }))
            .await;
        Ok(patient)
    }

    /// Deletes the record and unlinks its login account, which stays usable.
    pub async fn delete_patient(&self, actor: &Actor, id: PatientId) -> AppResult<()> {
        self.enforce(actor).authorize(Operation::DeletePatient)?;

        let patient = self.find_patient(id).await?;
        if !self.db.delete::<Patient>(id).await? {
            return Err(AppError::not_found("No patient found with that ID"));
        }

        if let Some(user_id) = patient.user {
            if let Some(mut user) = self.db.get::<User>(user_id).await? {
                user.patient = None;
                self.db.save(&user).await?;
            }
        }

        self.record(
            Some(actor),
            "Delete Patient",
            EntityKind::Patient,
            id,
            json!({ "name": patient.full_name() }),
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::db::{Database, DocumentStore, JsonFileStore, StoreError};
    use crate::services::auth::SigninRequest;
    use crate::services::test::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;
    use uuid::Uuid;

    pub(crate) fn new_patient(email: Option<&str>, phone: Option<&str>) -> NewPatient {
        NewPatient {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            dob: NaiveDate::from_ymd_opt(1985, 12, 10).unwrap(),
            gender: Gender::Female,
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            address: None,
        }
    }

    #[tokio::test]
    async fn duplicate_email_or_phone_is_a_conflict() {
        let service = service().await;
        let staff = account(&service, Role::Staff, "staff@example.com").await;
        service
            .create_patient(&staff, new_patient(Some("ada@example.com"), Some("079 123 45 67")))
            .await
            .unwrap();

        let same_email = service
            .create_patient(&staff, new_patient(Some("ADA@example.com"), Some("0790000000")))
            .await;
        assert!(matches!(same_email, Err(AppError::Conflict(_))));

        let same_phone = service
            .create_patient(&staff, new_patient(Some("other@example.com"), Some("0791234567")))
            .await;
        assert!(matches!(same_phone, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn provisioned_account_signs_in_with_phone_digits() {
        let service = service().await;
        let staff = account(&service, Role::Staff, "staff@example.com").await;

        let patient = service
            .create_patient(&staff, new_patient(Some("Ada@Example.com"), Some("+41 79 123 45 67")))
            .await
            .unwrap();

        let session = service
            .signin(SigninRequest {
                email: "ada@example.com".to_string(),
                password: "41791234567".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(session.user.role, Role::User);
        assert_eq!(session.user.patient, Some(patient.id));
        assert_eq!(patient.user, Some(session.user.id));
        assert_eq!(
            audit_actions(&service).await.iter().filter(|a| *a == "Create User").count(),
            1
        );
    }

    #[tokio::test]
    async fn existing_account_is_linked_not_duplicated() {
        let service = service().await;
        let staff = account(&service, Role::Staff, "staff@example.com").await;
        let user = account(&service, Role::User, "ada@example.com").await;

        let patient = service
            .create_patient(&staff, new_patient(Some("ada@example.com"), Some("0791234567")))
            .await
            .unwrap();

        assert_eq!(patient.user, Some(user.id));
        let users: Vec<User> = service.db.find(&Filter::All).await.unwrap();
        assert_eq!(users.len(), 2);
        let linked: User = service.db.get(user.id).await.unwrap().unwrap();
        assert_eq!(linked.patient, Some(patient.id));
    }

    #[tokio::test]
    async fn patient_without_both_contacts_gets_no_account() {
        let service = service().await;
        let staff = account(&service, Role::Staff, "staff@example.com").await;

        let patient = service
            .create_patient(&staff, new_patient(None, Some("0791234567")))
            .await
            .unwrap();
        assert_eq!(patient.user, None);

        let missing = service.create_patient(&staff, new_patient(None, None)).await;
        assert!(matches!(missing, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn failed_patient_insert_removes_provisioned_account() {
        struct NoPatients(JsonFileStore);

        #[async_trait]
        impl DocumentStore for NoPatients {
            async fn insert(&self, c: &str, id: Uuid, doc: Value) -> Result<(), StoreError> {
                if c == "patients" {
                    return Err(StoreError::Io(std::io::Error::other("disk full")));
                }
                self.0.insert(c, id, doc).await
            }
            async fn get(&self, c: &str, id: Uuid) -> Result<Option<Value>, StoreError> {
                self.0.get(c, id).await
            }
            async fn replace(&self, c: &str, id: Uuid, doc: Value) -> Result<bool, StoreError> {
                self.0.replace(c, id, doc).await
            }
            async fn remove(&self, c: &str, id: Uuid) -> Result<bool, StoreError> {
                self.0.remove(c, id).await
            }
            async fn find(&self, c: &str, f: &Filter) -> Result<Vec<Value>, StoreError> {
                self.0.find(c, f).await
            }
        }

        let service = service_on(Database::new(Arc::new(NoPatients(JsonFileStore::memory())))).await;
        let staff = account(&service, Role::Staff, "staff@example.com").await;

        let result = service
            .create_patient(&staff, new_patient(Some("ada@example.com"), Some("0791234567")))
            .await;
        assert!(matches!(result, Err(AppError::Internal(_))));

        let users: Vec<User> = service.db.find(&Filter::All).await.unwrap();
        assert_eq!(users.len(), 1, "only the staff account remains");
    }

    #[tokio::test]
    async fn user_role_sees_only_own_patient() {
        let service = service().await;
        let staff = account(&service, Role::Staff, "staff@example.com").await;
        let mine = service
            .create_patient(&staff, new_patient(Some("ada@example.com"), Some("0791234567")))
            .await
            .unwrap();
        let other = service
            .create_patient(&staff, new_patient(Some("bob@example.com"), Some("0797654321")))
            .await
            .unwrap();

        let me: User = service.db.get(mine.user.unwrap()).await.unwrap().unwrap();
        let actor = me.actor();

        assert_eq!(service.get_patient(&actor, mine.id).await.unwrap().0.id, mine.id);
        assert!(matches!(
            service.get_patient(&actor, other.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_may_be_empty() {
        let service = service().await;
        let staff = account(&service, Role::Staff, "staff@example.com").await;
        service
            .create_patient(&staff, new_patient(Some("ada@example.com"), Some("0791234567")))
            .await
            .unwrap();

        assert_eq!(service.search_patients(&staff, "LOVE").await.unwrap().len(), 1);
        assert_eq!(service.search_patients(&staff, "079 123").await.unwrap().len(), 1);
        assert!(service.search_patients(&staff, "zebra").await.unwrap().is_empty());

        let doctor = account(&service, Role::Doctor, "doc@example.com").await;
        assert!(matches!(
            service.search_patients(&doctor, "ada").await,
            Err(AppError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn update_checks_uniqueness_against_others() {
        let service = service().await;
        let staff = account(&service, Role::Staff, "staff@example.com").await;
        let ada = service
            .create_patient(&staff, new_patient(Some("ada@example.com"), None))
            .await
            .unwrap();
        service
            .create_patient(&staff, new_patient(Some("bob@example.com"), None))
            .await
            .unwrap();

        let keep_own = PatientUpdate {
            email: Some("ada@example.com".to_string()),
            address: Some("12 Analytical St".to_string()),
            ..Default::default()
        };
        let updated = service.update_patient(&staff, ada.id, keep_own).await.unwrap();
        assert_eq!(updated.address.as_deref(), Some("12 Analytical St"));

        let steal = PatientUpdate {
            email: Some("bob@example.com".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            service.update_patient(&staff, ada.id, steal).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn deleting_unknown_patient_is_not_found() {
        let service = service().await;
        let admin = account(&service, Role::Admin, "admin@example.com").await;

        assert!(matches!(
            service.delete_patient(&admin, PatientId::new()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deleting_patient_unlinks_account() {
        let service = service().await;
        let staff = account(&service, Role::Staff, "staff@example.com").await;
        let patient = service
            .create_patient(&staff, new_patient(Some("ada@example.com"), Some("0791234567")))
            .await
            .unwrap();

        service.delete_patient(&staff, patient.id).await.unwrap();

        let user: User = service.db.get(patient.user.unwrap()).await.unwrap().unwrap();
        assert_eq!(user.patient, None);
        assert!(audit_actions(&service).await.contains(&"Delete Patient".to_string()));
    }
}
