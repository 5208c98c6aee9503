//! The caller's own account

use serde::Deserialize;
use serde_json::json;

use crate::authorization::Operation;
use crate::error::{AppError, AppResult};
use crate::models::{Actor, EntityKind, User};
use crate::services::{invalid, Service};
use crate::utils::validation::{EmailInput, TextInput};

/// Only the name and email can be changed here. Role, status and password
/// have their own paths.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

impl Service {
    pub async fn get_profile(&self, actor: &Actor) -> AppResult<User> {
        self.enforce(actor).authorize(Operation::ReadProfile)?;
        self.db
            .get(actor.id)
            .await?
            .ok_or_else(|| AppError::not_found("No user found with that ID"))
    }

    pub async fn update_profile(&self, actor: &Actor, update: ProfileUpdate) -> AppResult<User> {
        self.enforce(actor).authorize(Operation::UpdateProfile)?;

        let mut user: User = self
            .db
            .get(actor.id)
            .await?
            .ok_or_else(|| AppError::not_found("No user found with that ID"))?;
        let mut changed = Vec::new();

        if let Some(full_name) = &update.full_name {
            user.full_name = TextInput::new_short_form(full_name)
                .map_err(invalid("fullName"))?
                .into_inner();
            changed.push("fullName");
        }
        if let Some(email) = &update.email {
            let email = EmailInput::new(email).map_err(invalid("email"))?.into_inner();
            if email != user.email {
                if self.user_by_email(&email).await?.is_some() {
                    return Err(AppError::conflict("Email already exists"));
                }
                user.email = email;
                changed.push("email");
            }
        }

        self.db.save(&user).await?;

        self.record(
            Some(actor),
            "Update Profile",
            EntityKind::User,
            user.id,
            json!({ "fields": changed }),
        )
        .await;
        Ok(user)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::models::Role;
    use crate::services::test::*;

    #[tokio::test]
    async fn every_role_edits_own_profile() {
        let service = service().await;
        let user = account(&service, Role::User, "ada@example.com").await;

        let update = ProfileUpdate {
            full_name: Some("Ada King".to_string()),
            email: Some("Countess@Example.com".to_string()),
        };
        let profile = service.update_profile(&user, update).await.unwrap();

        assert_eq!(profile.full_name, "Ada King");
        assert_eq!(profile.email, "countess@example.com");
        assert_eq!(service.get_profile(&user).await.unwrap().email, "countess@example.com");
        assert!(audit_actions(&service).await.contains(&"Update Profile".to_string()));
    }

    #[tokio::test]
    async fn taken_email_is_a_conflict() {
        let service = service().await;
        let user = account(&service, Role::User, "ada@example.com").await;
        account(&service, Role::Doctor, "doc@example.com").await;

        let update = ProfileUpdate {
            email: Some("doc@example.com".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            service.update_profile(&user, update).await,
            Err(AppError::Conflict(_))
        ));

        let unchanged = ProfileUpdate {
            email: Some("ada@example.com".to_string()),
            ..Default::default()
        };
        assert!(service.update_profile(&user, unchanged).await.is_ok());
    }
}
