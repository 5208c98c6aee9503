//! Account administration

use log::info;
use serde::Deserialize;
use serde_json::json;

use crate::authorization::Operation;
use crate::db::Filter;
use crate::error::{AppError, AppResult};
use crate::models::{Actor, EntityKind, Patient, Role, User, UserId};
use crate::services::Service;

#[derive(Debug, Deserialize)]
pub struct RoleUpdate {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub active: bool,
}

impl Service {
    async fn find_user(&self, id: UserId) -> AppResult<User> {
        self.db
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("No user found with that ID"))
    }

    /// Every account, oldest first.
    pub async fn list_users(&self, actor: &Actor) -> AppResult<Vec<User>> {
        self.enforce(actor).authorize(Operation::ListUsers)?;

        let mut users: Vec<User> = self.db.find(&Filter::All).await?;
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    pub async fn update_user_role(
        &self,
        actor: &Actor,
        id: UserId,
        update: RoleUpdate,
    ) -> AppResult<User> {
        let context = self.enforce(actor);
        context.authorize(Operation::UpdateUserRole)?;

        let mut user = self.find_user(id).await?;
        context.manage_user(&user)?;

        let from = user.role;
        user.role = update.role;
        if !self.db.save(&user).await? {
            return Err(AppError::not_found("No user found with that ID"));
        }
        info!("Role of {} changed from {from} to {}", user.email, user.role);

        self.record(
            Some(actor),
            "Update User Role",
            EntityKind::User,
            id,
            json!({ "from": from, "to": user.role }),
        )
        .await;
        Ok(user)
    }

    /// Activates or deactivates an account. Deactivated accounts keep their
    /// records but can neither sign in nor use issued tokens.
    pub async fn update_user_status(
        &self,
        actor: &Actor,
        id: UserId,
        change: StatusChange,
    ) -> AppResult<User> {
        let context = self.enforce(actor);
        context.authorize(Operation::UpdateUserStatus)?;

        let mut user = self.find_user(id).await?;
        context.manage_user(&user)?;

        user.active = change.active;
        if !self.db.save(&user).await? {
            return Err(AppError::not_found("No user found with that ID"));
        }

        self.record(
            Some(actor),
            "Update User Status",
            EntityKind::User,
            id,
            json!({ "active": user.active }),
        )
        .await;
        Ok(user)
    }

    /// Removes the account. A linked patient record stays, without owner.
    pub async fn delete_user(&self, actor: &Actor, id: UserId) -> AppResult<()> {
        let context = self.enforce(actor);
        context.authorize(Operation::DeleteUser)?;

        let user = self.find_user(id).await?;
        context.manage_user(&user)?;

        if !self.db.delete::<User>(id).await? {
            return Err(AppError::not_found("No user found with that ID"));
        }

        if let Some(patient_id) = user.patient {
            if let Some(mut patient) = self.db.get::<Patient>(patient_id).await? {
                patient.user = None;
                self.db.save(&patient).await?;
            }
        }

        self.record(
            Some(actor),
            "Delete User",
            EntityKind::User,
            id,
            json!({ "email": user.email, "role": user.role }),
        )
        .await;
        Ok(())
    }
}
