//! Domain operations, and single entry point for access control.
//!
//! Every public operation takes the acting [`Actor`] and runs, in order:
//! role check, business rules, persistence, audit.

pub mod appointments;
pub mod auth;
pub mod history;
pub mod invoices;
pub mod patients;
pub mod profile;
pub mod reports;
pub mod users;

use std::sync::Arc;

use anyhow::Context as _;
use chrono::Utc;
use log::info;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::audit::AuditRecorder;
use crate::authorization::{Context, Enforcer, Operation};
use crate::config::{AdminSeed, Config, RateLimits};
use crate::consts::AUDIT_LOG_PAGE;
use crate::db::{Database, Filter, JsonFileStore};
use crate::email::{Mailer, OutboxMailer};
use crate::error::{AppError, AppResult};
use crate::models::{Actor, AuditLog, EntityKind, Role, User, UserId};
use crate::utils::password_utils::hash_async;
use crate::utils::tokens::TokenIssuer;
use crate::utils::validation::{EmailInput, PasswordInput};

#[derive(Clone)]
pub struct Service {
    db: Database,
    enforcer: Arc<Enforcer>,
    audit: AuditRecorder,
    tokens: Arc<TokenIssuer>,
    mailer: Arc<dyn Mailer>,
    reset_url_base: String,
    rate_limits: RateLimits,
}

impl Service {
    pub async fn new(db: Database, config: &Config) -> anyhow::Result<Self> {
        let enforcer = Enforcer::load()
            .await
            .context("Failed to load the access policy")?;

        Ok(Self {
            audit: AuditRecorder::new(db.clone()),
            mailer: Arc::new(OutboxMailer::new(db.clone())),
            db,
            enforcer: Arc::new(enforcer),
            tokens: Arc::new(TokenIssuer::new(&config.jwt_secret, config.jwt_ttl_secs)),
            reset_url_base: config.reset_url_base.clone(),
            rate_limits: config.rate_limits,
        })
    }

    /// Opens the configured store, or a memory-only one.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let db = match &config.db_path {
            Some(path) => {
                info!("Loading document store from {}", path.display());
                let store = JsonFileStore::open(path.clone())
                    .with_context(|| format!("Failed to open {}", path.display()))?;
                Database::new(Arc::new(store))
            }
            None => Database::memory(),
        };
        Self::new(db, config).await
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn rate_limits(&self) -> RateLimits {
        self.rate_limits
    }

    fn enforce<'a>(&'a self, actor: &'a Actor) -> Context<'a> {
        self.enforcer.with_actor(actor)
    }

    async fn record(
        &self,
        actor: Option<&Actor>,
        action: &str,
        kind: EntityKind,
        target: impl Into<Uuid>,
        details: Value,
    ) {
        self.audit
            .record(actor, action, kind, Some(target.into()), details)
            .await
    }

    /// Resolves a bearer token to the current state of its account.
    ///
    /// The role is re-read from the store, so role changes and deactivation
    /// apply to tokens already issued.
    pub async fn authenticate(&self, token: &str) -> AppResult<Actor> {
        let claims = self.tokens.verify(token)?;

        let user: User = self.db.get(claims.sub).await?.ok_or_else(|| {
            AppError::authentication("The user belonging to this token no longer exists")
        })?;

        if !user.active {
            return Err(AppError::authentication("Account is deactivated"));
        }

        Ok(user.actor())
    }

    /// Creates the administrator account named in the configuration, once.
    pub async fn ensure_admin(&self, seed: &AdminSeed) -> anyhow::Result<()> {
        let email = EmailInput::new(&seed.email).context("Invalid ADMIN_EMAIL")?;
        let password = PasswordInput::new(&seed.password).context("Invalid ADMIN_PASSWORD")?;

        let existing: Option<User> = self
            .db
            .find_one(&Filter::eq("email", email.as_str()))
            .await?;
        if let Some(user) = existing {
            if user.role != Role::Admin {
                log::warn!("{} exists but is not an administrator", email);
            }
            return Ok(());
        }

        let admin = User {
            id: UserId::new(),
            full_name: "Administrator".to_string(),
            email: email.into_inner(),
            phone: None,
            password: hash_async(password.as_str().to_string()).await?,
            role: Role::Admin,
            active: true,
            patient: None,
            password_reset_token: None,
            password_reset_expires: None,
            created_at: Utc::now(),
        };
        self.db.insert(&admin).await?;
        info!("Created administrator account {}", admin.email);

        self.record(None, "Create Admin", EntityKind::User, admin.id, json!({ "email": admin.email }))
            .await;
        Ok(())
    }

    /// Most recent audit entries, newest first.
    pub async fn recent_audit_logs(&self, actor: &Actor) -> AppResult<Vec<AuditLog>> {
        self.enforce(actor).authorize(Operation::ReadAuditLog)?;
        Ok(self.audit.recent(AUDIT_LOG_PAGE).await?)
    }
}

/// Maps a failed input check to a validation error naming the field.
fn invalid(field: &'static str) -> impl FnOnce(anyhow::Error) -> AppError {
    move |e| AppError::validation(format!("Invalid {field}: {}", e.root_cause()))
}

#[cfg(test)]
pub(crate) mod test {
    //! Fixtures shared by the service tests.

    use super::*;
    use crate::utils::password_utils::hash;

    pub async fn service() -> Service {
        Service::new(Database::memory(), &Config::default()).await.unwrap()
    }

    pub async fn service_on(db: Database) -> Service {
        Service::new(db, &Config::default()).await.unwrap()
    }

    /// Inserts an active account with password `password123`.
    pub async fn account(service: &Service, role: Role, email: &str) -> Actor {
        let user = User {
            id: UserId::new(),
            full_name: format!("{role} account"),
            email: email.to_string(),
            phone: None,
            password: hash("password123").unwrap(),
            role,
            active: true,
            patient: None,
            password_reset_token: None,
            password_reset_expires: None,
            created_at: Utc::now(),
        };
        service.db.insert(&user).await.unwrap();
        user.actor()
    }

    pub async fn audit_actions(service: &Service) -> Vec<String> {
        service
            .audit
            .recent(usize::MAX)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.action)
            .collect()
    }

    #[tokio::test]
    async fn authenticate_rejects_deactivated_and_deleted_accounts() {
        let service = service().await;
        let actor = account(&service, Role::Doctor, "doc@example.com").await;
        let token = service.tokens.issue(actor.id, actor.role).unwrap();

        assert_eq!(service.authenticate(&token).await.unwrap(), actor);

        let mut user: User = service.db.get(actor.id).await.unwrap().unwrap();
        user.active = false;
        service.db.save(&user).await.unwrap();
        assert!(matches!(
            service.authenticate(&token).await,
            Err(AppError::Authentication(_))
        ));

        service.db.delete::<User>(actor.id).await.unwrap();
        assert!(matches!(
            service.authenticate(&token).await,
            Err(AppError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn authenticate_uses_current_role() {
        let service = service().await;
        let actor = account(&service, Role::Staff, "staff@example.com").await;
        let token = service.tokens.issue(actor.id, actor.role).unwrap();

        let mut user: User = service.db.get(actor.id).await.unwrap().unwrap();
        user.role = Role::User;
        service.db.save(&user).await.unwrap();

        assert_eq!(service.authenticate(&token).await.unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn admin_seed_is_created_once() {
        let service = service().await;
        let seed = AdminSeed {
            email: "Root@Clinic.example".to_string(),
            password: "change-me-now".to_string(),
        };

        service.ensure_admin(&seed).await.unwrap();
        service.ensure_admin(&seed).await.unwrap();

        let admins: Vec<User> = service.db.find(&Filter::eq("role", Role::Admin)).await.unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].email, "root@clinic.example");

        let entries = service.audit.recent(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user.role, "system");
    }

    #[tokio::test]
    async fn audit_log_is_admin_only() {
        let service = service().await;
        let admin = account(&service, Role::Admin, "admin@example.com").await;
        let staff = account(&service, Role::Staff, "staff@example.com").await;

        assert!(service.recent_audit_logs(&admin).await.is_ok());
        assert!(matches!(
            service.recent_audit_logs(&staff).await,
            Err(AppError::Authorization(_))
        ));
    }
}
