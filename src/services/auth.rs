//! Signup, signin and password reset

use chrono::{Duration, Utc};
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;

use crate::consts::RESET_TOKEN_TTL_MINUTES;
use crate::db::Filter;
use crate::error::{AppError, AppResult};
use crate::models::{EntityKind, Role, User, UserId};
use crate::services::{invalid, Service};
use crate::utils::password_utils::{hash_async, verify_async};
use crate::utils::tokens::{generate_reset_token, hash_reset_token};
use crate::utils::validation::{EmailInput, PasswordInput, PhoneInput, TextInput};

/// Self-registration. Any `role` sent by the client is ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

/// An account together with a fresh bearer token for it.
pub struct Session {
    pub user: User,
    pub token: String,
}

impl Service {
    pub(crate) async fn user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self.db.find_one(&Filter::eq("email", email)).await?)
    }

    fn session(&self, user: User) -> AppResult<Session> {
        let token = self.tokens.issue(user.id, user.role)?;
        Ok(Session { user, token })
    }

    pub async fn signup(&self, request: SignupRequest) -> AppResult<Session> {
        let full_name = TextInput::new_short_form(&request.full_name).map_err(invalid("fullName"))?;
        let email = EmailInput::new(&request.email).map_err(invalid("email"))?;
        let password = PasswordInput::new(&request.password).map_err(invalid("password"))?;
        let phone = request
            .phone
            .as_deref()
            .map(PhoneInput::new)
            .transpose()
            .map_err(invalid("phone"))?;

        if self.user_by_email(email.as_str()).await?.is_some() {
            return Err(AppError::conflict("Email already exists"));
        }
        if let Some(phone) = &phone {
            let taken: Option<User> = self.db.find_one(&Filter::eq("phone", phone.as_str())).await?;
            if taken.is_some() {
                return Err(AppError::conflict("Phone number already exists"));
            }
        }

        let user = User {
            id: UserId::new(),
            full_name: full_name.into_inner(),
            email: email.into_inner(),
            phone: phone.map(PhoneInput::into_inner),
            password: hash_async(password.as_str().to_string()).await?,
            role: Role::User,
            active: true,
            patient: None,
            password_reset_token: None,
            password_reset_expires: None,
            created_at: Utc::now(),
        };
        self.db.insert(&user).await?;
        info!("Account created for {}", user.email);

        let actor = user.actor();
        self.record(Some(&actor), "User Signup", EntityKind::User, user.id, json!({ "email": user.email }))
            .await;

        self.session(user)
    }

    pub async fn signin(&self, request: SigninRequest) -> AppResult<Session> {
        let email = request.email.trim().to_lowercase();
        let user = self.user_by_email(&email).await?;

        let hash = user.as_ref().map(|u| u.password.clone());
        if !verify_async(request.password, hash).await? {
            return Err(AppError::authentication("Invalid email or password"));
        }

        // verify() never accepts a missing hash
        let Some(user) = user else {
            return Err(AppError::authentication("Invalid email or password"));
        };

        if !user.active {
            return Err(AppError::authentication("Account is deactivated"));
        }

        self.session(user)
    }

    /// Stores the hash of a fresh reset token and mails the plaintext.
    ///
    /// When the mail cannot be sent the token fields are restored.
    pub async fn forgot_password(&self, request: ForgotPasswordRequest) -> AppResult<()> {
        let email = request.email.trim().to_lowercase();
        let mut user = self
            .user_by_email(&email)
            .await?
            .ok_or_else(|| AppError::not_found("No user with that email"))?;

        let previous = (user.password_reset_token.take(), user.password_reset_expires.take());
        let (token, hashed) = generate_reset_token();
        user.password_reset_token = Some(hashed);
        user.password_reset_expires = Some(Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES));
        self.db.save(&user).await?;

        let reset_url = format!("{}/{}", self.reset_url_base, token);
        let sent = self
            .mailer
            .send_mail(
                &user.email,
                &format!("Password reset token (valid for {RESET_TOKEN_TTL_MINUTES} minutes)"),
                &format!("Reset your password by visiting: {reset_url}"),
            )
            .await;

        if let Err(e) = sent {
            warn!("Could not send reset email to {}: {e:#}", user.email);
            (user.password_reset_token, user.password_reset_expires) = previous;
            self.db.save(&user).await?;
            return Err(AppError::Dependency(
                "Error sending email. Try again later.".to_string(),
            ));
        }

        let actor = user.actor();
        self.record(Some(&actor), "Request Password Reset", EntityKind::User, user.id, json!({}))
            .await;
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, request: ResetPasswordRequest) -> AppResult<Session> {
        let hashed = hash_reset_token(token);
        let user: Option<User> = self
            .db
            .find_one(&Filter::eq("passwordResetToken", &hashed))
            .await?;

        let mut user = match user {
            Some(user) if user.password_reset_expires.is_some_and(|at| at > Utc::now()) => user,
            _ => return Err(AppError::validation("Token is invalid or expired")),
        };

        let password = PasswordInput::new(&request.password).map_err(invalid("password"))?;
        user.password = hash_async(password.as_str().to_string()).await?;
        user.password_reset_token = None;
        user.password_reset_expires = None;
        self.db.save(&user).await?;

        let actor = user.actor();
        self.record(Some(&actor), "Reset Password", EntityKind::User, user.id, json!({}))
            .await;

        self.session(user)
    }
}
