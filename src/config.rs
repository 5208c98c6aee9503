//! Runtime configuration, read from the environment (and `.env`).

use std::{env, path::PathBuf};

use anyhow::{Context, Result};

use crate::consts;

/// Credentials of the administrator account created at startup.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
}

/// Requests allowed per client within one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub api: u32,
    pub auth: u32,
    pub window_secs: u64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            api: consts::API_RATE_LIMIT,
            auth: consts::AUTH_RATE_LIMIT,
            window_secs: consts::RATE_LIMIT_WINDOW_SECS,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value.parse().with_context(|| format!("Invalid {name}")),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_secs: i64,
    /// Snapshot file of the document store. `None` keeps everything in memory.
    pub db_path: Option<PathBuf>,
    pub reset_url_base: String,
    pub admin: Option<AdminSeed>,
    pub rate_limits: RateLimits,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = env_or("PORT", consts::HTTP_PORT)?;
        let jwt_ttl_secs = env_or("JWT_EXPIRES_IN_SECS", consts::JWT_TTL_SECS)?;
        let rate_limits = RateLimits {
            api: env_or("API_RATE_LIMIT", consts::API_RATE_LIMIT)?,
            auth: env_or("AUTH_RATE_LIMIT", consts::AUTH_RATE_LIMIT)?,
            window_secs: env_or("RATE_LIMIT_WINDOW_SECS", consts::RATE_LIMIT_WINDOW_SECS)?,
        };

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            log::warn!("JWT_SECRET not set, using the development key");
            consts::JWT_SECRET.to_string()
        });

        let db_path = match env::var("DB_PATH") {
            Ok(path) if path.is_empty() => None,
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => Some(PathBuf::from(consts::DB_PATH)),
        };

        let admin = match (env::var("ADMIN_EMAIL"), env::var("ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) => Some(AdminSeed { email, password }),
            _ => None,
        };

        Ok(Self {
            port,
            jwt_secret,
            jwt_ttl_secs,
            db_path,
            reset_url_base: env::var("RESET_URL_BASE")
                .unwrap_or_else(|_| consts::RESET_URL_BASE.to_string()),
            admin,
            rate_limits,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: consts::HTTP_PORT,
            jwt_secret: consts::JWT_SECRET.to_string(),
            jwt_ttl_secs: consts::JWT_TTL_SECS,
            db_path: None,
            reset_url_base: consts::RESET_URL_BASE.to_string(),
            admin: None,
            rate_limits: RateLimits::default(),
        }
    }
}
