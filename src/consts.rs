//! Global constants and configuration defaults.

pub const HTTP_PORT: u16 = 5000; // Default HTTP port.
pub const DB_PATH: &str = "./data/prms.json"; // Default document store snapshot.
pub const JWT_SECRET: &str = "super_super_secret_key"; // Development-only signing key.
pub const JWT_TTL_SECS: i64 = 24 * 60 * 60; // Bearer token lifetime.
pub const RESET_URL_BASE: &str = "http://localhost:5173/reset-password"; // Front-end reset page.
pub const RESET_TOKEN_TTL_MINUTES: i64 = 10; // Password reset token lifetime.

pub const MAX_DAILY_APPOINTMENTS: usize = 30; // Per doctor, per calendar day.
pub const DEFAULT_APPOINTMENT_REASON: &str = "General consultation";
pub const AUDIT_LOG_PAGE: usize = 100; // Entries returned by the audit log endpoint.
pub const RECENT_APPOINTMENTS: usize = 5; // Entries in the summary report.
pub const TOP_DIAGNOSES: usize = 10;

pub const API_RATE_LIMIT: u32 = 500; // Requests per client and window on /api.
pub const AUTH_RATE_LIMIT: u32 = 500; // Requests per client and window on /api/auth.
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60 * 60;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 64;
