use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::{info, warn};

const MAX_SESSION_TTL_HOURS: u64 = 24 * 365;
const MAX_RESET_CODE_TTL_MINUTES: u64 = 24 * 60;

/// SMTP settings for the password reset mailer.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: String,
    pub database_url: String,
    pub session_ttl: Duration,
    pub reset_code_ttl: Duration,
    pub cors_origin: Option<String>,
    pub static_dir: String,
    pub smtp: Option<SmtpConfig>,
}

impl Config {
    pub fn load() -> Self {
        let session_hours = at_most(
            "SESSION_TTL_HOURS",
            try_load("SESSION_TTL_HOURS", "24"),
            MAX_SESSION_TTL_HOURS,
            24,
        );
        let reset_minutes = at_most(
            "RESET_CODE_TTL_MINUTES",
            try_load("RESET_CODE_TTL_MINUTES", "60"),
            MAX_RESET_CODE_TTL_MINUTES,
            60,
        );

        Self {
            addr: try_load("EVENTSHARE_ADDR", "127.0.0.1:3000"),
            database_url: try_load("DATABASE_URL", "sqlite://eventshare.db?mode=rwc"),
            session_ttl: Duration::from_secs(session_hours * 60 * 60),
            reset_code_ttl: Duration::from_secs(reset_minutes * 60),
            cors_origin: var("CORS_ORIGIN"),
            static_dir: try_load("STATIC_DIR", "static"),
            smtp: load_smtp(),
        }
    }

    /// Configuration for an in-memory database, used by tests and local tinkering.
    pub fn in_memory() -> Self {
        Self {
            addr: "127.0.0.1:0".to_string(),
            database_url: "sqlite::memory:".to_string(),
            session_ttl: Duration::from_secs(24 * 60 * 60),
            reset_code_ttl: Duration::from_secs(60 * 60),
            cors_origin: None,
            static_dir: "static".to_string(),
            smtp: None,
        }
    }
}

fn load_smtp() -> Option<SmtpConfig> {
    let host = var("SMTP_HOST")?;
    let (Some(username), Some(password)) = (var("SMTP_USERNAME"), var("SMTP_PASSWORD")) else {
        warn!("SMTP_HOST is set but SMTP_USERNAME/SMTP_PASSWORD are missing, mailer disabled");
        return None;
    };

    Some(SmtpConfig {
        port: try_load("SMTP_PORT", "465"),
        from: var("SMTP_FROM").unwrap_or_else(|| username.clone()),
        host,
        username,
        password,
    })
}

fn at_most(key: &str, value: u64, max: u64, default: u64) -> u64 {
    if (1..=max).contains(&value) {
        value
    } else {
        warn!("{key} must be between 1 and {max}, using default: {default}");
        default
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    parse_or_default(key, &raw, default)
}

fn parse_or_default<T: FromStr>(key: &str, raw: &str, default: &str) -> T
where
    T::Err: Display,
{
    match raw.parse() {
        Ok(value) => value,
        Err(e) => {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            match default.parse() {
                Ok(value) => value,
                Err(_) => unreachable!("default for {key} must parse"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_values_fall_back_to_default() {
        let hours: u64 = parse_or_default("SESSION_TTL_HOURS", "soon", "24");
        assert_eq!(hours, 24);

        let port: u16 = parse_or_default("SMTP_PORT", "587", "465");
        assert_eq!(port, 587);
    }

    #[test]
    fn ttls_outside_range_fall_back_to_default() {
        assert_eq!(at_most("SESSION_TTL_HOURS", 48, MAX_SESSION_TTL_HOURS, 24), 48);
        assert_eq!(at_most("SESSION_TTL_HOURS", 0, MAX_SESSION_TTL_HOURS, 24), 24);
        assert_eq!(at_most("SESSION_TTL_HOURS", u64::MAX, MAX_SESSION_TTL_HOURS, 24), 24);
    }

    #[test]
    fn in_memory_config_has_no_mailer() {
        let config = Config::in_memory();
        assert!(config.smtp.is_none());
        assert_eq!(config.database_url, "sqlite::memory:");
    }
}
