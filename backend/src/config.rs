use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_ADMIN_PASSWORD: &str = "changeme";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub persist_path: Option<PathBuf>,
    pub admin_password: String,
    pub draw_date: DateTime<Utc>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            persist_path: None,
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
            draw_date: default_draw_date(),
        }
    }
}

fn default_draw_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 12, 5, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

impl Config {
    /// Reads `BIND_ADDR`, `PERSIST_PATH`, `ADMIN_PASSWORD` and `DRAW_DATE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("BIND_ADDR") {
            config.bind_addr = addr.parse().map_err(|e| ConfigError::Invalid {
                var: "BIND_ADDR",
                message: format!("{e}"),
            })?;
        }

        config.persist_path = lookup("PERSIST_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        if let Some(password) = lookup("ADMIN_PASSWORD") {
            if password.is_empty() {
                return Err(ConfigError::Invalid {
                    var: "ADMIN_PASSWORD",
                    message: "must not be empty".into(),
                });
            }
            config.admin_password = password;
        }

        if let Some(date) = lookup("DRAW_DATE") {
            config.draw_date = DateTime::parse_from_rfc3339(date.trim())
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| ConfigError::Invalid {
                    var: "DRAW_DATE",
                    message: format!("{e}"),
                })?;
        }

        Ok(config)
    }
}
