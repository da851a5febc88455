//! Process configuration, read from environment variables.

use std::str::FromStr;

use thiserror::Error;

const DEV_JWT_SECRET: &str = "dev-secret";

/// Session lifetimes are capped at one year.
pub const MAX_JWT_EXPIRES_IN_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    InMemory,
    Postgres { database_url: String },
}

/// First administrator, created at startup if the username is free.
#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl core::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub jwt_secret: String,
    pub jwt_expires_in_secs: i64,
    /// Base of links embedded in outgoing mail.
    pub app_url: String,
    pub login_rate_limit_max: u32,
    pub login_rate_limit_window_secs: u64,
    pub persistence: Persistence,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("jwt_expires_in_secs", &self.jwt_expires_in_secs)
            .field("app_url", &self.app_url)
            .field("login_rate_limit_max", &self.login_rate_limit_max)
            .field("login_rate_limit_window_secs", &self.login_rate_limit_window_secs)
            .field("persistent", &matches!(self.persistence, Persistence::Postgres { .. }))
            .field("bootstrap_admin", &self.bootstrap_admin)
            .finish_non_exhaustive()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_expires_in_secs: 3600,
            app_url: "http://localhost:5173".to_string(),
            login_rate_limit_max: 20,
            login_rate_limit_window_secs: 60,
            persistence: Persistence::InMemory,
            bootstrap_admin: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset and empty values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            defaults.jwt_secret.clone()
        });

        let persistent = parse_or("USE_PERSISTENT_STORES", get("USE_PERSISTENT_STORES"), false, parse_flag)?;
        let persistence = if persistent {
            let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
            Persistence::Postgres { database_url }
        } else {
            Persistence::InMemory
        };

        let bootstrap_admin = match (get("ADMIN_USERNAME"), get("ADMIN_EMAIL"), get("ADMIN_PASSWORD")) {
            (Some(username), Some(email), Some(password)) => Some(BootstrapAdmin {
                username,
                email,
                password,
            }),
            (None, None, None) => None,
            _ => return Err(ConfigError::Missing("ADMIN_USERNAME, ADMIN_EMAIL and ADMIN_PASSWORD")),
        };

        let jwt_expires_in_secs = parse_or(
            "JWT_EXPIRES_IN_SECS",
            get("JWT_EXPIRES_IN_SECS"),
            defaults.jwt_expires_in_secs,
            |v| parse_positive(v).filter(|secs| *secs <= MAX_JWT_EXPIRES_IN_SECS),
        )?;
        let login_rate_limit_max = parse_or(
            "LOGIN_RATE_LIMIT_MAX",
            get("LOGIN_RATE_LIMIT_MAX"),
            defaults.login_rate_limit_max,
            parse_positive,
        )?;
        let login_rate_limit_window_secs = parse_or(
            "LOGIN_RATE_LIMIT_WINDOW_SECS",
            get("LOGIN_RATE_LIMIT_WINDOW_SECS"),
            defaults.login_rate_limit_window_secs,
            parse_positive,
        )?;

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            jwt_secret,
            jwt_expires_in_secs,
            app_url: get("APP_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.app_url),
            login_rate_limit_max,
            login_rate_limit_window_secs,
            persistence,
            bootstrap_admin,
        })
    }
}

fn parse_or<T>(
    key: &'static str,
    raw: Option<String>,
    default: T,
    parse: fn(&str) -> Option<T>,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => parse(&value).ok_or(ConfigError::Invalid { key, value }),
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_positive<T>(v: &str) -> Option<T>
where
    T: FromStr + PartialOrd + Default,
{
    v.parse::<T>().ok().filter(|n| *n > T::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.jwt_secret, DEV_JWT_SECRET);
    }

    #[test]
    fn overrides_are_read() {
        let cfg = config(&[
            ("JWT_SECRET", "s3cret"),
            ("JWT_EXPIRES_IN_SECS", "600"),
            ("APP_URL", "https://terra.example/"),
            ("LOGIN_RATE_LIMIT_MAX", "5"),
            ("LOGIN_RATE_LIMIT_WINDOW_SECS", "10"),
            ("BIND_ADDR", "127.0.0.1:9000"),
        ])
        .unwrap();

        assert_eq!(cfg.jwt_secret, "s3cret");
        assert_eq!(cfg.jwt_expires_in_secs, 600);
        assert_eq!(cfg.app_url, "https://terra.example");
        assert_eq!(cfg.login_rate_limit_max, 5);
        assert_eq!(cfg.login_rate_limit_window_secs, 10);
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000");
    }

    #[test]
    fn persistent_stores_require_database_url() {
        assert_eq!(
            config(&[("USE_PERSISTENT_STORES", "true")]),
            Err(ConfigError::Missing("DATABASE_URL"))
        );

        let cfg = config(&[("USE_PERSISTENT_STORES", "1"), ("DATABASE_URL", "postgres://db/terra")]).unwrap();
        assert_eq!(
            cfg.persistence,
            Persistence::Postgres {
                database_url: "postgres://db/terra".into()
            }
        );
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        assert!(matches!(
            config(&[("JWT_EXPIRES_IN_SECS", "soon")]),
            Err(ConfigError::Invalid { key: "JWT_EXPIRES_IN_SECS", .. })
        ));
        assert!(matches!(
            config(&[("LOGIN_RATE_LIMIT_MAX", "0")]),
            Err(ConfigError::Invalid { key: "LOGIN_RATE_LIMIT_MAX", .. })
        ));
    }

    #[test]
    fn session_lifetime_is_capped() {
        let max = MAX_JWT_EXPIRES_IN_SECS.to_string();
        assert_eq!(config(&[("JWT_EXPIRES_IN_SECS", max.as_str())]).unwrap().jwt_expires_in_secs, MAX_JWT_EXPIRES_IN_SECS);

        for value in [(MAX_JWT_EXPIRES_IN_SECS + 1).to_string(), i64::MAX.to_string()] {
            let result = config(&[("JWT_EXPIRES_IN_SECS", value.as_str())]);
            assert_eq!(
                result,
                Err(ConfigError::Invalid {
                    key: "JWT_EXPIRES_IN_SECS",
                    value,
                })
            );
        }
    }

    #[test]
    fn bootstrap_admin_needs_all_three_values() {
        assert!(config(&[("ADMIN_USERNAME", "root")]).is_err());

        let cfg = config(&[
            ("ADMIN_USERNAME", "root"),
            ("ADMIN_EMAIL", "root@example.com"),
            ("ADMIN_PASSWORD", "change-me-now"),
        ])
        .unwrap();
        let admin = cfg.bootstrap_admin.unwrap();
        assert_eq!(admin.username, "root");
        assert!(!format!("{admin:?}").contains("change-me-now"));
    }
}
