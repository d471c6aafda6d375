//! Environment-driven configuration.
//!
//! Values come from the process environment, optionally pre-loaded from a
//! `.env` file with `dotenv`.

use anyhow::{anyhow, Context};
use dotenv::dotenv;

use crate::ids::IdScheme;
use crate::service::ServiceSettings;
use crate::workflow::TransitionPolicy;

/// Runtime configuration shared by the server and the sweep worker.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// PostgreSQL connection string; the in-memory store is used when unset
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub server_host: String,
    pub server_port: u16,
    /// Scheme used for new order identifiers
    pub order_id_scheme: IdScheme,
    /// Retry with the high-volume order scheme once the standard one overflows
    pub escalate_order_ids: bool,
    pub cancellation_reason_min_chars: usize,
    pub integrity_sweep_interval_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 10,
            server_host: "0.0.0.0".to_string(),
            server_port: 3000,
            order_id_scheme: IdScheme::Order,
            escalate_order_ids: true,
            cancellation_reason_min_chars: 5,
            integrity_sweep_interval_seconds: 300,
        }
    }
}

impl AppConfig {
    /// Loads `.env` (if present) and reads the configuration from the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error when a variable is set but cannot be parsed.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let order_id_scheme = match var("ORDER_ID_SCHEME").as_deref() {
            None | Some("standard") => IdScheme::Order,
            Some("high_volume") => IdScheme::OrderHighVolume,
            Some(other) => {
                return Err(anyhow!(
                    "Invalid ORDER_ID_SCHEME '{}': expected 'standard' or 'high_volume'",
                    other
                ))
            }
        };

        let escalate_order_ids = match var("ESCALATE_ORDER_IDS") {
            None => defaults.escalate_order_ids,
            Some(v) => parse_bool(&v).ok_or_else(|| anyhow!("Invalid ESCALATE_ORDER_IDS '{}'", v))?,
        };

        Ok(Self {
            database_url: var("DATABASE_URL"),
            database_max_connections: parse_or(
                var("DATABASE_MAX_CONNECTIONS"),
                defaults.database_max_connections,
                "DATABASE_MAX_CONNECTIONS",
            )?,
            server_host: var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_or(var("SERVER_PORT"), defaults.server_port, "SERVER_PORT")?,
            order_id_scheme,
            escalate_order_ids,
            cancellation_reason_min_chars: parse_or(
                var("CANCELLATION_REASON_MIN_CHARS"),
                defaults.cancellation_reason_min_chars,
                "CANCELLATION_REASON_MIN_CHARS",
            )?,
            integrity_sweep_interval_seconds: parse_or(
                var("INTEGRITY_SWEEP_INTERVAL_SECONDS"),
                defaults.integrity_sweep_interval_seconds,
                "INTEGRITY_SWEEP_INTERVAL_SECONDS",
            )?,
        })
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            order_scheme: self.order_id_scheme,
            escalate_order_ids: self.escalate_order_ids,
            policy: TransitionPolicy {
                cancellation_reason_min_chars: self.cancellation_reason_min_chars,
            },
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T, key: &str) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        None => Ok(default),
        Some(v) => v.parse::<T>().with_context(|| format!("Invalid {}", key)),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert_eq!(config.service_settings().policy.cancellation_reason_min_chars, 5);
    }

    #[test]
    fn test_reads_every_variable() {
        let config = config(&[
            ("DATABASE_URL", "postgres://localhost/repairdesk"),
            ("SERVER_PORT", "8080"),
            ("ORDER_ID_SCHEME", "high_volume"),
            ("ESCALATE_ORDER_IDS", "false"),
            ("CANCELLATION_REASON_MIN_CHARS", "10"),
            ("INTEGRITY_SWEEP_INTERVAL_SECONDS", "60"),
        ])
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/repairdesk"));
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.order_id_scheme, IdScheme::OrderHighVolume);
        assert!(!config.escalate_order_ids);
        assert_eq!(config.cancellation_reason_min_chars, 10);
        assert_eq!(config.integrity_sweep_interval_seconds, 60);
    }

    #[test]
    fn test_rejects_unparseable_values() {
        assert!(config(&[("SERVER_PORT", "eighty")]).is_err());
        assert!(config(&[("ORDER_ID_SCHEME", "huge")]).is_err());
        assert!(config(&[("ESCALATE_ORDER_IDS", "maybe")]).is_err());
    }
}
