// src/config.rs
use rust_decimal::Decimal;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://finance.db";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3030";
pub const DEFAULT_QUOTE_API_URL: &str = "https://www.alphavantage.co/query";
pub const DEFAULT_STARTING_CASH: &str = "10000.00";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 12 * 60 * 60;
pub const DEFAULT_BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("API_KEY not set")]
    MissingApiKey,
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub quote_api_url: String,
    pub session_secret: String,
    pub session_ttl_secs: u64,
    pub starting_cash: Decimal,
    pub bcrypt_cost: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let session_secret = lookup("SESSION_SECRET")
            .filter(|secret| !secret.is_empty())
            .unwrap_or_else(|| format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()));

        Ok(Config {
            api_key,
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            bind_addr: parse_var(&lookup, "BIND_ADDR", DEFAULT_BIND_ADDR)?,
            quote_api_url: lookup("QUOTE_API_URL")
                .unwrap_or_else(|| DEFAULT_QUOTE_API_URL.to_string()),
            session_secret,
            session_ttl_secs: parse_var(
                &lookup,
                "SESSION_TTL_SECS",
                &DEFAULT_SESSION_TTL_SECS.to_string(),
            )?,
            starting_cash: parse_var(&lookup, "STARTING_CASH", DEFAULT_STARTING_CASH)?,
            bcrypt_cost: parse_var(&lookup, "BCRYPT_COST", &DEFAULT_BCRYPT_COST.to_string())?,
        })
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let value = lookup(name).unwrap_or_else(|| default.to_string());
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn missing_api_key_fails_startup() {
        assert_eq!(config_from(&[]).unwrap_err(), ConfigError::MissingApiKey);
        assert_eq!(
            config_from(&[("API_KEY", "  ")]).unwrap_err(),
            ConfigError::MissingApiKey
        );
    }

    #[test]
    fn defaults_apply_when_only_api_key_is_set() {
        let config = config_from(&[("API_KEY", "demo")]).unwrap();
        assert_eq!(config.api_key, "demo");
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR.parse().unwrap());
        assert_eq!(config.quote_api_url, DEFAULT_QUOTE_API_URL);
        assert_eq!(config.session_ttl_secs, DEFAULT_SESSION_TTL_SECS);
        assert_eq!(config.starting_cash, Decimal::new(1_000_000, 2));
        assert_eq!(config.bcrypt_cost, DEFAULT_BCRYPT_COST);
        assert_eq!(config.session_secret.len(), 64);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = config_from(&[("API_KEY", "demo"), ("BIND_ADDR", "nowhere")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "BIND_ADDR",
                value: "nowhere".to_string()
            }
        );
        assert!(config_from(&[("API_KEY", "demo"), ("STARTING_CASH", "lots")]).is_err());
    }
}
