use std::path::PathBuf;

use faceid_core::DEFAULT_MATCH_THRESHOLD;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("TOKEN_SECRET must be set to a non-empty value")]
    MissingTokenSecret,
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 127.0.0.1:3000).
    pub bind_addr: String,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// HMAC secret for session JWTs.
    pub token_secret: String,
    /// Secret for encrypting stored descriptors; plaintext when unset.
    pub descriptor_key: Option<String>,
    /// Euclidean distance threshold for server-side matching.
    pub match_threshold: f32,
    /// Session lifetime in days.
    pub token_ttl_days: i64,
    /// Marks session cookies `Secure`.
    pub production: bool,
    /// Whether `/google-auth` is served.
    pub google_auth_enabled: bool,
    /// Allowed browser origin for credentialed CORS requests.
    pub cors_origin: Option<String>,
}

impl Config {
    /// Load configuration from `FACEID_*` environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("faceid");

        let token_secret = var("TOKEN_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingTokenSecret)?;

        Ok(Self {
            bind_addr: var("FACEID_BIND").unwrap_or_else(|| "127.0.0.1:3000".to_string()),
            db_path: var("FACEID_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("faceid.db")),
            token_secret,
            descriptor_key: var("FACEID_DESCRIPTOR_KEY").filter(|s| !s.is_empty()),
            match_threshold: parse_or(&var, "FACEID_MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD),
            token_ttl_days: parse_or(&var, "FACEID_TOKEN_TTL_DAYS", 7),
            production: flag(&var, "FACEID_PRODUCTION", false),
            google_auth_enabled: flag(&var, "FACEID_GOOGLE_AUTH", false),
            cors_origin: var("FACEID_CORS_ORIGIN").filter(|s| !s.is_empty()),
        })
    }
}

fn parse_or<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match var(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "invalid value; using default");
            default
        }),
    }
}

fn flag(var: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    var(key)
        .map(|v| !matches!(v.as_str(), "0" | "false" | "no" | ""))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("TOKEN_SECRET", "s"), ("HOME", "/home/ada")]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:3000");
        assert_eq!(
            config.db_path,
            PathBuf::from("/home/ada/.local/share/faceid/faceid.db")
        );
        assert_eq!(config.match_threshold, 0.6);
        assert_eq!(config.token_ttl_days, 7);
        assert!(!config.production);
        assert!(!config.google_auth_enabled);
        assert!(config.descriptor_key.is_none());
    }

    #[test]
    fn test_secret_required() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::MissingTokenSecret);
        assert_eq!(
            load(&[("TOKEN_SECRET", "")]).unwrap_err(),
            ConfigError::MissingTokenSecret
        );
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("TOKEN_SECRET", "s"),
            ("XDG_DATA_HOME", "/data"),
            ("FACEID_MATCH_THRESHOLD", "0.45"),
            ("FACEID_TOKEN_TTL_DAYS", "not-a-number"),
            ("FACEID_PRODUCTION", "1"),
            ("FACEID_GOOGLE_AUTH", "true"),
            ("FACEID_DESCRIPTOR_KEY", "k"),
        ])
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/data/faceid/faceid.db"));
        assert_eq!(config.match_threshold, 0.45);
        assert_eq!(config.token_ttl_days, 7);
        assert!(config.production);
        assert!(config.google_auth_enabled);
        assert_eq!(config.descriptor_key.as_deref(), Some("k"));
    }
}
