//! # Server Configuration
//!
//! ## Sources (later wins)
//! ```text
//! ┌──────────────────────┐   ┌────────────────────────────┐   ┌───────────────┐
//! │ Defaults (this file) │──►│ server.toml                │──►│ DUKA_* env    │
//! │                      │   │ --config <path>, or        │   │ variables     │
//! │                      │   │ ProjectDirs(ke/duka/pos)   │   │               │
//! └──────────────────────┘   └────────────────────────────┘   └───────────────┘
//! ```
//!
//! ## Example `server.toml`
//! ```toml
//! [server]
//! bind = "0.0.0.0"
//! port = 5000
//!
//! [database]
//! path = "/var/lib/duka/duka.db"
//!
//! [auth]
//! jwt_secret = "long-random-string"
//!
//! [mpesa]
//! environment = "production"
//! consumer_key = "..."
//! consumer_secret = "..."
//! shortcode = "600123"
//! passkey = "..."
//! callback_url = "https://pos.example.co.ke/mpesa/callback"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use duka_db::DbConfig;
use duka_mpesa::config::{SANDBOX_PASSKEY, SANDBOX_SHORTCODE};
use duka_mpesa::{DarajaConfig, MpesaEnvironment};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Signing secret used when none is configured. Refused in production.
pub const DEV_JWT_SECRET: &str = "duka-dev-secret-change-me";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub auth: AuthSection,
    pub mpesa: MpesaSection,
    pub sales: SalesSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        ServerSection {
            bind: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: PathBuf,
    pub max_connections: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        DatabaseSection {
            path: PathBuf::from("duka.db"),
            max_connections: 5,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub jwt_secret: String,
    pub token_lifetime_secs: i64,
}

impl Default for AuthSection {
    fn default() -> Self {
        AuthSection {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_lifetime_secs: 12 * 3600,
        }
    }
}

impl fmt::Debug for AuthSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSection")
            .field("jwt_secret", &"***")
            .field("token_lifetime_secs", &self.token_lifetime_secs)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MpesaSection {
    pub environment: MpesaEnvironment,
    /// Overrides the environment's Daraja URL.
    pub base_url: Option<String>,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub callback_url: String,
    pub timeout_secs: u64,
}

impl Default for MpesaSection {
    fn default() -> Self {
        MpesaSection {
            environment: MpesaEnvironment::Sandbox,
            base_url: None,
            consumer_key: String::new(),
            consumer_secret: String::new(),
            shortcode: SANDBOX_SHORTCODE.to_string(),
            passkey: SANDBOX_PASSKEY.to_string(),
            callback_url: "http://localhost:5000/mpesa/callback".to_string(),
            timeout_secs: 30,
        }
    }
}

impl fmt::Debug for MpesaSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpesaSection")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field("consumer_key", &"***")
            .field("consumer_secret", &"***")
            .field("shortcode", &self.shortcode)
            .field("passkey", &"***")
            .field("callback_url", &self.callback_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl MpesaSection {
    /// Without API credentials the gateway is disabled.
    pub fn is_configured(&self) -> bool {
        !self.consumer_key.trim().is_empty() && !self.consumer_secret.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SalesSection {
    /// Upper bound on a single gateway call made by the engine.
    pub gateway_timeout_secs: u64,
    /// Default age for `POST /mpesa/expire-stale`.
    pub pending_expiry_minutes: u32,
    /// Default age for `POST /inventory/cleanup`.
    pub audit_retention_days: u32,
}

impl Default for SalesSection {
    fn default() -> Self {
        SalesSection {
            gateway_timeout_secs: 30,
            pending_expiry_minutes: 10,
            audit_retention_days: 365,
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Loading
// =============================================================================

impl ServerConfig {
    /// Loads defaults, then the config file, then `DUKA_*` variables.
    ///
    /// An explicit path must exist; the platform default may be absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => ServerConfig::default(),
            },
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }

    /// Overrides fields from environment variables.
    ///
    /// ## Variables
    /// ```text
    /// DUKA_BIND, DUKA_PORT
    /// DUKA_DATABASE_PATH, DUKA_DATABASE_MAX_CONNECTIONS
    /// DUKA_JWT_SECRET, DUKA_TOKEN_LIFETIME_SECS
    /// DUKA_MPESA_ENVIRONMENT, DUKA_MPESA_BASE_URL, DUKA_MPESA_CONSUMER_KEY,
    /// DUKA_MPESA_CONSUMER_SECRET, DUKA_MPESA_SHORTCODE, DUKA_MPESA_PASSKEY,
    /// DUKA_MPESA_CALLBACK_URL, DUKA_MPESA_TIMEOUT_SECS
    /// DUKA_GATEWAY_TIMEOUT_SECS, DUKA_PENDING_EXPIRY_MINUTES,
    /// DUKA_AUDIT_RETENTION_DAYS
    /// ```
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let string = |key: &str, target: &mut String| {
            if let Some(value) = lookup(key) {
                *target = value;
            }
        };

        string("DUKA_BIND", &mut self.server.bind);
        parse_into(&lookup, "DUKA_PORT", &mut self.server.port)?;

        if let Some(path) = lookup("DUKA_DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }
        parse_into(&lookup, "DUKA_DATABASE_MAX_CONNECTIONS", &mut self.database.max_connections)?;

        string("DUKA_JWT_SECRET", &mut self.auth.jwt_secret);
        parse_into(&lookup, "DUKA_TOKEN_LIFETIME_SECS", &mut self.auth.token_lifetime_secs)?;

        if let Some(env) = lookup("DUKA_MPESA_ENVIRONMENT") {
            self.mpesa.environment = env.parse().map_err(|_| ConfigError::InvalidValue {
                key: "DUKA_MPESA_ENVIRONMENT".to_string(),
                value: env.clone(),
            })?;
        }
        if let Some(url) = lookup("DUKA_MPESA_BASE_URL") {
            self.mpesa.base_url = Some(url);
        }
        string("DUKA_MPESA_CONSUMER_KEY", &mut self.mpesa.consumer_key);
        string("DUKA_MPESA_CONSUMER_SECRET", &mut self.mpesa.consumer_secret);
        string("DUKA_MPESA_SHORTCODE", &mut self.mpesa.shortcode);
        string("DUKA_MPESA_PASSKEY", &mut self.mpesa.passkey);
        string("DUKA_MPESA_CALLBACK_URL", &mut self.mpesa.callback_url);
        parse_into(&lookup, "DUKA_MPESA_TIMEOUT_SECS", &mut self.mpesa.timeout_secs)?;

        parse_into(&lookup, "DUKA_GATEWAY_TIMEOUT_SECS", &mut self.sales.gateway_timeout_secs)?;
        parse_into(&lookup, "DUKA_PENDING_EXPIRY_MINUTES", &mut self.sales.pending_expiry_minutes)?;
        parse_into(&lookup, "DUKA_AUDIT_RETENTION_DAYS", &mut self.sales.audit_retention_days)?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let production = self.mpesa.environment == MpesaEnvironment::Production;

        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Invalid("auth.jwt_secret must not be empty".to_string()));
        }
        if production && self.auth.jwt_secret == DEV_JWT_SECRET {
            return Err(ConfigError::Invalid(
                "auth.jwt_secret must be set in production".to_string(),
            ));
        }
        if production && !self.mpesa.callback_url.starts_with("https://") {
            return Err(ConfigError::Invalid(
                "mpesa.callback_url must use https in production".to_string(),
            ));
        }
        if self.auth.token_lifetime_secs <= 0 {
            return Err(ConfigError::Invalid("auth.token_lifetime_secs must be positive".to_string()));
        }
        if self.mpesa.timeout_secs == 0 || self.sales.gateway_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be greater than zero".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid("database.max_connections must be positive".to_string()));
        }

        Ok(())
    }

    // =========================================================================
    // Derived Configs
    // =========================================================================

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path).max_connections(self.database.max_connections)
    }

    pub fn daraja_config(&self) -> DarajaConfig {
        let m = &self.mpesa;
        let config = DarajaConfig::new(
            m.environment,
            &m.consumer_key,
            &m.consumer_secret,
            &m.shortcode,
            &m.passkey,
            &m.callback_url,
        )
        .with_timeout(Duration::from_secs(m.timeout_secs));

        match &m.base_url {
            Some(url) => config.with_base_url(url),
            None => config,
        }
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.sales.gateway_timeout_secs)
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.port)
    }
}

/// `<config dir>/server.toml` for this platform, if a home dir is known.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("ke", "duka", "pos").map(|dirs| dirs.config_dir().join("server.toml"))
}

fn parse_into<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some(raw) = lookup(key) {
        *target = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server.port, 5000);
        assert!(!config.mpesa.is_configured());
    }

    #[test]
    fn test_toml_then_env() {
        let mut config = ServerConfig::from_toml(
            r#"
            [server]
            port = 8080

            [mpesa]
            consumer_key = "ck"
            consumer_secret = "cs"

            [sales]
            pending_expiry_minutes = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.sales.pending_expiry_minutes, 5);
        assert!(config.mpesa.is_configured());

        config
            .apply_env(env(&[("DUKA_PORT", "9090"), ("DUKA_DATABASE_PATH", "/tmp/x.db")]))
            .unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.database.path, PathBuf::from("/tmp/x.db"));

        let err = config.apply_env(env(&[("DUKA_PORT", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_production_rules() {
        let mut config = ServerConfig::default();
        config.mpesa.environment = MpesaEnvironment::Production;
        assert!(config.validate().is_err());

        config.auth.jwt_secret = "a-real-secret".into();
        assert!(config.validate().is_err());

        config.mpesa.callback_url = "https://pos.example.co.ke/mpesa/callback".into();
        config.validate().unwrap();

        config.sales.gateway_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secrets_not_in_debug() {
        let mut config = ServerConfig::default();
        config.auth.jwt_secret = "jwt-secret-value".into();
        config.mpesa.consumer_secret = "consumer-secret-value".into();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("jwt-secret-value"));
        assert!(!debug.contains("consumer-secret-value"));
    }

    #[test]
    fn test_daraja_config_uses_base_url_override() {
        let mut config = ServerConfig::default();
        config.mpesa.base_url = Some("http://127.0.0.1:9999/".into());
        assert_eq!(config.daraja_config().base_url, "http://127.0.0.1:9999");
        assert_eq!(ServerConfig::default().daraja_config().base_url, "https://sandbox.safaricom.co.ke");
    }
}
