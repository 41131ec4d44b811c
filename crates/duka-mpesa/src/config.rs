//! # Daraja Configuration
//!
//! Built by the server from the `[mpesa]` section of `server.toml`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::GatewayError;

/// Safaricom's public sandbox till.
pub const SANDBOX_SHORTCODE: &str = "174379";
/// Passkey published for the sandbox till.
pub const SANDBOX_PASSKEY: &str = "bfb279f9aa9bdbcf158e97dd71a467cd2e0c893059b10f78e6b72ada1ed2c919";

/// Which Daraja deployment to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MpesaEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    /// Base URL of the Daraja API.
    pub fn base_url(&self) -> &'static str {
        match self {
            MpesaEnvironment::Sandbox => "https://sandbox.safaricom.co.ke",
            MpesaEnvironment::Production => "https://api.safaricom.co.ke",
        }
    }
}

impl fmt::Display for MpesaEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MpesaEnvironment::Sandbox => write!(f, "sandbox"),
            MpesaEnvironment::Production => write!(f, "production"),
        }
    }
}

impl FromStr for MpesaEnvironment {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sandbox" => Ok(MpesaEnvironment::Sandbox),
            "production" | "live" => Ok(MpesaEnvironment::Production),
            other => Err(GatewayError::Config(format!(
                "unknown M-Pesa environment '{}' (expected sandbox or production)",
                other
            ))),
        }
    }
}

/// Credentials and endpoints for [`DarajaClient`](crate::DarajaClient).
#[derive(Clone)]
pub struct DarajaConfig {
    pub environment: MpesaEnvironment,
    /// Defaults to `environment.base_url()`; overridable for tests.
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    /// Paybill / till number receiving the money.
    pub shortcode: String,
    pub passkey: String,
    /// Public URL Safaricom posts STK results to.
    pub callback_url: String,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
}

impl DarajaConfig {
    pub fn new(
        environment: MpesaEnvironment,
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        shortcode: impl Into<String>,
        passkey: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Self {
        DarajaConfig {
            environment,
            base_url: environment.base_url().to_string(),
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            shortcode: shortcode.into(),
            passkey: passkey.into(),
            callback_url: callback_url.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Points the client somewhere other than Safaricom.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Rejects configurations that can never produce a working push.
    pub fn validate(&self) -> Result<(), GatewayError> {
        let required = [
            ("consumer_key", &self.consumer_key),
            ("consumer_secret", &self.consumer_secret),
            ("shortcode", &self.shortcode),
            ("passkey", &self.passkey),
            ("callback_url", &self.callback_url),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(GatewayError::Config(format!("{} is required", name)));
            }
        }

        if !self.shortcode.chars().all(|c| c.is_ascii_digit()) {
            return Err(GatewayError::Config("shortcode must be numeric".to_string()));
        }

        if self.environment == MpesaEnvironment::Production && !self.callback_url.starts_with("https://") {
            return Err(GatewayError::Config(
                "callback_url must use https in production".to_string(),
            ));
        }

        if self.timeout.is_zero() {
            return Err(GatewayError::Config("timeout must be greater than zero".to_string()));
        }

        Ok(())
    }
}

// Secrets stay out of logs.
impl fmt::Debug for DarajaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DarajaConfig")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field("consumer_key", &"***")
            .field("consumer_secret", &"***")
            .field("shortcode", &self.shortcode)
            .field("passkey", &"***")
            .field("callback_url", &self.callback_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> DarajaConfig {
        DarajaConfig::new(
            MpesaEnvironment::Sandbox,
            "consumer-key-value",
            "consumer-secret-value",
            SANDBOX_SHORTCODE,
            SANDBOX_PASSKEY,
            "http://localhost:5000/mpesa/callback",
        )
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("Sandbox".parse::<MpesaEnvironment>().unwrap(), MpesaEnvironment::Sandbox);
        assert_eq!("live".parse::<MpesaEnvironment>().unwrap(), MpesaEnvironment::Production);
        assert!("staging".parse::<MpesaEnvironment>().is_err());
    }

    #[test]
    fn test_validate() {
        assert!(sandbox().validate().is_ok());

        let mut missing = sandbox();
        missing.passkey = " ".to_string();
        assert!(missing.validate().is_err());

        let mut prod = sandbox();
        prod.environment = MpesaEnvironment::Production;
        assert!(prod.validate().is_err());
        prod.callback_url = "https://pos.example.co.ke/mpesa/callback".to_string();
        assert!(prod.validate().is_ok());

        assert!(sandbox().with_timeout(Duration::ZERO).validate().is_err());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let printed = format!("{:?}", sandbox());
        assert!(!printed.contains("consumer-key-value"));
        assert!(!printed.contains("consumer-secret-value"));
        assert!(!printed.contains(SANDBOX_PASSKEY));
    }

    #[test]
    fn test_base_url_override() {
        let config = sandbox().with_base_url("http://127.0.0.1:9999/");
        assert_eq!(config.base_url, "http://127.0.0.1:9999");
    }
}
