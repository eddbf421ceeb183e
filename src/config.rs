use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use sms_twilio::TwilioClientFactory;
use std::env;
use std::time::Duration;

use crate::constants::DEFAULT_TITLE;

/// Application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// Twilio API configuration
    pub twilio: TwilioApiConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Integration presentation settings
    pub integration: IntegrationConfig,
}

/// Twilio API configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TwilioApiConfig {
    /// REST API base URL (default: https://api.twilio.com)
    pub api_base_url: String,
    /// Request timeout in seconds (default: 30)
    pub request_timeout_seconds: u64,
    /// Page size when listing incoming numbers (default: 50)
    pub page_size: u32,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: json or pretty (default: json)
    pub format: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IntegrationConfig {
    /// Title given to newly created entries (default: Twilio SMS)
    pub default_title: String,
}

impl Default for TwilioApiConfig {
    fn default() -> Self {
        Self {
            api_base_url: sms_twilio::DEFAULT_BASE_URL.to_string(),
            request_timeout_seconds: 30,
            page_size: sms_twilio::DEFAULT_PAGE_SIZE,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            default_title: DEFAULT_TITLE.to_string(),
        }
    }
}

impl TwilioApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Client factory honouring this configuration.
    pub fn client_factory(&self) -> TwilioClientFactory {
        TwilioClientFactory::new(
            self.api_base_url.clone(),
            self.request_timeout(),
            self.page_size,
        )
    }
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides (gitignored)
            .add_source(File::with_name("config/local").required(false))
            // Environment variables (prefixed with TWILIO_NOTIFY_)
            .add_source(Environment::with_prefix("TWILIO_NOTIFY").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
