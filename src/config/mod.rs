use config::{Config, ConfigError};
use serde::Deserialize;
use std::env;
use validator::Validate;

const DEFAULT_MAX_REQUEST_SIZE: usize = 6 * 1024 * 1024;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 26;
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_REGION: &str = "us-central1";

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1, max = 65535))]
    pub port: u16,
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
    /// Zero disables the per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    pub cors_allow_origin: Option<String>,
}

fn default_max_request_size() -> usize {
    DEFAULT_MAX_REQUEST_SIZE
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    ApiKey,
    ServiceAccount,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::ApiKey => "api_key",
            AuthMode::ServiceAccount => "service_account",
        }
    }
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct RelayConfig {
    pub auth_mode: Option<AuthMode>,
    #[validate(length(min = 1))]
    pub model: String,
    #[validate(length(min = 1))]
    pub region: String,
    pub api_key: Option<String>,
    pub credentials_json: Option<String>,
    pub credentials_file: Option<String>,
    pub project_id: Option<String>,
    #[validate(length(min = 1))]
    pub api_key_base_url: Option<String>,
    #[validate(length(min = 1))]
    pub vertex_base_url: Option<String>,
}

impl RelayConfig {
    fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    fn has_service_account(&self) -> bool {
        self.credentials_json
            .as_deref()
            .is_some_and(|j| !j.trim().is_empty())
            || self.credentials_file.as_deref().is_some_and(|f| !f.is_empty())
    }

    /// Picks the deployment's authentication variant. `None` means no credential
    /// material was supplied at all.
    pub fn resolve_auth_mode(&self) -> Result<Option<AuthMode>, ConfigError> {
        if let Some(mode) = self.auth_mode {
            return Ok(Some(mode));
        }

        match (self.has_api_key(), self.has_service_account()) {
            (true, true) => Err(ConfigError::Message(
                "Both GEMINI_API_KEY and service-account credentials are set; choose one with APP_RELAY__AUTH_MODE".into(),
            )),
            (true, false) => Ok(Some(AuthMode::ApiKey)),
            (false, true) => Ok(Some(AuthMode::ServiceAccount)),
            (false, false) => Ok(None),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct LogConfig {
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub relay: RelayConfig,
    #[validate(nested)]
    pub log: LogConfig,
}

fn parse_port(value: &str) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|e| {
        ConfigError::Message(format!(
            "Invalid port value '{}': {}. Port must be a number between 1 and 65535.",
            value, e
        ))
    })
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Builds the configuration from defaults and the current environment only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = non_empty_var("APP_SERVER__PORT").or_else(|| non_empty_var("PORT"));

        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8888)?
            .set_default("server.max_request_size", DEFAULT_MAX_REQUEST_SIZE as i64)?
            .set_default("server.request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS)?
            .set_default("relay.model", DEFAULT_MODEL)?
            .set_default("relay.region", DEFAULT_REGION)?
            .set_default("log.level", "info")?
            .set_default("log.format", "pretty")?
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option(
                "server.port",
                port.map(|v| parse_port(&v)).transpose()?,
            )?
            .set_override_option("relay.api_key", non_empty_var("GEMINI_API_KEY"))?
            .set_override_option(
                "relay.credentials_json",
                non_empty_var("GOOGLE_SERVICE_ACCOUNT_JSON"),
            )?
            .set_override_option(
                "relay.credentials_file",
                non_empty_var("GOOGLE_APPLICATION_CREDENTIALS"),
            )?
            .set_override_option("relay.project_id", non_empty_var("GOOGLE_CLOUD_PROJECT"))?
            .build()?;

        let config: AppConfig = s.try_deserialize()?;

        if let Err(e) = config.validate() {
            return Err(ConfigError::Message(format!("Validation error: {}", e)));
        }

        config.relay.resolve_auth_mode()?;

        Ok(config)
    }
}
