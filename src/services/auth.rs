//! Credential providers for the outbound generation call.
//!
//! Exactly one provider is selected at startup from [`RelayConfig`]. Nothing is
//! cached between requests: the service-account provider re-reads its bundle and
//! performs a fresh token exchange for every call.

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::config::{AuthMode, RelayConfig};
use crate::error::{RelayError, RelayResult};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const SERVICE_ACCOUNT_TYPE: &str = "service_account";

pub const MISSING_API_KEY_MESSAGE: &str = "API key is not configured.";
pub const MISSING_SERVICE_ACCOUNT_MESSAGE: &str = "Service account credentials are not configured.";

/// How the outbound call proves its identity.
#[derive(Debug, Clone, PartialEq)]
pub enum Authorization {
    /// Sent as the `key` query parameter.
    QueryKey(String),
    /// Sent as `Authorization: Bearer`, scoped to `project_id`.
    Bearer { token: String, project_id: String },
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn authorize(&self) -> RelayResult<Authorization>;

    /// Name reported by the health endpoint.
    fn mode(&self) -> &'static str;
}

pub struct ApiKeyCredentials {
    api_key: String,
}

impl ApiKeyCredentials {
    pub fn new(api_key: String) -> Self {
        Self { api_key }
    }
}

#[async_trait]
impl CredentialProvider for ApiKeyCredentials {
    async fn authorize(&self) -> RelayResult<Authorization> {
        Ok(Authorization::QueryKey(self.api_key.clone()))
    }

    fn mode(&self) -> &'static str {
        AuthMode::ApiKey.as_str()
    }
}

/// Stands in when the deployment has no credential material; every call fails.
pub struct MissingCredentials {
    message: &'static str,
}

impl MissingCredentials {
    pub fn new(message: &'static str) -> Self {
        Self { message }
    }
}

#[async_trait]
impl CredentialProvider for MissingCredentials {
    async fn authorize(&self) -> RelayResult<Authorization> {
        Err(RelayError::Configuration(self.message.to_string()))
    }

    fn mode(&self) -> &'static str {
        "unconfigured"
    }
}

#[derive(Debug, Clone)]
pub enum CredentialSource {
    Inline(String),
    File(PathBuf),
}

impl CredentialSource {
    async fn load(&self) -> RelayResult<ServiceAccountKey> {
        let raw = match self {
            CredentialSource::Inline(json) => json.clone(),
            CredentialSource::File(path) => {
                tokio::fs::read_to_string(path).await.map_err(|e| {
                    RelayError::Configuration(format!(
                        "Cannot read service account file {}: {}",
                        path.display(),
                        e
                    ))
                })?
            }
        };

        let key: ServiceAccountKey = serde_json::from_str(&raw).map_err(|e| {
            RelayError::Configuration(format!("Invalid service account JSON: {}", e))
        })?;

        match key.key_type.as_deref() {
            None | Some(SERVICE_ACCOUNT_TYPE) => Ok(key),
            Some(other) => Err(RelayError::Configuration(format!(
                "Unsupported credential type '{}', expected '{}'",
                other, SERVICE_ACCOUNT_TYPE
            ))),
        }
    }
}

/// Fields of a Google service-account key file used by the JWT bearer flow.
#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountKey {
    #[serde(rename = "type")]
    key_type: Option<String>,
    client_email: String,
    private_key: String,
    private_key_id: Option<String>,
    token_uri: Option<String>,
    project_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct ServiceAccountCredentials {
    source: CredentialSource,
    project_id: Option<String>,
    http: Client,
}

impl ServiceAccountCredentials {
    pub fn new(source: CredentialSource, project_id: Option<String>, http: Client) -> Self {
        Self {
            source,
            project_id,
            http,
        }
    }

    fn sign_assertion(key: &ServiceAccountKey, token_uri: &str) -> RelayResult<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: &key.client_email,
            scope: CLOUD_PLATFORM_SCOPE,
            aud: token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = key.private_key_id.clone();

        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            RelayError::AuthExchange(format!("Invalid service account private key: {}", e))
        })?;

        encode(&header, &claims, &encoding_key)
            .map_err(|e| RelayError::AuthExchange(format!("Failed to sign JWT assertion: {}", e)))
    }

    async fn exchange(&self, token_uri: &str, assertion: &str) -> RelayResult<String> {
        let form = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion)];

        let res = self
            .http
            .post(token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|e| RelayError::AuthExchange(format!("Token endpoint request failed: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_else(|e| {
                warn!("Failed to read token endpoint error response: {}", e);
                String::new()
            });
            error!("Token endpoint error: {} - {}", status, text);
            return Err(RelayError::AuthExchange(format!(
                "Token endpoint returned {}",
                status
            )));
        }

        let token: TokenResponse = res.json().await.map_err(|e| {
            RelayError::AuthExchange(format!("Failed to parse token response: {}", e))
        })?;

        if token.access_token.is_empty() {
            return Err(RelayError::AuthExchange(
                "Token endpoint returned an empty access token".into(),
            ));
        }

        Ok(token.access_token)
    }
}

#[async_trait]
impl CredentialProvider for ServiceAccountCredentials {
    async fn authorize(&self) -> RelayResult<Authorization> {
        let key = self.source.load().await?;

        let project_id = self
            .project_id
            .clone()
            .or_else(|| key.project_id.clone())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                RelayError::AuthExchange(
                    "Unable to determine the Google Cloud project for the service account".into(),
                )
            })?;

        let token_uri = key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
        let assertion = Self::sign_assertion(&key, token_uri)?;
        let token = self.exchange(token_uri, &assertion).await?;

        debug!(
            "Obtained access token for {} (project {})",
            key.client_email, project_id
        );

        Ok(Authorization::Bearer { token, project_id })
    }

    fn mode(&self) -> &'static str {
        AuthMode::ServiceAccount.as_str()
    }
}

/// Selects the provider for this deployment.
pub fn credential_provider(
    config: &RelayConfig,
    http: &Client,
) -> anyhow::Result<Arc<dyn CredentialProvider>> {
    let mode = config
        .resolve_auth_mode()
        .map_err(|e| anyhow::anyhow!("Invalid relay configuration: {e}"))?;

    let provider: Arc<dyn CredentialProvider> = match mode {
        Some(AuthMode::ApiKey) => match config.api_key.clone().filter(|k| !k.is_empty()) {
            Some(key) => Arc::new(ApiKeyCredentials::new(key)),
            None => Arc::new(MissingCredentials::new(MISSING_API_KEY_MESSAGE)),
        },
        Some(AuthMode::ServiceAccount) => {
            let source = config
                .credentials_json
                .clone()
                .filter(|j| !j.trim().is_empty())
                .map(CredentialSource::Inline)
                .or_else(|| {
                    config
                        .credentials_file
                        .clone()
                        .filter(|f| !f.is_empty())
                        .map(|f| CredentialSource::File(PathBuf::from(f)))
                });
            match source {
                Some(source) => Arc::new(ServiceAccountCredentials::new(
                    source,
                    config.project_id.clone(),
                    http.clone(),
                )),
                None => Arc::new(MissingCredentials::new(MISSING_SERVICE_ACCOUNT_MESSAGE)),
            }
        }
        None => {
            warn!("No credentials configured; set GEMINI_API_KEY or service-account credentials");
            Arc::new(MissingCredentials::new(MISSING_API_KEY_MESSAGE))
        }
    };

    Ok(provider)
}
