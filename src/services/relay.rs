use reqwest::Client;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    config::{AuthMode, RelayConfig},
    error::{RelayError, RelayResult},
    models::gemini::GenerateContentRequest,
    services::{
        auth::{credential_provider, Authorization, CredentialProvider},
        decoder::{ResponseDecoder, SingleResponseDecoder, StreamChunkDecoder},
    },
};

const API_KEY_BASE_URL: &str = "https://generativelanguage.googleapis.com";

struct UpstreamUrlBuilder;

impl UpstreamUrlBuilder {
    fn build_api_key_url(api_base: &str, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", api_base, model, method)
    }

    fn build_vertex_url(
        vertex_base: Option<&str>,
        project_id: &str,
        region: &str,
        model: &str,
        method: &str,
    ) -> String {
        let base = vertex_base
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("https://{}-aiplatform.googleapis.com", region));

        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:{}",
            base, project_id, region, model, method
        )
    }
}

/// Forwards one prompt to the configured model and returns the generated text.
pub struct PromptRelay {
    http: Client,
    credentials: Arc<dyn CredentialProvider>,
    decoder: Arc<dyn ResponseDecoder>,
    model: String,
    region: String,
    api_key_base_url: String,
    vertex_base_url: Option<String>,
}

impl PromptRelay {
    pub fn new(config: &RelayConfig, http: Client) -> anyhow::Result<Self> {
        let credentials = credential_provider(config, &http)?;
        let decoder: Arc<dyn ResponseDecoder> = match config.resolve_auth_mode()? {
            Some(AuthMode::ServiceAccount) => Arc::new(StreamChunkDecoder),
            Some(AuthMode::ApiKey) | None => Arc::new(SingleResponseDecoder),
        };
        Ok(Self::with_parts(config, http, credentials, decoder))
    }

    pub fn with_parts(
        config: &RelayConfig,
        http: Client,
        credentials: Arc<dyn CredentialProvider>,
        decoder: Arc<dyn ResponseDecoder>,
    ) -> Self {
        let api_key_base_url = config
            .api_key_base_url
            .as_ref()
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| API_KEY_BASE_URL.to_string());

        Self {
            http,
            credentials,
            decoder,
            model: config.model.clone(),
            region: config.region.clone(),
            api_key_base_url,
            vertex_base_url: config.vertex_base_url.clone(),
        }
    }

    pub fn auth_mode(&self) -> &'static str {
        self.credentials.mode()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn generate(&self, prompt: &str) -> RelayResult<String> {
        let authorization = self.credentials.authorize().await?;
        let payload = GenerateContentRequest::from_prompt(prompt);
        let method = self.decoder.method();

        let req_builder = match &authorization {
            Authorization::QueryKey(key) => {
                let url =
                    UpstreamUrlBuilder::build_api_key_url(&self.api_key_base_url, &self.model, method);
                self.http.post(url).query(&[("key", key)])
            }
            Authorization::Bearer { token, project_id } => {
                let url = UpstreamUrlBuilder::build_vertex_url(
                    self.vertex_base_url.as_deref(),
                    project_id,
                    &self.region,
                    &self.model,
                    method,
                );
                self.http.post(url).bearer_auth(token)
            }
        };

        info!("Calling {} on model {}", method, self.model);

        // without_url: the key-based URL carries the API key.
        let res = req_builder.json(&payload).send().await.map_err(|e| {
            let e = e.without_url();
            error!("Model request failed: {}", e);
            RelayError::Network(format!("Failed to contact the AI model: {}", e))
        })?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_else(|e| {
                warn!("Failed to read model error response: {}", e);
                String::new()
            });
            error!("Google API Error: {} - {}", status, text);
            return Err(RelayError::Upstream {
                status: status.as_u16(),
            });
        }

        self.decoder.decode(res).await
    }
}
