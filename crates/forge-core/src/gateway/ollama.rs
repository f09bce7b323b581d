//! Ollama HTTP gateway.
//!
//! Sends rendered prompts to `POST {endpoint}/api/generate` with streaming
//! disabled and maps transport failures onto [`GenerationError`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{prompts, LanguageModel, PromptRole, PromptVars};
use crate::domain::GenerationError;

const DEFAULT_ENDPOINT: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "qwen2.5-coder:7b";

/// Connection and sampling settings for the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub endpoint: String,
    pub model: String,
    /// Sampling temperature for forge stages.
    pub temperature: f32,
    /// Sampling temperature for the decision router.
    pub router_temperature: f32,
    pub seed: Option<u64>,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.2,
            router_temperature: 0.0,
            seed: None,
            max_tokens: 2048,
            timeout_secs: 120,
        }
    }
}

impl GatewayConfig {
    pub fn temperature_for(&self, role: PromptRole) -> f32 {
        match role {
            PromptRole::Router | PromptRole::RouterRepair => self.router_temperature,
            _ => self.temperature,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    eval_count: Option<u64>,
}

/// [`LanguageModel`] backed by an Ollama server.
pub struct OllamaGateway {
    config: GatewayConfig,
    http_client: Client,
}

impl OllamaGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GenerationError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn endpoint(&self) -> &str {
        self.config.endpoint.trim_end_matches('/')
    }

    /// Whether the server answers `/api/tags`.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.endpoint());
        match self.http_client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("Ollama health check failed: {}", e);
                false
            }
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> GenerationError {
        if e.is_timeout() {
            error!("Ollama request timed out after {}s", self.config.timeout_secs);
            GenerationError::Timeout {
                seconds: self.config.timeout_secs,
            }
        } else if e.is_connect() {
            error!("Cannot connect to Ollama at {}", self.config.endpoint);
            GenerationError::Transport(format!("connection failed: {e}"))
        } else {
            error!("Ollama request error: {}", e);
            GenerationError::Transport(format!("request failed: {e}"))
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaGateway {
    async fn generate(
        &self,
        role: PromptRole,
        vars: &PromptVars,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/api/generate", self.endpoint());
        let request = GenerateRequest {
            model: &self.config.model,
            prompt: prompts::render(role, vars),
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature_for(role),
                num_predict: self.config.max_tokens,
                seed: self.config.seed,
            },
        };

        debug!(
            role = %role,
            model = %self.config.model,
            prompt_len = request.prompt.len(),
            "sending generation request"
        );
        let start = Instant::now();

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Ollama API returned error status {}: {}", status, body);
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(format!("JSON parse error: {e}")))?;

        if !body.done {
            warn!("Ollama response indicates incomplete generation");
        }
        info!(
            role = %role,
            elapsed_ms = start.elapsed().as_millis() as u64,
            eval_tokens = body.eval_count.unwrap_or(0),
            "generation completed"
        );

        if body.response.trim().is_empty() {
            return Err(GenerationError::EmptyOutput {
                role: role.to_string(),
            });
        }
        Ok(body.response)
    }
}
