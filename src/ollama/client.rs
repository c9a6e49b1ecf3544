use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Model used when neither flags, environment nor profile name one.
pub const DEFAULT_MODEL: &str = "gemma3n:4b";
/// Local Ollama daemon address.
pub const DEFAULT_HOST: &str = "http://localhost:11434";

/// Connection settings, fixed for the lifetime of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Model identifier sent with every request.
    pub model: String,
    /// Base URL of the inference server.
    pub host: String,
    /// Whole-request timeout. `None` waits indefinitely.
    pub timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            host: DEFAULT_HOST.to_string(),
            timeout_secs: None,
        }
    }
}

impl ClientConfig {
    /// Full URL of the generate endpoint.
    pub fn generate_url(&self) -> String {
        format!("{}/api/generate", self.host.trim_end_matches('/'))
    }
}

/// Body of `POST /api/generate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    pub stream: bool,
}

/// The single completion returned for a non-streaming request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("inference API error {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("inference reply did not contain a `response` text field")]
    MissingResponse,
}

/// Text-generation backend the assessment pipeline talks to.
pub trait Inference {
    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, InferenceError>;
}

impl<T: Inference + ?Sized> Inference for &T {
    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, InferenceError> {
        (**self).generate(request)
    }
}

/// Blocking client for an Ollama-compatible server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    url: String,
    client: Client,
}

impl OllamaClient {
    pub fn new(config: &ClientConfig) -> Result<Self, InferenceError> {
        let url = config.generate_url();
        // blocking::Client defaults to a 30s timeout; unset means none at all.
        let client = Client::builder()
            .timeout(config.timeout_secs.map(Duration::from_secs))
            .build()
            .map_err(|source| InferenceError::Request {
                url: url.clone(),
                source,
            })?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Inference for OllamaClient {
    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, InferenceError> {
        debug!(
            url = %self.url,
            model = %request.model,
            prompt_len = request.prompt.len(),
            images = request.images.as_ref().map_or(0, Vec::len),
            "sending generate request"
        );

        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .map_err(|source| InferenceError::Request {
                url: self.url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(InferenceError::Api { status, body });
        }

        let body: Value = response.json().map_err(|source| InferenceError::Request {
            url: self.url.clone(),
            source,
        })?;
        parse_generate_body(&body)
    }
}

fn parse_generate_body(body: &Value) -> Result<GenerateResponse, InferenceError> {
    body.get("response")
        .and_then(Value::as_str)
        .map(|text| GenerateResponse {
            response: text.to_string(),
        })
        .ok_or(InferenceError::MissingResponse)
}
