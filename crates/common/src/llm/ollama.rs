//! Ollama HTTP client

use super::{Generation, LlmClient};
use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Health checks should fail fast even when generation is allowed minutes.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
}

#[derive(Deserialize)]
struct VersionResponse {
    version: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.host.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn map_send_error(&self, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            AppError::LlmTimeout {
                timeout_secs: self.timeout_secs,
            }
        } else if err.is_connect() {
            AppError::ServiceUnavailable {
                message: format!("Ollama unreachable: {}", err),
            }
        } else {
            AppError::Llm {
                message: format!("Request failed: {}", err),
            }
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::Llm {
            message: format!("API error {}: {}", status, body),
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn health_check(&self) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/api/version", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| AppError::ServiceUnavailable {
                message: format!("Ollama unreachable: {}", e),
            })?;

        let version: VersionResponse = Self::check_status(response).await?.json().await?;
        Ok(version.version)
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let tags: TagsResponse = Self::check_status(response).await?.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn generate(&self, model: &str, prompt: &str) -> Result<Generation> {
        let start = std::time::Instant::now();

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&GenerateRequest {
                model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let result = Self::check_status(response).await;
        crate::metrics::record_llm(start.elapsed().as_secs_f64(), model, result.is_ok());

        let generation: Generation = result?.json().await.map_err(|e| AppError::Llm {
            message: format!("Failed to parse response: {}", e),
        })?;

        tracing::debug!(
            model = %generation.model,
            chars = generation.response.len(),
            "Generation complete"
        );
        Ok(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(host: &str) -> OllamaClient {
        OllamaClient::new(&LlmConfig {
            host: host.to_string(),
            timeout_secs: 5,
            ..LlmConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_health_check_returns_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "version": "0.5.7" })))
            .mount(&server)
            .await;

        let version = client_for(&server.uri()).health_check().await.unwrap();
        assert_eq!(version, "0.5.7");
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let err = client_for("http://127.0.0.1:1").health_check().await.unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_list_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [{ "name": "llama3.2:1b" }, { "name": "qwen2:0.5b" }]
            })))
            .mount(&server)
            .await;

        let models = client_for(&server.uri()).list_models().await.unwrap();
        assert_eq!(models, vec!["llama3.2:1b", "qwen2:0.5b"]);
    }

    #[tokio::test]
    async fn test_generate_sends_prompt_without_streaming() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "model": "llama3.2:1b",
                "prompt": "What is RAG?",
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "llama3.2:1b",
                "response": "Retrieval augmented generation.",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let generation = client_for(&server.uri())
            .generate("llama3.2:1b", "What is RAG?")
            .await
            .unwrap();
        assert_eq!(generation.response, "Retrieval augmented generation.");
        assert!(generation.done);
    }

    #[tokio::test]
    async fn test_generate_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let err = client_for(&server.uri())
            .generate("missing", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Llm { .. }));
    }
}
