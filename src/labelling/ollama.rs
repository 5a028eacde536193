//! Ollama HTTP client for local LLM inference, behind the [`LlmClient`]
//! trait so the pipeline can be driven with mocks in tests.

use serde::{Deserialize, Serialize};

use super::LabellingError;

/// LLM client abstraction (allows mocking).
///
/// Implementations are blocking; the orchestrator moves calls onto a
/// blocking thread so label generation never stalls other chunk work.
pub trait LlmClient: Send + Sync {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
        temperature: f32,
    ) -> Result<String, LabellingError>;

    fn is_model_available(&self, model: &str) -> Result<bool, LabellingError>;

    fn list_models(&self) -> Result<Vec<String>, LabellingError>;
}

/// Blocking HTTP client for a local Ollama instance.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    /// Create a client for `base_url` with a per-request timeout. The
    /// timeout covers one HTTP call; retry policy lives with the caller.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, LabellingError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LabellingError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error) -> LabellingError {
        if e.is_connect() {
            LabellingError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            LabellingError::Timeout(self.timeout_secs)
        } else {
            LabellingError::HttpClient(e.to_string())
        }
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Response body from Ollama /api/tags
#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

impl LlmClient for OllamaClient {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
        temperature: f32,
    ) -> Result<String, LabellingError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model,
            prompt,
            system,
            stream: false,
            options: OllamaOptions { temperature },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LabellingError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .map_err(|e| LabellingError::ResponseParsing(e.to_string()))?;

        Ok(parsed.response)
    }

    fn is_model_available(&self, model: &str) -> Result<bool, LabellingError> {
        let models = self.list_models()?;
        Ok(models.iter().any(|m| m.starts_with(model)))
    }

    fn list_models(&self) -> Result<Vec<String>, LabellingError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LabellingError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaTagsResponse = response
            .json()
            .map_err(|e| LabellingError::ResponseParsing(e.to_string()))?;

        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }
}

/// Mock LLM client for testing — returns a configurable response.
pub struct MockLlmClient {
    response: String,
    available_models: Vec<String>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            available_models: vec!["llama3:latest".to_string()],
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.available_models = models;
        self
    }
}

impl LlmClient for MockLlmClient {
    fn generate(
        &self,
        _model: &str,
        _prompt: &str,
        _system: &str,
        _temperature: f32,
    ) -> Result<String, LabellingError> {
        Ok(self.response.clone())
    }

    fn is_model_available(&self, model: &str) -> Result<bool, LabellingError> {
        Ok(self.available_models.iter().any(|m| m.starts_with(model)))
    }

    fn list_models(&self) -> Result<Vec<String>, LabellingError> {
        Ok(self.available_models.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_client_returns_configured_response() {
        let client = MockLlmClient::new("a hallway with two doors");
        let result = client.generate("model", "prompt", "system", 0.7).unwrap();
        assert_eq!(result, "a hallway with two doors");
    }

    #[test]
    fn mock_client_lists_models() {
        let client =
            MockLlmClient::new("").with_models(vec!["llama3:latest".into(), "mistral:7b".into()]);
        let models = client.list_models().unwrap();
        assert_eq!(models.len(), 2);
        assert!(client.is_model_available("llama3").unwrap());
        assert!(!client.is_model_available("medgemma").unwrap());
    }

    #[test]
    fn ollama_client_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", 60).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn generate_request_serializes_options() {
        let body = OllamaGenerateRequest {
            model: "llama3",
            prompt: "p",
            system: "s",
            stream: false,
            options: OllamaOptions { temperature: 0.7 },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], false);
        let temperature = json["options"]["temperature"].as_f64().unwrap();
        assert!((temperature - 0.7).abs() < 1e-6);
    }
}
