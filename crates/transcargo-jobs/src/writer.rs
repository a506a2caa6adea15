//! Article drafting through an OpenAI-compatible chat completions API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::debug;

use transcargo_core::{Error, OpenAiSettings, Result};

/// Raw model output.
#[derive(Debug, Clone)]
pub struct Draft {
    pub content: String,
    pub model: String,
}

#[async_trait]
pub trait ArticleWriter: Send + Sync {
    async fn write(&self, system: &str, prompt: &str) -> Result<Draft>;
}

pub struct OpenAiWriter {
    http: Client,
    settings: OpenAiSettings,
}

impl OpenAiWriter {
    pub fn new(settings: OpenAiSettings) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(150))
            .build()
            .unwrap_or_default();
        Self { http, settings }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key().is_some()
    }

    fn api_key(&self) -> Option<&str> {
        self.settings
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
    }
}

#[async_trait]
impl ArticleWriter for OpenAiWriter {
    async fn write(&self, system: &str, prompt: &str) -> Result<Draft> {
        let api_key = self
            .api_key()
            .ok_or_else(|| Error::Configuration("OPENAI_API_KEY is not set".into()))?;
        let url = format!(
            "{}/chat/completions",
            self.settings.api_base.trim_end_matches('/')
        );
        let body = json!({
            "model": self.settings.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens,
        });

        debug!("Requesting draft from {} with model {}", url, self.settings.model);

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("completion request: {}", e))
                } else {
                    Error::Upstream(format!("completion request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => Error::RateLimited(format!("upstream 429: {}", text)),
                s if s.is_server_error() => Error::Upstream(format!("API error {}: {}", s, text)),
                s => Error::Job(format!("API error {}: {}", s, text)),
            });
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("invalid completion response: {}", e)))?;
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let model = value["model"]
            .as_str()
            .unwrap_or(&self.settings.model)
            .to_string();
        Ok(Draft { content, model })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn writer_for(server: &MockServer, key: Option<&str>) -> OpenAiWriter {
        OpenAiWriter::new(OpenAiSettings {
            api_key: key.map(str::to_string),
            api_base: format!("{}/v1", server.uri()),
            ..OpenAiSettings::default()
        })
    }

    #[tokio::test]
    async fn test_draft_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "max_tokens": 4096,
                "messages": [{"role": "system", "content": "sys"}, {"role": "user", "content": "prompt"}],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gpt-4o-mini-2024-07-18",
                "choices": [{"message": {"role": "assistant", "content": "# Заголовок\n\nТекст"}}],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let draft = writer_for(&server, Some("sk-test")).write("sys", "prompt").await.unwrap();
        assert_eq!(draft.content, "# Заголовок\n\nТекст");
        assert_eq!(draft.model, "gpt-4o-mini-2024-07-18");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let writer = writer_for(&server, Some("sk-test"));
        let first = writer.write("s", "p").await.unwrap_err();
        assert!(matches!(first, Error::RateLimited(_)));
        let second = writer.write("s", "p").await.unwrap_err();
        assert!(matches!(second, Error::Upstream(_)));
        let third = writer.write("s", "p").await.unwrap_err();
        assert!(matches!(third, Error::Job(_)));
        assert!(!third.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_key_is_configuration_error() {
        let server = MockServer::start().await;
        let writer = writer_for(&server, Some("  "));
        assert!(!writer.is_configured());
        assert!(matches!(
            writer.write("s", "p").await,
            Err(Error::Configuration(_))
        ));
    }
}
