//! Chat client for OpenAI-compatible endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{ChatPrompt, LanguageModel};
use crate::config::LlmConfig;
use crate::errors::LlmFailure;

/// Async chat-completions client with bounded retries
#[derive(Clone)]
pub struct OpenAiChat {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    max_retries: usize,
}

impl OpenAiChat {
    /// Builds a client; `timeout` bounds every HTTP request
    pub fn new(config: &LlmConfig, timeout: Duration) -> Result<Self, LlmFailure> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LlmFailure::NotConfigured("missing API key".to_string()))?;
        if config.model.trim().is_empty() {
            return Err(LlmFailure::NotConfigured("missing model name".to_string()));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| LlmFailure::NotConfigured("invalid API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| LlmFailure::NotConfigured(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries.max(1),
        })
    }

    fn should_retry(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    fn is_retryable_error(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect()
    }

    fn retry_backoff(attempt: usize) -> Duration {
        let exp = attempt.saturating_sub(1).min(5) as u32;
        Duration::from_millis(500 * 2u64.pow(exp))
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, LlmFailure> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            response_format: prompt.json_reply.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let mut attempt = 0usize;
        loop {
            attempt += 1;
            match self.client.post(&self.endpoint).json(&body).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: ChatResponse = resp
                            .json()
                            .await
                            .map_err(|e| LlmFailure::Request(format!("bad response body: {}", e)))?;
                        let answer = parsed
                            .choices
                            .into_iter()
                            .find_map(|choice| choice.message.content)
                            .unwrap_or_default();
                        if answer.trim().is_empty() {
                            return Err(LlmFailure::EmptyReply);
                        }
                        return Ok(answer);
                    }

                    let text = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if Self::should_retry(status) && attempt < self.max_retries {
                        ::log::warn!(
                            "Language model returned {} (attempt {}/{}), retrying",
                            status,
                            attempt,
                            self.max_retries
                        );
                        tokio::time::sleep(Self::retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(LlmFailure::Status {
                        status: status.as_u16(),
                        body: text,
                    });
                }
                Err(err) => {
                    if Self::is_retryable_error(&err) && attempt < self.max_retries {
                        ::log::warn!(
                            "Language model request failed (attempt {}/{}): {}",
                            attempt,
                            self.max_retries,
                            err
                        );
                        tokio::time::sleep(Self::retry_backoff(attempt)).await;
                        continue;
                    }
                    if err.is_timeout() {
                        return Err(LlmFailure::Timeout);
                    }
                    return Err(LlmFailure::Request(err.to_string()));
                }
            }
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_api_key() {
        let config = LlmConfig::default();
        let err = OpenAiChat::new(&config, Duration::from_secs(5)).err().unwrap();
        assert!(matches!(err, LlmFailure::NotConfigured(_)));
    }

    #[test]
    fn test_endpoint_from_base_url() {
        let config = LlmConfig {
            api_key: Some("sk-test".to_string()),
            base_url: "http://localhost:11434/v1/".to_string(),
            ..LlmConfig::default()
        };
        let chat = OpenAiChat::new(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(chat.endpoint, "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatRequest {
            model: "m",
            temperature: 0.0,
            max_tokens: 10,
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_retry_policy() {
        assert!(OpenAiChat::should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(OpenAiChat::should_retry(StatusCode::BAD_GATEWAY));
        assert!(!OpenAiChat::should_retry(StatusCode::UNAUTHORIZED));
        assert_eq!(OpenAiChat::retry_backoff(1), Duration::from_millis(500));
        assert_eq!(OpenAiChat::retry_backoff(3), Duration::from_millis(2000));
    }
}
