//! OpenAI-compatible chat-completions client.
//!
//! One client is built per provider from [`ProviderConfig`]; it owns the HTTP
//! connection pool, credential, timeout and transport retry policy.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::completion::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};
use crate::config::ProviderConfig;
use crate::error::LlmError;
use crate::metrics::{MetricsCollector, TokenUsage};

/// Credential substituted in test mode when none is configured.
pub const TEST_API_KEY: &str = "test-key-for-testing";

/// Base delay for exponential backoff between attempts.
const BASE_RETRY_DELAY_MS: u64 = 1000;

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout_secs: u64,
    /// Retries after the first attempt; only transient failures are retried.
    max_retries: u32,
    retry_base_delay: Duration,
    metrics: MetricsCollector,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key_masked())
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    /// Builds a client from provider settings.
    ///
    /// # Errors
    ///
    /// - `LlmError::MissingApiKey` if no credential is configured and test mode is off
    /// - `LlmError::ClientBuild` if the HTTP client cannot be created
    pub fn from_config(config: &ProviderConfig) -> Result<Self, LlmError> {
        let api_key = match config.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ if config.test_mode => TEST_API_KEY.to_string(),
            _ => return Err(LlmError::MissingApiKey),
        };

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| LlmError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(BASE_RETRY_DELAY_MS),
            metrics: MetricsCollector::new(),
        })
    }

    /// Overrides the backoff base delay.
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// The credential with everything but its ends hidden.
    pub fn api_key_masked(&self) -> String {
        mask_secret(&self.api_key)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn execute_with_retry(&self, request: &ApiRequest) -> Result<GenerationResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let total_attempts = self.max_retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.execute_request(&url, request).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_transient() && attempt < total_attempts => {
                    let delay = self.retry_base_delay * (1u32 << (attempt - 1).min(16));
                    tracing::warn!(
                        attempt,
                        max_attempts = total_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient error, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn execute_request(
        &self,
        url: &str,
        request: &ApiRequest,
    ) -> Result<GenerationResponse, LlmError> {
        let http_response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = http_response.status();

        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            let message = serde_json::from_str::<ApiErrorResponse>(&error_text)
                .map(|parsed| parsed.error.message)
                .unwrap_or(error_text);

            if status_code == 429 {
                return Err(LlmError::RateLimited(message));
            }
            return Err(LlmError::ApiError {
                code: status_code,
                message,
            });
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

        let choices = api_response
            .choices
            .into_iter()
            .map(|choice| Choice {
                index: choice.index,
                message: Message {
                    role: choice.message.role.unwrap_or_else(|| "assistant".to_string()),
                    content: choice.message.content.unwrap_or_default(),
                },
                finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            })
            .collect();

        Ok(GenerationResponse {
            id: api_response.id,
            model: api_response.model,
            choices,
            usage: Usage {
                prompt_tokens: api_response.usage.prompt_tokens,
                completion_tokens: api_response.usage.completion_tokens,
                total_tokens: api_response.usage.total_tokens,
            },
        })
    }

    fn map_transport_error(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout {
                seconds: self.timeout_secs,
            }
        } else if err.is_connect() {
            LlmError::RequestFailed(format!("connection failed: {}", err))
        } else {
            LlmError::RequestFailed(err.to_string())
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let model = if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model
        };

        let api_request = ApiRequest {
            model,
            messages: request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
            frequency_penalty: request.frequency_penalty,
            presence_penalty: request.presence_penalty,
        };

        let started = Instant::now();
        let result = self.execute_with_retry(&api_request).await;
        let latency = started.elapsed().as_secs_f64();

        match &result {
            Ok(response) => {
                self.metrics.record_llm_request(
                    &api_request.model,
                    true,
                    latency,
                    TokenUsage::new(
                        response.usage.prompt_tokens as u64,
                        response.usage.completion_tokens as u64,
                    ),
                );
                tracing::debug!(
                    model = %api_request.model,
                    latency_ms = (latency * 1000.0) as u64,
                    total_tokens = response.usage.total_tokens,
                    "Generation request completed"
                );
            }
            Err(err) => {
                self.metrics.record_llm_request(
                    &api_request.model,
                    false,
                    latency,
                    TokenUsage::default(),
                );
                tracing::error!(model = %api_request.model, error = %err, "Generation request failed");
            }
        }

        result
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}

/// Masks a secret for logging: first and last four characters, or all `*`
/// when it is too short to reveal anything.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

#[derive(Debug, Clone, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    index: u32,
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    role: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves canned HTTP responses in order (the last one repeats) and
    /// records every raw request it receives.
    async fn stub_server(responses: Vec<(u16, String)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_task = Arc::clone(&seen);

        tokio::spawn(async move {
            let mut served = 0usize;
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let raw = read_http_request(&mut socket).await;
                seen_task.lock().unwrap().push(raw);

                let (status, body) = responses[served.min(responses.len() - 1)].clone();
                served += 1;
                let reply = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}", addr), seen)
    }

    async fn read_http_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut data = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&data);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if data.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }

    fn completion_body(content: &str) -> String {
        serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 42, "completion_tokens": 7, "total_tokens": 49}
        })
        .to_string()
    }

    fn config_for(base: &str) -> ProviderConfig {
        ProviderConfig::default()
            .with_api_key("sk-test-0123456789")
            .with_api_base(base)
            .with_timeout_secs(5)
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("", vec![Message::system("rules"), Message::user("hi")])
            .with_temperature(0.8)
            .with_max_tokens(500)
    }

    #[test]
    fn test_missing_api_key() {
        let err = OpenAiClient::from_config(&ProviderConfig::default()).unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey));
    }

    #[test]
    fn test_test_mode_placeholder_key() {
        let client = OpenAiClient::from_config(&ProviderConfig::default().with_test_mode(true))
            .expect("test mode should build");
        assert_eq!(client.api_key_masked(), mask_secret(TEST_API_KEY));
        assert_eq!(client.model(), "gpt-4o-mini");
    }

    #[test]
    fn test_configured_key_wins_over_test_mode() {
        let config = ProviderConfig::default()
            .with_test_mode(true)
            .with_api_key("sk-1234567890abcdef");
        let client = OpenAiClient::from_config(&config).expect("build");
        assert_eq!(client.api_key_masked(), "sk-1...cdef");
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("abc"), "***");
        assert_eq!(mask_secret("12345678"), "********");
        assert_eq!(mask_secret("sk-1234567890abcdef"), "sk-1...cdef");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = OpenAiClient::from_config(&config_for("http://localhost:4000/v1/"))
            .expect("build");
        assert_eq!(client.base_url(), "http://localhost:4000/v1");
    }

    #[tokio::test]
    async fn test_generate_success() {
        let (base, seen) = stub_server(vec![(200, completion_body("You are wrong."))]).await;
        let client = OpenAiClient::from_config(&config_for(&base)).expect("build");

        let response = client.generate(request()).await.expect("generation");
        assert_eq!(response.first_content(), Some("You are wrong."));
        assert_eq!(response.usage.total_tokens, 49);

        let requests = seen.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("POST /chat/completions"));
        assert!(requests[0].contains("Bearer sk-test-0123456789"));
        // Empty request model falls back to the configured one
        assert!(requests[0].contains("\"model\":\"gpt-4o-mini\""));
    }

    #[tokio::test]
    async fn test_transient_error_is_retried() {
        let (base, seen) = stub_server(vec![
            (503, r#"{"error":{"message":"overloaded"}}"#.to_string()),
            (200, completion_body("Second time lucky.")),
        ])
        .await;
        let client = OpenAiClient::from_config(&config_for(&base).with_max_retries(1))
            .expect("build")
            .with_retry_base_delay(Duration::from_millis(1));

        let response = client.generate(request()).await.expect("retry succeeds");
        assert_eq!(response.first_content(), Some("Second time lucky."));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let (base, seen) =
            stub_server(vec![(500, r#"{"error":{"message":"boom"}}"#.to_string())]).await;
        let client = OpenAiClient::from_config(&config_for(&base).with_max_retries(2))
            .expect("build")
            .with_retry_base_delay(Duration::from_millis(1));

        let err = client.generate(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::ApiError { code: 500, ref message } if message == "boom"));
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_auth_error_not_retried() {
        let (base, seen) = stub_server(vec![(
            401,
            r#"{"error":{"message":"Incorrect API key provided"}}"#.to_string(),
        )])
        .await;
        let client = OpenAiClient::from_config(&config_for(&base).with_max_retries(2))
            .expect("build")
            .with_retry_base_delay(Duration::from_millis(1));

        let err = client.generate(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::ApiError { code: 401, .. }));
        assert!(err.to_string().contains("Incorrect API key"));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unbounded_retry_count_does_not_overflow() {
        let (base, seen) =
            stub_server(vec![(400, r#"{"error":{"message":"bad request"}}"#.to_string())]).await;
        let client = OpenAiClient::from_config(&config_for(&base).with_max_retries(u32::MAX))
            .expect("build");

        let err = client.generate(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::ApiError { code: 400, .. }));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_rate_limited() {
        let (base, _seen) =
            stub_server(vec![(429, r#"{"error":{"message":"quota exceeded"}}"#.to_string())])
                .await;
        let client =
            OpenAiClient::from_config(&config_for(&base).with_max_retries(0)).expect("build");

        let err = client.generate(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::RateLimited(ref m) if m == "quota exceeded"));
    }

    #[tokio::test]
    async fn test_null_content_yields_no_first_content() {
        let body = serde_json::json!({
            "id": "x",
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": null}}]
        })
        .to_string();
        let (base, _seen) = stub_server(vec![(200, body)]).await;
        let client = OpenAiClient::from_config(&config_for(&base)).expect("build");

        let response = client.generate(request()).await.expect("parse");
        assert_eq!(response.first_content(), None);
    }

    #[tokio::test]
    async fn test_connection_error() {
        let client = OpenAiClient::from_config(
            &config_for("http://127.0.0.1:1").with_max_retries(0),
        )
        .expect("build");

        let result = client.generate(request()).await;
        assert!(matches!(
            result,
            Err(LlmError::RequestFailed(_)) | Err(LlmError::Timeout { .. })
        ));
    }
}
