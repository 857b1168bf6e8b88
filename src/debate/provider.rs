//! The debate provider: prompt building, generation, cleanup and
//! topic/stance extraction behind one interface.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use super::context::DebateContext;
use super::extract::{extraction_user_prompt, parse_topic_stance, StanceExtraction, EXTRACTION_SYSTEM_PROMPT};
use super::prompt::{PromptBuilder, PromptPair};
use super::sanitize::clean;
use crate::config::{DebateSettings, ProviderConfig};
use crate::error::{LlmError, ProviderError};
use crate::llm::{GenerationRequest, LlmProvider, Message, OpenAiClient};

/// Name reported for the OpenAI-backed provider.
pub const OPENAI_PROVIDER_NAME: &str = "OpenAI";

/// Characters of a reply shown in a connection report.
const PREVIEW_CHARS: usize = 100;

/// Identity of a provider, for reports and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub model: String,
}

/// What the debate service needs from a text generator.
#[async_trait]
pub trait DebateProvider: Send + Sync {
    /// Produces a cleaned counter-argument for the given turn.
    async fn generate_response(&self, context: &DebateContext) -> Result<String, ProviderError>;

    /// Derives a topic and contrarian stance from an opening message.
    ///
    /// Only a failed generation call is an error; malformed replies come
    /// back as [`StanceExtraction::Fallback`].
    async fn extract_topic_and_stance(
        &self,
        message: &str,
    ) -> Result<StanceExtraction, ProviderError>;

    fn describe(&self) -> ProviderInfo;
}

/// Sampling parameters for one kind of generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
}

impl SamplingParams {
    /// Parameters for debate replies.
    pub fn for_replies(config: &ProviderConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: Some(config.top_p),
            frequency_penalty: Some(config.frequency_penalty),
            presence_penalty: Some(config.presence_penalty),
        }
    }

    /// Parameters for topic/stance extraction.
    pub fn for_extraction(config: &ProviderConfig) -> Self {
        Self {
            max_tokens: config.extraction_max_tokens,
            temperature: config.extraction_temperature,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
        }
    }

    fn request(&self, model: &str, messages: Vec<Message>) -> GenerationRequest {
        let mut request = GenerationRequest::new(model, messages)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);
        request.top_p = self.top_p;
        request.frequency_penalty = self.frequency_penalty;
        request.presence_penalty = self.presence_penalty;
        request
    }
}

/// [`DebateProvider`] over any chat-completion client.
pub struct OpenAiDebateProvider {
    llm: Arc<dyn LlmProvider>,
    model: String,
    prompts: PromptBuilder,
    reply_params: SamplingParams,
    extraction_params: SamplingParams,
}

impl std::fmt::Debug for OpenAiDebateProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiDebateProvider")
            .field("model", &self.model)
            .field("prompts", &self.prompts)
            .finish_non_exhaustive()
    }
}

impl OpenAiDebateProvider {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        config: &ProviderConfig,
        settings: &DebateSettings,
    ) -> Self {
        Self {
            model: llm.default_model().to_string(),
            llm,
            prompts: PromptBuilder::new(config.max_tokens, settings.response_token_reserve),
            reply_params: SamplingParams::for_replies(config),
            extraction_params: SamplingParams::for_extraction(config),
        }
    }

    /// Builds the HTTP client and wraps it.
    ///
    /// Fails with `ProviderError::Configuration` when no credential is
    /// available.
    pub fn from_config(
        config: &ProviderConfig,
        settings: &DebateSettings,
    ) -> Result<Self, ProviderError> {
        let client = OpenAiClient::from_config(config).map_err(|e| match e {
            LlmError::MissingApiKey => {
                ProviderError::Configuration("OPENAI_API_KEY not configured".to_string())
            }
            other => ProviderError::Configuration(other.to_string()),
        })?;

        tracing::info!(
            model = %client.model(),
            api_base = %client.base_url(),
            api_key = %client.api_key_masked(),
            "Generation client initialized"
        );

        Ok(Self::new(Arc::new(client), config, settings))
    }

    pub fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    /// One generation call with the reply parameters. Returns the raw text.
    pub async fn generate(&self, prompts: &PromptPair) -> Result<String, ProviderError> {
        let request = self.reply_params.request(
            &self.model,
            vec![
                Message::system(prompts.system.as_str()),
                Message::user(prompts.user.as_str()),
            ],
        );

        let response = self
            .llm
            .generate(request)
            .await
            .map_err(ProviderError::Generation)?;

        response
            .first_content()
            .map(str::to_string)
            .ok_or(ProviderError::Generation(LlmError::EmptyContent))
    }
}

#[async_trait]
impl DebateProvider for OpenAiDebateProvider {
    async fn generate_response(&self, context: &DebateContext) -> Result<String, ProviderError> {
        let prompts = self.prompts.build(context);
        tracing::debug!(
            history_len = context.conversation_history.len(),
            system_chars = prompts.system.len(),
            user_chars = prompts.user.len(),
            "Built debate prompts"
        );

        let raw = self.generate(&prompts).await?;
        clean(&raw)
    }

    async fn extract_topic_and_stance(
        &self,
        message: &str,
    ) -> Result<StanceExtraction, ProviderError> {
        let request = self.extraction_params.request(
            &self.model,
            vec![
                Message::system(EXTRACTION_SYSTEM_PROMPT),
                Message::user(extraction_user_prompt(message)),
            ],
        );

        let response = self
            .llm
            .generate(request)
            .await
            .map_err(ProviderError::Extraction)?;

        Ok(parse_topic_stance(
            response.first_content().unwrap_or_default(),
            message,
        ))
    }

    fn describe(&self) -> ProviderInfo {
        ProviderInfo {
            name: OPENAI_PROVIDER_NAME.to_string(),
            model: self.model.clone(),
        }
    }
}

/// Outcome of a provider smoke test.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    pub success: bool,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionReport {
    /// Report for a provider that could not even be constructed.
    pub fn unavailable(provider: impl Into<String>, error: &ProviderError) -> Self {
        Self {
            success: false,
            provider: provider.into(),
            model: None,
            response_preview: None,
            response_length: None,
            error: Some(error.to_string()),
        }
    }
}

/// Generates one reply to a canned prompt and reports what happened.
pub async fn check_connection(provider: &dyn DebateProvider) -> ConnectionReport {
    let info = provider.describe();
    let context = DebateContext::new(
        "Test Topic",
        "Test contrarian position",
        "Hello, can you introduce yourself briefly?",
    );

    match provider.generate_response(&context).await {
        Ok(reply) => {
            let length = reply.chars().count();
            let preview = if length > PREVIEW_CHARS {
                format!("{}...", reply.chars().take(PREVIEW_CHARS).collect::<String>())
            } else {
                reply
            };
            ConnectionReport {
                success: true,
                provider: info.name,
                model: Some(info.model),
                response_preview: Some(preview),
                response_length: Some(length),
                error: None,
            }
        }
        Err(err) => ConnectionReport {
            success: false,
            provider: info.name,
            model: Some(info.model),
            response_preview: None,
            response_length: None,
            error: Some(err.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::mock::ScriptedLlm;
    use crate::debate::window::HistoryEntry;
    use crate::debate::Role;

    fn provider_with(llm: Arc<ScriptedLlm>) -> OpenAiDebateProvider {
        OpenAiDebateProvider::new(llm, &ProviderConfig::default(), &DebateSettings::default())
    }

    #[tokio::test]
    async fn test_generate_response_cleans_reply() {
        let llm = Arc::new(ScriptedLlm::new(["Kopi:  Offices forge culture."]));
        let provider = provider_with(Arc::clone(&llm));

        let ctx = DebateContext::new("Remote Work", "Offices win", "Home is better")
            .with_history(vec![HistoryEntry::new(Role::User, "Commutes are awful")]);
        let reply = provider.generate_response(&ctx).await.expect("reply");
        assert_eq!(reply, "Offices forge culture.");

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert!(request.messages[0].content.contains("Offices win"));
        assert!(request.messages[1].content.contains("USER: Commutes are awful"));
        assert_eq!(request.max_tokens, Some(500));
        assert_eq!(request.temperature, Some(0.8));
        assert_eq!(request.top_p, Some(0.9));
        assert_eq!(request.presence_penalty, Some(0.1));
    }

    #[tokio::test]
    async fn test_empty_content_is_generation_error() {
        let llm = Arc::new(ScriptedLlm::new([""]));
        let provider = provider_with(llm);

        let err = provider
            .generate_response(&DebateContext::new("t", "s", "m"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Generation(LlmError::EmptyContent)));
    }

    #[tokio::test]
    async fn test_whitespace_reply_is_empty_response() {
        let llm = Arc::new(ScriptedLlm::new(["   \n "]));
        let provider = provider_with(llm);

        let err = provider
            .generate_response(&DebateContext::new("t", "s", "m"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse(_)));
        assert!(err.is_generation_failure());
    }

    #[tokio::test]
    async fn test_transport_failure_is_generation_error() {
        let llm = Arc::new(ScriptedLlm::failing());
        let provider = provider_with(llm);

        let err = provider
            .generate_response(&DebateContext::new("t", "s", "m"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Generation(_)));
    }

    #[tokio::test]
    async fn test_extraction_uses_its_own_parameters() {
        let llm = Arc::new(ScriptedLlm::new([
            "TOPIC: Vaccine Safety | STANCE: Vaccines pose significant risks",
        ]));
        let provider = provider_with(Arc::clone(&llm));

        let result = provider
            .extract_topic_and_stance("Vaccines are safe")
            .await
            .expect("extraction");
        assert!(!result.is_fallback());
        assert_eq!(result.topic_stance().topic, "Vaccine Safety");

        let request = &llm.requests()[0];
        assert_eq!(request.max_tokens, Some(150));
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.top_p, None);
        assert_eq!(request.messages[0].content, EXTRACTION_SYSTEM_PROMPT);
        assert!(request.messages[1].content.ends_with("User: Vaccines are safe"));
    }

    #[tokio::test]
    async fn test_extraction_malformed_reply_falls_back() {
        let llm = Arc::new(ScriptedLlm::new(["I'd rather talk about cats."]));
        let provider = provider_with(llm);

        let result = provider
            .extract_topic_and_stance("Dogs are the best pets")
            .await
            .expect("fallback is not an error");
        assert!(result.is_fallback());
        assert_eq!(
            result.topic_stance().stance,
            "I disagree with: Dogs are the best pets..."
        );
    }

    #[tokio::test]
    async fn test_extraction_call_failure_is_error() {
        let provider = provider_with(Arc::new(ScriptedLlm::failing()));
        let err = provider
            .extract_topic_and_stance("anything")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Extraction(_)));
    }

    #[test]
    fn test_from_config_requires_key() {
        let err = OpenAiDebateProvider::from_config(
            &ProviderConfig::default(),
            &DebateSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(ref m) if m.contains("OPENAI_API_KEY")));

        let provider = OpenAiDebateProvider::from_config(
            &ProviderConfig::default().with_test_mode(true),
            &DebateSettings::default(),
        )
        .expect("test mode builds");
        assert_eq!(provider.describe().model, "gpt-4o-mini");
        assert_eq!(provider.prompts().token_budget(), 400);
    }

    #[tokio::test]
    async fn test_check_connection_success_truncates_preview() {
        let long_reply = "x".repeat(150);
        let provider = provider_with(Arc::new(ScriptedLlm::new([long_reply.as_str()])));

        let report = check_connection(&provider).await;
        assert!(report.success);
        assert_eq!(report.provider, "OpenAI");
        assert_eq!(report.model.as_deref(), Some("mock-model"));
        assert_eq!(report.response_length, Some(150));
        assert_eq!(report.response_preview, Some(format!("{}...", "x".repeat(100))));
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn test_check_connection_failure() {
        let provider = provider_with(Arc::new(ScriptedLlm::failing()));
        let report = check_connection(&provider).await;
        assert!(!report.success);
        assert!(report.error.is_some());

        let json = serde_json::to_value(&report).expect("serialize");
        assert!(json.get("response_preview").is_none());
    }
}
