//! High-level recording interface over the raw Prometheus metrics.

use super::prometheus::{
    DEBATE_TURNS_TOTAL, LLM_LATENCY, LLM_REQUESTS_TOTAL, LLM_TOKENS_TOTAL,
    STANCE_EXTRACTIONS_TOTAL,
};

/// Token usage information for a generation request.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    /// Number of prompt tokens.
    pub input_tokens: u64,
    /// Number of completion tokens.
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Kind of debate turn, used as a metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    /// First message of a new conversation.
    Opening,
    /// Message added to an existing conversation.
    Continuation,
}

impl TurnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnKind::Opening => "opening",
            TurnKind::Continuation => "continuation",
        }
    }
}

/// Metrics collector for recording operational metrics.
///
/// Every method is a no-op until `init_metrics()` has been called, so library
/// code can record unconditionally.
///
/// ```ignore
/// use kopi_debate::metrics::{init_metrics, MetricsCollector, TokenUsage};
///
/// init_metrics()?;
/// let collector = MetricsCollector::new();
/// collector.record_llm_request("gpt-4o-mini", true, 1.2, TokenUsage::new(420, 180));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record one generation API request.
    pub fn record_llm_request(
        &self,
        model: &str,
        success: bool,
        latency_secs: f64,
        tokens: TokenUsage,
    ) {
        let status = if success { "success" } else { "failure" };

        if let Some(requests) = LLM_REQUESTS_TOTAL.get() {
            requests.with_label_values(&[model, status]).inc();
        }

        if let Some(latency) = LLM_LATENCY.get() {
            latency.with_label_values(&[model]).observe(latency_secs);
        }

        if let Some(token_counter) = LLM_TOKENS_TOTAL.get() {
            token_counter
                .with_label_values(&[model, "input"])
                .inc_by(tokens.input_tokens as f64);
            token_counter
                .with_label_values(&[model, "output"])
                .inc_by(tokens.output_tokens as f64);
        }

        tracing::trace!(
            model = model,
            status = status,
            latency_secs = latency_secs,
            input_tokens = tokens.input_tokens,
            output_tokens = tokens.output_tokens,
            "Recorded LLM request metric"
        );
    }

    /// Record the outcome of a debate turn.
    pub fn record_turn(&self, kind: TurnKind, success: bool) {
        let status = if success { "success" } else { "failure" };
        if let Some(turns) = DEBATE_TURNS_TOTAL.get() {
            turns.with_label_values(&[kind.as_str(), status]).inc();
        }
    }

    /// Record a topic/stance extraction outcome: "parsed", "fallback" or "error".
    pub fn record_extraction(&self, outcome: &str) {
        if let Some(extractions) = STANCE_EXTRACTIONS_TOTAL.get() {
            extractions.with_label_values(&[outcome]).inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{export_metrics, init_metrics};

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::new(120, 30);
        assert_eq!(usage.total(), 150);
        assert_eq!(TokenUsage::default().total(), 0);
    }

    #[test]
    fn test_turn_kind_labels() {
        assert_eq!(TurnKind::Opening.as_str(), "opening");
        assert_eq!(TurnKind::Continuation.as_str(), "continuation");
    }

    #[test]
    fn test_recording_shows_in_export() {
        init_metrics().expect("metrics init");
        let collector = MetricsCollector::new();
        collector.record_llm_request("mock-model", true, 0.4, TokenUsage::new(10, 5));
        collector.record_extraction("fallback");

        let text = export_metrics();
        assert!(text.contains("kopi_llm_requests_total"));
        assert!(text.contains("mock-model"));
        assert!(text.contains("kopi_stance_extractions_total"));
    }
}
