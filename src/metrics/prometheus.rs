//! Prometheus metrics registration and export.
//!
//! All metrics live in a process-wide registry created by [`init_metrics`].
//! Recording before initialisation is silently skipped.

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all kopi metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total generation API requests, labeled by model and status.
pub static LLM_REQUESTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Generation API request latency in seconds, labeled by model.
pub static LLM_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Total tokens used, labeled by model and type (input/output).
pub static LLM_TOKENS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Debate turns handled, labeled by kind (opening/continuation) and status.
pub static DEBATE_TURNS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Topic/stance extractions, labeled by outcome (parsed/fallback/error).
pub static STANCE_EXTRACTIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Calling this more than once is harmless: later calls build a fresh registry
/// but the statics keep the first one.
///
/// # Errors
///
/// Returns a `prometheus::Error` if a metric definition is invalid.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let llm_requests_total = CounterVec::new(
        Opts::new("kopi_llm_requests_total", "Total generation API requests"),
        &["model", "status"],
    )?;

    let llm_latency = HistogramVec::new(
        HistogramOpts::new(
            "kopi_llm_latency_seconds",
            "Generation API request latency in seconds",
        )
        .buckets(vec![0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["model"],
    )?;

    let llm_tokens_total = CounterVec::new(
        Opts::new("kopi_llm_tokens_total", "Total tokens used"),
        &["model", "type"],
    )?;

    let debate_turns_total = CounterVec::new(
        Opts::new("kopi_debate_turns_total", "Debate turns handled"),
        &["kind", "status"],
    )?;

    let stance_extractions_total = CounterVec::new(
        Opts::new(
            "kopi_stance_extractions_total",
            "Topic/stance extractions by outcome",
        ),
        &["outcome"],
    )?;

    registry.register(Box::new(llm_requests_total.clone()))?;
    registry.register(Box::new(llm_latency.clone()))?;
    registry.register(Box::new(llm_tokens_total.clone()))?;
    registry.register(Box::new(debate_turns_total.clone()))?;
    registry.register(Box::new(stance_extractions_total.clone()))?;

    // Already-set statics mean an earlier call won; keep that registry.
    let _ = REGISTRY.set(registry);
    let _ = LLM_REQUESTS_TOTAL.set(llm_requests_total);
    let _ = LLM_LATENCY.set(llm_latency);
    let _ = LLM_TOKENS_TOTAL.set(llm_tokens_total);
    let _ = DEBATE_TURNS_TOTAL.set(debate_turns_total);
    let _ = STANCE_EXTRACTIONS_TOTAL.set(stance_extractions_total);

    tracing::debug!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
