//! Prometheus-based metrics for generation calls and debate turns.
//!
//! ```ignore
//! use kopi_debate::metrics::{export_metrics, init_metrics, MetricsCollector, TurnKind};
//!
//! init_metrics()?;
//! MetricsCollector::new().record_turn(TurnKind::Opening, true);
//! println!("{}", export_metrics());
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::{MetricsCollector, TokenUsage, TurnKind};
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    DEBATE_TURNS_TOTAL, LLM_LATENCY, LLM_REQUESTS_TOTAL, LLM_TOKENS_TOTAL, REGISTRY,
    STANCE_EXTRACTIONS_TOTAL,
};
