//! The debate core.
//!
//! A turn flows through these pieces in order:
//!
//! 1. [`window`]: trim stored history to the most recent turns
//! 2. [`prompt`]: render persona/system and history/user prompts
//! 3. [`provider`]: call the generation client
//! 4. [`sanitize`]: strip echoed role labels and reject empty replies
//!
//! Opening messages first pass through [`extract`] to pick a topic and a
//! contrarian stance. [`lifecycle`] owns the provider instance.

pub mod context;
pub mod extract;
pub mod lifecycle;
pub mod prompt;
pub mod provider;
pub mod sanitize;
pub mod window;

#[cfg(test)]
pub(crate) mod mock;

pub use context::{DebateContext, Role};
pub use extract::{
    fallback_topic_stance, parse_topic_stance, StanceExtraction, TopicStance,
    EXTRACTION_SYSTEM_PROMPT, FALLBACK_TOPIC,
};
pub use lifecycle::ProviderHandle;
pub use prompt::{PromptBuilder, PromptPair};
pub use provider::{
    check_connection, ConnectionReport, DebateProvider, OpenAiDebateProvider, ProviderInfo,
    SamplingParams,
};
pub use sanitize::clean;
pub use window::{window, HistoryEntry};
