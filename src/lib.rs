//! kopi-debate: a debate bot that always argues the other side.
//!
//! The first message of a conversation is analysed for a topic and a
//! contrarian stance; every reply afterwards is generated under a fixed
//! persona that defends that stance, using a bounded window of the stored
//! history as context.

pub mod cli;
pub mod config;
pub mod debate;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod service;
pub mod storage;

pub use config::{AppConfig, DebateSettings, ProviderConfig};
pub use error::{ConfigError, DebateError, LlmError, ProviderError, StorageError};
pub use service::{DebateRequest, DebateService, DebateSnapshot, DebateTurn};
