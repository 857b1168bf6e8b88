//! Text generation over an OpenAI-compatible chat-completions API.
//!
//! [`LlmProvider`] is the seam the debate core depends on; [`OpenAiClient`]
//! is the HTTP implementation.
//!
//! ```ignore
//! use kopi_debate::config::ProviderConfig;
//! use kopi_debate::llm::{GenerationRequest, LlmProvider, Message, OpenAiClient};
//!
//! let client = OpenAiClient::from_config(&ProviderConfig::default().with_api_key("sk-..."))?;
//! let request = GenerationRequest::new("", vec![Message::user("Hello!")]);
//! let response = client.generate(request).await?;
//! ```

pub mod completion;
pub mod openai;

pub use completion::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};
pub use openai::{mask_secret, OpenAiClient, TEST_API_KEY};
