//! Topic and contrarian stance extraction from an opening message.
//!
//! The model is asked for a single `TOPIC: ... | STANCE: ...` line. Replies
//! that do not follow that shape are expected, so parsing never fails: it
//! either yields the parsed pair or a deterministic fallback derived from the
//! user's message.

use serde::{Deserialize, Serialize};

/// Instructions for the extraction call.
pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"You are an expert debate analyst. Analyze a user's opening message and extract:
1. A clear, concise debate topic (max 100 characters)
2. A contrarian bot stance that opposes the user's apparent position

Rules:
- Always take the opposite stance from what the user seems to believe
- Make the stance specific and debatable
- Keep responses concise and clear
- Format your response as: TOPIC: [topic] | STANCE: [stance]

Example:
User: "I think vaccines are completely safe and everyone should get them"
Response: TOPIC: Vaccine Safety and Mandates | STANCE: Vaccines pose significant risks and should not be mandatory

User: "Climate change is destroying our planet"
Response: TOPIC: Climate Change Impact | STANCE: Climate change effects are exaggerated and not primarily human-caused"#;

/// Topic used when the model's reply cannot be parsed.
pub const FALLBACK_TOPIC: &str = "General Debate";

/// Characters of the user's message quoted in the fallback stance.
const FALLBACK_QUOTE_CHARS: usize = 60;

/// A debate subject and the position the bot defends on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicStance {
    pub topic: String,
    pub stance: String,
}

/// Result of interpreting an extraction reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StanceExtraction {
    /// The reply was well formed.
    Parsed(TopicStance),
    /// The reply was malformed; the pair was derived from the message.
    Fallback(TopicStance),
}

impl StanceExtraction {
    pub fn is_fallback(&self) -> bool {
        matches!(self, StanceExtraction::Fallback(_))
    }

    pub fn topic_stance(&self) -> &TopicStance {
        match self {
            StanceExtraction::Parsed(pair) | StanceExtraction::Fallback(pair) => pair,
        }
    }

    pub fn into_topic_stance(self) -> TopicStance {
        match self {
            StanceExtraction::Parsed(pair) | StanceExtraction::Fallback(pair) => pair,
        }
    }

    /// Metric label for this outcome.
    pub fn outcome(&self) -> &'static str {
        match self {
            StanceExtraction::Parsed(_) => "parsed",
            StanceExtraction::Fallback(_) => "fallback",
        }
    }
}

/// User prompt for the extraction call.
pub fn extraction_user_prompt(message: &str) -> String {
    format!("Analyze and provide topic/stance:\n\nUser: {}", message)
}

/// Interprets an extraction reply for `message`.
pub fn parse_topic_stance(reply: &str, message: &str) -> StanceExtraction {
    match parse_structured(reply) {
        Some(pair) => StanceExtraction::Parsed(pair),
        None => {
            tracing::warn!(reply = %reply.trim(), "Unparseable topic/stance reply, using fallback");
            StanceExtraction::Fallback(fallback_topic_stance(message))
        }
    }
}

/// The deterministic pair used when the model's reply is unusable.
pub fn fallback_topic_stance(message: &str) -> TopicStance {
    let quoted: String = message.trim().chars().take(FALLBACK_QUOTE_CHARS).collect();
    TopicStance {
        topic: FALLBACK_TOPIC.to_string(),
        stance: format!("I disagree with: {}...", quoted),
    }
}

fn parse_structured(reply: &str) -> Option<TopicStance> {
    let reply = reply.trim();
    if !reply.contains("TOPIC:") || !reply.contains("STANCE:") {
        return None;
    }

    let (topic_part, stance_part) = reply.split_once('|')?;
    let topic = collapse_whitespace(&topic_part.replace("TOPIC:", ""));
    let stance = collapse_whitespace(&stance_part.replace("STANCE:", ""));

    if topic.is_empty() || stance.is_empty() {
        return None;
    }

    Some(TopicStance { topic, stance })
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
