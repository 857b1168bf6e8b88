//! Per-turn debate context and message roles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::window::HistoryEntry;

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Bot => "bot",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "bot" => Ok(Role::Bot),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Everything the prompt builder needs for one turn.
///
/// Built fresh for every request and dropped afterwards. `conversation_history`
/// is oldest-first and does not include `last_user_message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateContext {
    pub topic: String,
    pub bot_stance: String,
    pub last_user_message: String,
    pub conversation_history: Vec<HistoryEntry>,
}

impl DebateContext {
    pub fn new(
        topic: impl Into<String>,
        bot_stance: impl Into<String>,
        last_user_message: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            bot_stance: bot_stance.into(),
            last_user_message: last_user_message.into(),
            conversation_history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.conversation_history = history;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_text() {
        for role in [Role::User, Role::Bot] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert!("assistant".parse::<Role>().is_err());
        assert!("User".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Bot).expect("serialize"), "\"bot\"");
    }

    #[test]
    fn test_context_builder() {
        let ctx = DebateContext::new("Cats", "Cats are overrated", "Cats are great")
            .with_history(vec![HistoryEntry::new(Role::User, "hi")]);
        assert_eq!(ctx.topic, "Cats");
        assert_eq!(ctx.conversation_history.len(), 1);
    }
}
