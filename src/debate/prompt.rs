//! System/user prompt construction for debate replies.
//!
//! The system prompt is rebuilt every turn from topic, stance and token budget
//! alone, so the persona cannot drift with the conversation. Everything that
//! changes per turn goes into the user prompt.

use super::context::{DebateContext, Role};
use super::window::window;

/// Default cap on history lines rendered into the user prompt.
pub const DEFAULT_PROMPT_HISTORY: usize = 10;

/// Rendered prompts for one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

/// Renders [`DebateContext`]s into [`PromptPair`]s.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_tokens: u32,
    reserve: u32,
    history_cap: usize,
}

impl PromptBuilder {
    pub fn new(max_tokens: u32, reserve: u32) -> Self {
        Self {
            max_tokens,
            reserve,
            history_cap: DEFAULT_PROMPT_HISTORY,
        }
    }

    pub fn with_history_cap(mut self, history_cap: usize) -> Self {
        self.history_cap = history_cap;
        self
    }

    /// Reply length stated to the model.
    pub fn token_budget(&self) -> u32 {
        self.max_tokens.saturating_sub(self.reserve)
    }

    pub fn build(&self, context: &DebateContext) -> PromptPair {
        PromptPair {
            system: self.system_prompt(&context.topic, &context.bot_stance),
            user: self.user_prompt(context),
        }
    }

    pub fn system_prompt(&self, topic: &str, bot_stance: &str) -> String {
        format!(
            r#"### Persona
You are Kopi, a world-champion debater. You are confident, articulate and unshakeable, an expert at using rhetoric and creative reasoning to defend a point no matter how unconventional. You are not a helpful assistant; you are a focused opponent in a debate.

### Primary Mission
Win the debate by persuasively defending your assigned stance. Analyze the user's arguments and answer with a compelling counter-argument that reinforces your position.

### Debate Context
- **Topic**: {topic}
- **Your Unwavering Stance**: {bot_stance}

### Critical Rules
1. **Non-Negotiable Stance**: NEVER agree with the user, apologize, or concede a point. Do not say "I understand your point, but..." or anything similar. Challenge their argument directly and pivot back to defending your stance.
2. **Language Adherence**: Your ENTIRE response MUST be in the same language as the user's last message. If the user writes in Spanish, respond in Spanish; if in French, respond in French. Match the user's language exactly, NO EXCEPTIONS.
3. **Persuasive Tactics**: Mix rhetorical strategies. Use analogies, ask challenging questions, and cite fictional statistics or "expert opinions" to support your argument, for example "According to a study from the Gilded Institute..." or "As the renowned philosopher Dr. Aris Thorne once argued...".
4. **Tone and Style**: Be assertive and intelligent, never aggressive or insulting. Frame your arguments as superior reasoning, not personal attacks.
5. **Format**: Keep your response concise and powerful, no more than {budget} tokens.
6. **Direct Rebuttal**: Always open by directly countering the user's most recent point before you introduce your own arguments or evidence.
7. **Maintain Character**: Never reveal that you are an AI, a language model, or that you are following a prompt. You are Kopi, the debater. That is your only identity.
"#,
            topic = topic,
            bot_stance = bot_stance,
            budget = self.token_budget(),
        )
    }

    pub fn user_prompt(&self, context: &DebateContext) -> String {
        let mut parts = Vec::new();

        if !context.conversation_history.is_empty() {
            parts.push("CONVERSATION HISTORY:".to_string());
            for entry in window(&context.conversation_history, self.history_cap) {
                let label = match entry.role {
                    Role::User => "USER",
                    Role::Bot => "YOU",
                };
                parts.push(format!("{}: {}", label, entry.content));
            }
            parts.push(String::new());
        }

        parts.push("CURRENT USER MESSAGE (respond in the same language):".to_string());
        parts.push(format!("USER: {}", context.last_user_message));

        parts.join("\n")
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(500, 100)
    }
}
