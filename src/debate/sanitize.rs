//! Cleanup of generated replies before they are trusted.

use crate::error::ProviderError;

/// Role labels models sometimes echo at the start of a reply.
pub const ROLE_PREFIXES: &[&str] = &["AI:", "Bot:", "Assistant:", "Response:", "YOU:", "BOT:", "Kopi:"];

/// Trims `raw` and strips at most one leading role label.
///
/// Fails with `ProviderError::EmptyResponse` if nothing is left, either
/// before or after stripping.
pub fn clean(raw: &str) -> Result<String, ProviderError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ProviderError::EmptyResponse(
            "model returned an empty reply".to_string(),
        ));
    }

    let cleaned = ROLE_PREFIXES
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .map(str::trim)
        .unwrap_or(trimmed);

    if cleaned.is_empty() {
        return Err(ProviderError::EmptyResponse(
            "reply was empty after removing role label".to_string(),
        ));
    }

    Ok(cleaned.to_string())
}
