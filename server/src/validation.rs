use crate::error::{AppError, INVALID_TARGET_MESSAGE};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Request keys that may carry the battle identifier, highest priority first.
const IDENTIFIER_KEYS: &[&str] = &["url", "fightId", "id"];

static BATTLE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?:www\.)?battleverse\.cn/battle/([0-9]+)").expect("valid battle url regex")
});

/// Parse a battle id from a bare number, an `@`-prefixed number or a
/// battleverse battle link. Links only need to match from the start.
pub fn extract_fight_id(value: &str) -> Option<u64> {
    let mut value = value.trim();
    if let Some(rest) = value.strip_prefix('@') {
        value = rest.trim();
    }
    if value.is_empty() {
        return None;
    }
    if value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse().ok();
    }
    BATTLE_URL
        .captures(value)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// First non-null identifier value in the request body, rendered as text.
pub fn identifier_from_payload(payload: &Value) -> Option<String> {
    IDENTIFIER_KEYS
        .iter()
        .filter_map(|key| payload.get(*key))
        .find(|value| !value.is_null())
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}

pub fn resolve_fight_id(payload: &Value) -> Result<u64, AppError> {
    identifier_from_payload(payload)
        .as_deref()
        .and_then(extract_fight_id)
        .ok_or_else(|| AppError::BadRequest(INVALID_TARGET_MESSAGE.into()))
}
