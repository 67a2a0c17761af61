//! Inbound request validation.
//!
//! Bodies are validated field by field from raw JSON so that every rejection
//! names the offending field. The legacy names `requestId`, `prompt` and
//! history entries shaped `{prompt, response}` are accepted as aliases.

use crate::domain::config::LimitsConfig;
use crate::domain::correlation::{CorrelationKey, KeyError};
use crate::domain::error::BridgeError;
use crate::domain::types::PromptRequest;
use serde_json::{Map, Value};
use shared_types::entities::HistoryEntry;

const KEY_FIELDS: [&str; 2] = ["correlationKey", "requestId"];
const CONTENT_FIELDS: [&str; 2] = ["content", "prompt"];
const HISTORY_REQUEST_FIELDS: [&str; 2] = ["request", "prompt"];

fn malformed(msg: impl Into<String>) -> BridgeError {
    BridgeError::MalformedRequest(msg.into())
}

/// First present, non-null field among `names`.
fn field<'a>(obj: &'a Map<String, Value>, names: &[&'static str]) -> Option<(&'static str, &'a Value)> {
    names
        .iter()
        .find_map(|name| obj.get(*name).filter(|v| !v.is_null()).map(|v| (*name, v)))
}

fn non_empty_string<'a>(name: &str, value: &'a Value) -> Result<&'a str, BridgeError> {
    let s = value
        .as_str()
        .ok_or_else(|| malformed(format!("`{name}` must be a string")))?;
    if s.trim().is_empty() {
        return Err(malformed(format!("`{name}` must not be empty")));
    }
    Ok(s)
}

fn parse_key(obj: &Map<String, Value>, limits: &LimitsConfig) -> Result<CorrelationKey, BridgeError> {
    let Some((name, value)) = field(obj, &KEY_FIELDS) else {
        if limits.generate_missing_keys {
            return Ok(CorrelationKey::generate());
        }
        return Err(malformed("`correlationKey` is required"));
    };
    let raw = value
        .as_str()
        .ok_or_else(|| malformed(format!("`{name}` must be a string")))?;
    CorrelationKey::parse_with_limit(raw, limits.max_key_len).map_err(|e| match e {
        KeyError::Empty => malformed(format!("`{name}` must not be empty")),
        KeyError::TooLong(len, max) => {
            malformed(format!("`{name}` is {len} bytes, limit is {max}"))
        }
    })
}

fn parse_history(obj: &Map<String, Value>, limits: &LimitsConfig) -> Result<Vec<HistoryEntry>, BridgeError> {
    let value = obj
        .get("history")
        .ok_or_else(|| malformed("`history` is required (use [] for none)"))?;
    let entries = value
        .as_array()
        .ok_or_else(|| malformed("`history` must be an array"))?;

    if limits.max_history > 0 && entries.len() > limits.max_history {
        return Err(malformed(format!(
            "`history` has {} entries, limit is {}",
            entries.len(),
            limits.max_history
        )));
    }

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let entry = entry
                .as_object()
                .ok_or_else(|| malformed(format!("`history[{i}]` must be an object")))?;
            let (name, request) = field(entry, &HISTORY_REQUEST_FIELDS)
                .ok_or_else(|| malformed(format!("`history[{i}].request` is required")))?;
            let request = request
                .as_str()
                .ok_or_else(|| malformed(format!("`history[{i}].{name}` must be a string")))?;
            let response = entry
                .get("response")
                .ok_or_else(|| malformed(format!("`history[{i}].response` is required")))?
                .as_str()
                .ok_or_else(|| malformed(format!("`history[{i}].response` must be a string")))?;
            Ok(HistoryEntry {
                request: request.to_string(),
                response: response.to_string(),
            })
        })
        .collect()
}

/// Validate a prompt body.
pub fn parse_prompt_request(body: &Value, limits: &LimitsConfig) -> Result<PromptRequest, BridgeError> {
    let obj = body
        .as_object()
        .ok_or_else(|| malformed("request body must be a JSON object"))?;

    let key = parse_key(obj, limits)?;
    let (name, content) =
        field(obj, &CONTENT_FIELDS).ok_or_else(|| malformed("`content` is required"))?;
    let content = non_empty_string(name, content)?.to_string();
    let history = parse_history(obj, limits)?;

    Ok(PromptRequest {
        key,
        content,
        history,
    })
}
