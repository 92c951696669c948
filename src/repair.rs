//! Recovery of schema-valid values from malformed structured LLM output.
//!
//! Providers that enforce tool calls frequently reject near-miss JSON (markdown
//! emphasis around keys, trailing commas, single quotes) and echo the raw
//! generation back inside the error. The helpers here pull that payload out,
//! repair it, and validate it against the requested type before giving up.

use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::RetryPolicy;
use crate::error::{LlmError, RepairError};
use crate::llm::{invoke_structured, ChatModel, Message};

static BOLD_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*([^*\n]+?)\*\*\s*:").expect("bold key regex"));
static BOLD_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":\s*\*\*([^*\n]+?)\*\*").expect("bold value regex"));
static UNQUOTED_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:").expect("unquoted key regex")
});
static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("trailing comma regex"));
static FAILED_GENERATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)'failed_generation':\s*'(.+?)'\s*\}").expect("failed generation regex")
});
static JSON_OBJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").expect("json object regex")
});
static ARGUMENTS_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)"arguments"\s*:\s*(\{.*\})"#).expect("arguments regex")
});

/// Apply textual fixes for common near-JSON mistakes. Valid JSON is returned untouched.
pub fn repair_json(input: &str) -> String {
    if serde_json::from_str::<Value>(input).is_ok() {
        return input.to_string();
    }

    let mut s: String = strip_code_fences(input.trim())
        .chars()
        .map(|c| match c {
            '\u{2011}' | '\u{2013}' | '\u{2014}' => '-',
            c => c,
        })
        .collect();

    s = BOLD_KEY.replace_all(&s, "\"${1}\":").into_owned();
    s = BOLD_VALUE.replace_all(&s, ": \"${1}\"").into_owned();
    if !s.contains('"') && s.contains('\'') {
        s = s.replace('\'', "\"");
    }
    s = UNQUOTED_KEY.replace_all(&s, "${1}\"${2}\":").into_owned();
    s = TRAILING_COMMA.replace_all(&s, "${1}").into_owned();
    s
}

fn strip_code_fences(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    // drop the info string (```json)
    let Some(newline) = rest.find('\n') else {
        return rest.trim_end().trim_end_matches('`').trim();
    };
    let body = &rest[newline + 1..];
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Pull an embedded JSON payload out of a provider error message.
pub fn extract_json_from_error(message: &str) -> Option<String> {
    if let Some(caps) = FAILED_GENERATION.captures(message) {
        return Some(caps[1].to_string());
    }

    let fragment = JSON_OBJECT
        .find_iter(message)
        .max_by_key(|m| m.as_str().len())?
        .as_str();

    // A JSON error envelope may itself carry the generation.
    if let Ok(value) = serde_json::from_str::<Value>(fragment) {
        let nested = value
            .get("failed_generation")
            .or_else(|| value.get("error").and_then(|e| e.get("failed_generation")));
        if let Some(Value::String(generation)) = nested {
            return Some(generation.clone());
        }
    }
    Some(fragment.to_string())
}

/// Unwrap the `arguments` member of a tool-call envelope, if present.
pub fn extract_tool_arguments(raw: &str) -> Option<String> {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return ARGUMENTS_FIELD
            .captures(raw)
            .map(|caps| caps[1].to_string());
    };

    let call = match &value {
        Value::Array(calls) => calls.first()?,
        other => other,
    };
    let arguments = call
        .get("arguments")
        .or_else(|| call.get("function").and_then(|f| f.get("arguments")))
        .or_else(|| call.pointer("/tool_calls/0/function/arguments"))?;

    match arguments {
        Value::String(s) => Some(s.clone()),
        Value::Object(_) => Some(arguments.to_string()),
        _ => None,
    }
}

/// Parse `raw` into `T`, repairing syntax errors between attempts. A schema
/// mismatch on syntactically valid JSON ends the attempts immediately.
pub fn parse_with_repair<T: DeserializeOwned>(raw: &str, max_attempts: u32) -> Result<T, RepairError> {
    let mut candidate = raw.to_string();
    let mut last = RepairError::Syntax("no parse attempted".to_string());

    for attempt in 0..max_attempts.max(1) {
        match serde_json::from_str::<Value>(&candidate) {
            Ok(value) => {
                return serde_json::from_value(value).map_err(|e| RepairError::Schema(e.to_string()))
            }
            Err(e) => {
                debug!(attempt, error = %e, "JSON parse failed, repairing");
                last = RepairError::Syntax(e.to_string());
                let repaired = repair_json(&candidate);
                if repaired == candidate {
                    break;
                }
                candidate = repaired;
            }
        }
    }
    Err(last)
}

fn salvage_payload(err: &LlmError) -> Option<String> {
    let raw = err
        .embedded_output()
        .map(|s| s.to_string())
        .or_else(|| extract_json_from_error(&err.to_string()))?;
    Some(extract_tool_arguments(&raw).unwrap_or(raw))
}

/// Schema-constrained call with salvage, repair and exponential backoff.
///
/// With a fallback this never fails: after `policy.max_retries + 1` failed
/// attempts the fallback is returned as-is. Without one the last error is returned.
pub async fn safe_structured_invoke<T>(
    llm: &dyn ChatModel,
    messages: &[Message],
    policy: RetryPolicy,
    fallback: Option<T>,
) -> Result<T, LlmError>
where
    T: DeserializeOwned + JsonSchema + Send,
{
    let mut last_error = None;

    for attempt in 0..=policy.max_retries {
        match invoke_structured::<T>(llm, messages).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(attempt, error = %err, "structured call failed");
                if let Some(payload) = salvage_payload(&err) {
                    match parse_with_repair::<T>(&payload, 3) {
                        Ok(value) => {
                            info!(attempt, "recovered structured output from failed generation");
                            return Ok(value);
                        }
                        Err(e) => debug!(attempt, error = %e, "repair did not recover output"),
                    }
                }
                last_error = Some(err);
                if attempt < policy.max_retries {
                    tokio::time::sleep(policy.backoff(attempt)).await;
                }
            }
        }
    }

    match fallback {
        Some(fallback) => {
            warn!(
                attempts = policy.max_retries + 1,
                "structured call exhausted retries, using fallback"
            );
            Ok(fallback)
        }
        None => Err(last_error.unwrap_or(LlmError::EmptyResponse)),
    }
}
