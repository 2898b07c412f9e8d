// src/tools/parser.rs
//! Tool call parsing from model output
//!
//! Both dialects wrap each call in `<tool_call>`/`</tool_call>`:
//!
//! - [`Glm4ToolParser`]: a tool name line followed by
//!   `<arg_key>..</arg_key><arg_value>..</arg_value>` pairs. One malformed
//!   block discards the whole extraction.
//! - [`Qwen3ToolParser`]: a single `{"name": .., "arguments": {..}}` object.
//!   Bad blocks are dropped one by one.
//!
//! Matching is done with forward `find` scans, leftmost-first and
//! non-overlapping, so adversarial input cannot trigger backtracking.

use super::literal::{coerce_value, parse_literal, LiteralError};
use super::{ExtractionResult, ToolCall, ToolCallExtractor, TOOL_CALL_END, TOOL_CALL_START};
use serde_json::{Map, Value};

const ARG_KEY_START: &str = "<arg_key>";
const ARG_KEY_END: &str = "</arg_key>";
const ARG_VALUE_START: &str = "<arg_value>";
const ARG_VALUE_END: &str = "</arg_value>";

/// Why a paired-tag block could not be read
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BlockError {
    #[error("tool call block has no newline after the tool name")]
    MissingNameLine,

    #[error("tool call block has an empty tool name")]
    EmptyName,
}

/// Why an inline-JSON candidate was dropped
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    #[error("tool call is neither JSON nor a literal: {0}")]
    Unparsable(#[from] LiteralError),

    #[error("tool call is not a mapping")]
    NotAnObject,

    #[error("tool call has no `name`")]
    MissingName,

    #[error("tool call has no `arguments`")]
    MissingArguments,
}

/// Inner text of every `<tool_call>...</tool_call>` block, in order.
///
/// Each opener is closed by the nearest following closer. An opener with no
/// closer ends the scan.
pub(crate) fn tool_call_blocks(text: &str) -> impl Iterator<Item = &str> + '_ {
    let mut cursor = 0;
    std::iter::from_fn(move || {
        let open = text[cursor..].find(TOOL_CALL_START)? + cursor;
        let start = open + TOOL_CALL_START.len();
        let end = text[start..].find(TOOL_CALL_END)? + start;
        cursor = end + TOOL_CALL_END.len();
        Some(&text[start..end])
    })
}

/// `(key, value)` pairs of a paired-tag argument body, untrimmed.
///
/// A key runs to the first `</arg_key>` that is followed (whitespace
/// allowed) by `<arg_value>`; a value runs to the next `</arg_value>`.
pub(crate) fn arg_pairs(body: &str) -> impl Iterator<Item = (&str, &str)> + '_ {
    let mut cursor = 0;
    std::iter::from_fn(move || {
        let key_start = body[cursor..].find(ARG_KEY_START)? + cursor + ARG_KEY_START.len();
        let mut search = key_start;
        loop {
            let key_end = body[search..].find(ARG_KEY_END)? + search;
            let after_key = &body[key_end + ARG_KEY_END.len()..];
            let trimmed = after_key.trim_start();
            if trimmed.starts_with(ARG_VALUE_START) {
                let value_start = body.len() - trimmed.len() + ARG_VALUE_START.len();
                let value_end = body[value_start..].find(ARG_VALUE_END)? + value_start;
                cursor = value_end + ARG_VALUE_END.len();
                return Some((&body[key_start..key_end], &body[value_start..value_end]));
            }
            search = key_end + ARG_KEY_END.len();
        }
    })
}

/// Object literals wrapped as `<tool_call> {..} </tool_call>`.
///
/// After an opener (and optional whitespace) a `{` must follow; the candidate
/// ends at the first closer whose preceding non-whitespace character is a
/// `}` other than that opening brace.
pub(crate) fn inline_objects(text: &str) -> impl Iterator<Item = &str> + '_ {
    let mut cursor = 0;
    std::iter::from_fn(move || loop {
        let open = text[cursor..].find(TOOL_CALL_START)? + cursor;
        let after_open = open + TOOL_CALL_START.len();
        let trimmed = text[after_open..].trim_start();
        if !trimmed.starts_with('{') {
            cursor = after_open;
            continue;
        }
        let brace = text.len() - trimmed.len();
        let mut search = brace + 1;
        loop {
            // No closer fits this opener, so none fits a later one either.
            let close = text[search..].find(TOOL_CALL_END)? + search;
            let candidate = text[brace..close].trim_end();
            if candidate.len() >= 2 && candidate.ends_with('}') {
                cursor = close + TOOL_CALL_END.len();
                return Some(candidate);
            }
            search = close + TOOL_CALL_END.len();
        }
    })
}

/// Paired-tag dialect:
///
/// ```text
/// <tool_call>brave_search
/// <arg_key>keywords</arg_key><arg_value>rust</arg_value>
/// </tool_call>
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Glm4ToolParser;

impl Glm4ToolParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_block(block: &str) -> Result<ToolCall, BlockError> {
        let (name_line, body) = block.split_once('\n').ok_or(BlockError::MissingNameLine)?;
        let name = name_line.trim();
        if name.is_empty() {
            return Err(BlockError::EmptyName);
        }

        let mut arguments = Map::new();
        for (key, value) in arg_pairs(body) {
            arguments.insert(key.trim().to_string(), coerce_value(value.trim()));
        }
        Ok(ToolCall::new(name, arguments))
    }
}

impl ToolCallExtractor for Glm4ToolParser {
    fn name(&self) -> &'static str {
        "glm4"
    }

    fn extract_tool_calls(&self, text: &str) -> ExtractionResult {
        let parsed: Result<Vec<ToolCall>, BlockError> =
            tool_call_blocks(text).map(Self::parse_block).collect();
        match parsed {
            Ok(calls) => ExtractionResult::from_calls(calls),
            Err(e) => {
                crate::log_warn!("Discarding all tool calls, malformed block: {}", e);
                ExtractionResult::none()
            }
        }
    }
}

/// Inline-JSON dialect:
///
/// ```text
/// <tool_call>
/// {"name": "brave_search", "arguments": {"keywords": "rust"}}
/// </tool_call>
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Qwen3ToolParser;

impl Qwen3ToolParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_call(candidate: &str) -> Result<ToolCall, CallError> {
        let value = match serde_json::from_str::<Value>(candidate) {
            Ok(value) => value,
            Err(_) => parse_literal(candidate)?,
        };
        let Value::Object(mut object) = value else {
            return Err(CallError::NotAnObject);
        };

        let name = match object.remove("name") {
            Some(Value::String(name)) if !name.is_empty() => name,
            _ => return Err(CallError::MissingName),
        };
        let arguments = match object.remove("arguments") {
            Some(Value::Object(arguments)) => arguments,
            // some models emit the arguments object as an encoded string
            Some(Value::String(encoded)) => decode_arguments(&encoded).unwrap_or_default(),
            _ => Map::new(),
        };
        if arguments.is_empty() {
            return Err(CallError::MissingArguments);
        }
        Ok(ToolCall::new(name, arguments))
    }
}

fn decode_arguments(encoded: &str) -> Option<Map<String, Value>> {
    let decoded = serde_json::from_str::<Value>(encoded)
        .ok()
        .or_else(|| parse_literal(encoded).ok())?;
    match decoded {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

impl ToolCallExtractor for Qwen3ToolParser {
    fn name(&self) -> &'static str {
        "qwen3"
    }

    fn extract_tool_calls(&self, text: &str) -> ExtractionResult {
        let calls = inline_objects(text)
            .filter_map(|candidate| match Self::parse_call(candidate) {
                Ok(call) => Some(call),
                Err(e) => {
                    crate::log_debug!("Dropping tool call candidate ({}): {}", e, candidate);
                    None
                }
            })
            .collect();
        ExtractionResult::from_calls(calls)
    }
}
