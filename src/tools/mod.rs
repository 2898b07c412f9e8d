// src/tools/mod.rs
//! Tool call extraction for browse-rs
//!
//! This module recovers structured tool invocations from complete model
//! output. Two textual conventions are supported, each behind the
//! [`ToolCallExtractor`] trait so the episode loop can pick one by name.

pub mod helpers;
pub mod literal;
pub mod parser;
pub mod schema;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub use parser::{Glm4ToolParser, Qwen3ToolParser};

pub const TOOL_CALL_START: &str = "<tool_call>";
pub const TOOL_CALL_END: &str = "</tool_call>";

/// A single tool invocation recovered from model output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Outcome of one extraction pass over a text span.
///
/// `tools_called` is derived from the call list at construction, so the two
/// fields can never disagree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    tools_called: bool,
    tool_calls: Vec<ToolCall>,
}

impl ExtractionResult {
    /// Result with no actionable tool call
    pub fn none() -> Self {
        Self {
            tools_called: false,
            tool_calls: Vec::new(),
        }
    }

    pub fn from_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tools_called: !tool_calls.is_empty(),
            tool_calls,
        }
    }

    pub fn tools_called(&self) -> bool {
        self.tools_called
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        &self.tool_calls
    }

    pub fn into_tool_calls(self) -> Vec<ToolCall> {
        self.tool_calls
    }
}

/// A tool call dialect.
///
/// Implementations are stateless: the same text always produces the same
/// result, and a single instance may be shared across threads.
pub trait ToolCallExtractor: Send + Sync {
    /// Configuration name of this dialect
    fn name(&self) -> &'static str;

    /// Extract every tool call in `text`. Never fails; problems degrade to
    /// an empty or reduced result.
    fn extract_tool_calls(&self, text: &str) -> ExtractionResult;
}

/// Errors raised while selecting a parser
#[derive(Debug, thiserror::Error)]
pub enum ToolParserError {
    #[error("Invalid tool call parser: {name}. Valid parsers are: {}", .valid.join(", "))]
    UnknownParser { name: String, valid: Vec<String> },
}

/// Registered tool call dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserKind {
    /// `<tool_call>name\n<arg_key>..</arg_key><arg_value>..</arg_value></tool_call>`
    Glm4,
    /// `<tool_call>{"name": .., "arguments": {..}}</tool_call>`
    Qwen3,
}

impl ParserKind {
    pub const ALL: [ParserKind; 2] = [ParserKind::Qwen3, ParserKind::Glm4];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParserKind::Glm4 => "glm4",
            ParserKind::Qwen3 => "qwen3",
        }
    }

    pub fn build(&self) -> Box<dyn ToolCallExtractor> {
        match self {
            ParserKind::Glm4 => Box::new(Glm4ToolParser::new()),
            ParserKind::Qwen3 => Box::new(Qwen3ToolParser::new()),
        }
    }
}

impl fmt::Display for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParserKind {
    type Err = ToolParserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        ParserKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == trimmed)
            .ok_or_else(|| ToolParserError::UnknownParser {
                name: trimmed.to_string(),
                valid: list_parsers(),
            })
    }
}

/// Names accepted by [`create_parser`]
pub fn list_parsers() -> Vec<String> {
    ParserKind::ALL
        .iter()
        .map(|kind| kind.as_str().to_string())
        .collect()
}

/// Create the extractor registered under `name`
pub fn create_parser(name: &str) -> Result<Box<dyn ToolCallExtractor>, ToolParserError> {
    let kind = ParserKind::from_str(name)?;
    crate::log_debug!("Tool parser selected: {}", kind);
    Ok(kind.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extraction_result_invariant_holds() {
        let empty = ExtractionResult::from_calls(Vec::new());
        assert!(!empty.tools_called());
        assert_eq!(empty, ExtractionResult::none());

        let one = ExtractionResult::from_calls(vec![ToolCall::new("search", Map::new())]);
        assert!(one.tools_called());
        assert_eq!(one.tool_calls().len(), 1);
    }

    #[test]
    fn extraction_result_serializes_with_snake_case_fields() {
        let mut args = Map::new();
        args.insert("q".to_string(), json!("cats"));
        let result = ExtractionResult::from_calls(vec![ToolCall::new("search", args)]);
        let encoded = serde_json::to_value(&result).unwrap();
        assert_eq!(
            encoded,
            json!({"tools_called": true, "tool_calls": [{"name": "search", "arguments": {"q": "cats"}}]})
        );
    }

    #[test]
    fn create_parser_by_name() {
        assert_eq!(create_parser("glm4").unwrap().name(), "glm4");
        assert_eq!(create_parser(" qwen3 ").unwrap().name(), "qwen3");
    }

    #[test]
    fn create_parser_rejects_unknown_name() {
        let err = create_parser("hermes").err().expect("unknown parser");
        let msg = err.to_string();
        assert!(msg.contains("hermes"));
        assert!(msg.contains("qwen3"));
        assert!(msg.contains("glm4"));
    }

    #[test]
    fn parser_kind_deserializes_from_config_string() {
        let kind: ParserKind = serde_json::from_str(r#""glm4""#).unwrap();
        assert_eq!(kind, ParserKind::Glm4);
        assert_eq!(kind.to_string(), "glm4");
    }
}
