// src/tools/helpers.rs
//! Helper functions for reporting extracted tool calls.

use super::ToolCall;

const MAX_ARGS_CHARS: usize = 160;

/// Format tool calls for logging - returns a summary string
pub fn format_tool_calls_summary(tool_calls: &[ToolCall]) -> String {
    if tool_calls.is_empty() {
        return String::new();
    }
    tool_calls
        .iter()
        .map(|call| {
            let args = serde_json::to_string(&call.arguments)
                .unwrap_or_default()
                .replace('\n', " ");
            let truncated = if args.chars().count() > MAX_ARGS_CHARS {
                let snippet: String = args.chars().take(MAX_ARGS_CHARS).collect();
                format!("{}...", snippet)
            } else {
                args
            };
            format!("{}(args={})", call.name, truncated)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Log tool calls with a label (uses crate logging)
pub fn log_tool_calls(label: &str, tool_calls: &[ToolCall]) {
    if tool_calls.is_empty() {
        return;
    }
    let summary = format_tool_calls_summary(tool_calls);
    crate::log_info!("{} tool call(s): {}", label, summary);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn test_summary_lists_calls() {
        let mut args = Map::new();
        args.insert("keywords".to_string(), json!("rust"));
        let calls = vec![
            ToolCall::new("brave_search", args),
            ToolCall::new("noop", Map::new()),
        ];
        assert_eq!(
            format_tool_calls_summary(&calls),
            r#"brave_search(args={"keywords":"rust"}), noop(args={})"#
        );
        assert_eq!(format_tool_calls_summary(&[]), "");
    }

    #[test]
    fn test_summary_truncates_long_arguments() {
        let mut args = Map::new();
        args.insert("text".to_string(), json!("x".repeat(500)));
        let summary = format_tool_calls_summary(&[ToolCall::new("t", args)]);
        assert!(summary.ends_with("...)"));
        assert!(summary.len() < 200);
    }
}
