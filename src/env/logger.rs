// src/env/logger.rs
//! Episode transcript logger.
//! Enable by setting environment variable BROWSE_RS_EPISODE_LOGGER=true
//!
//! Each episode writes its actions, parsed tool calls, observations and
//! reward to its own file under `log/`.

use super::Message;
use crate::tools::ToolCall;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const EPISODE_LOGGER_ENV: &str = "BROWSE_RS_EPISODE_LOGGER";

static EPISODE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Check if episode logging is enabled via environment variable
pub fn is_logging_enabled() -> bool {
    std::env::var(EPISODE_LOGGER_ENV)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}

/// Appends a readable transcript of one episode to a file in the "log" folder.
pub struct EpisodeLogger {
    file_path: String,
}

impl EpisodeLogger {
    /// Create a new logger. Returns None if logging is disabled.
    pub fn new() -> Option<Arc<Self>> {
        if !is_logging_enabled() {
            return None;
        }
        Some(Arc::new(Self::in_dir("log")))
    }

    fn in_dir(dir: &str) -> Self {
        let log_dir = Path::new(dir);
        if !log_dir.exists() {
            let _ = fs::create_dir_all(log_dir);
        }

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        // episodes created in the same millisecond still get distinct files
        let seq = EPISODE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let file_path = format!(
            "{}/episode_{}_{:03}_{}.log",
            dir,
            now.as_secs(),
            now.subsec_millis(),
            seq
        );

        crate::log_info!("Episode logging enabled, writing to: {}", file_path);
        Self { file_path }
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    fn write(&self, content: &str) {
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
        {
            let _ = file.write_all(content.as_bytes());
        }
    }

    pub fn log_action(&self, turn: usize, action: &str) {
        let content = format!("=== TURN {} ACTION ===\n{}\n\n", turn, action);
        self.write(&content);
    }

    /// Log parsed tool calls with a label
    pub fn log_tool_calls(&self, label: &str, tool_calls: &[ToolCall]) {
        if tool_calls.is_empty() {
            return;
        }
        if let Ok(json) = serde_json::to_string_pretty(tool_calls) {
            let content = format!(
                "=== {} TOOL CALLS ({}) ===\n{}\n\n",
                label.to_uppercase(),
                tool_calls.len(),
                json
            );
            self.write(&content);
        }
    }

    pub fn log_observation(&self, message: &Message) {
        let header = match &message.name {
            Some(name) => format!("{} ({})", message.role.to_uppercase(), name),
            None => message.role.to_uppercase(),
        };
        let content = format!("=== {} OBSERVATION ===\n{}\n\n", header, message.content);
        self.write(&content);
    }

    pub fn log_reward(&self, reward: f64, done: bool) {
        let content = format!("=== REWARD {} (done={}) ===\n\n", reward, done);
        self.write(&content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_transcript_sections() {
        let dir = std::env::temp_dir().join(format!("browse-rs-logger-{}", std::process::id()));
        let dir = dir.to_string_lossy().to_string();
        let logger = EpisodeLogger::in_dir(&dir);

        logger.log_action(1, "<tool_call>search\n</tool_call>");
        logger.log_tool_calls("valid", &[ToolCall::new("search", Default::default())]);
        logger.log_tool_calls("empty", &[]);
        logger.log_observation(&Message::tool("search", "[]"));
        logger.log_reward(0.0, false);

        let written = fs::read_to_string(logger.file_path()).unwrap();
        assert!(written.contains("=== TURN 1 ACTION ==="));
        assert!(written.contains("=== VALID TOOL CALLS (1) ==="));
        assert!(!written.contains("EMPTY"));
        assert!(written.contains("=== TOOL (search) OBSERVATION ==="));
        assert!(written.contains("=== REWARD 0 (done=false) ==="));
        let _ = fs::remove_dir_all(&dir);
    }
}
