// src/env/mod.rs
//! Multi-turn browsing episode.
//!
//! [`BrowseEnv`] takes one model response per [`BrowseEnv::step`], decides
//! whether the episode is over, scores it when it is, and otherwise runs the
//! tool calls found in the response against registered [`Capability`]s.

pub mod logger;
pub mod reward;

use crate::search::{BraveSearch, BRAVE_SEARCH_TOOL};
use crate::tools::{self, ToolCallExtractor, ToolParserError};
use crate::utils::config::{EnvConfig, EnvExtras};
use logger::EpisodeLogger;
use reward::GroundTruth;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

pub const TOOL_GROUP: &str = "BraveSearchToolGroup";
pub const ANSWER_START: &str = "<answer>";
pub const ANSWER_END: &str = "</answer>";

pub const NO_TOOL_CALL_ERROR: &str = "Error: No tool calls nor answer found in the response. You must either call a tool wrapped with <tool_call> and </tool_call> tags or provide an answer wrapped with <answer> and </answer> tags.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub content: String,
}

impl Message {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            name: None,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            name: None,
            content: content.into(),
        }
    }

    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            name: Some(name.into()),
            content: content.into(),
        }
    }
}

/// One dispatched tool call, reported in [`StepOutput::metadata`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_group: String,
    pub tool_name: String,
    pub tool_input: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    pub observations: Vec<Message>,
    pub reward: f64,
    pub done: bool,
    pub metadata: Vec<ToolInvocation>,
}

impl StepOutput {
    fn finished(reward: f64, done: bool, observations: Vec<Message>) -> Self {
        Self {
            observations,
            reward,
            done,
            metadata: Vec::new(),
        }
    }
}

/// A named tool the model may call with keyword arguments.
pub trait Capability: Send + Sync {
    /// OpenAI-style function definition advertised to the model
    fn function_spec(&self) -> Value;

    /// Run the capability; the result is JSON-encoded into the observation.
    fn call(&self, arguments: &Map<String, Value>) -> anyhow::Result<Value>;
}

/// Capabilities by name, in registration order
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    entries: Vec<(String, Arc<dyn Capability>)>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `capability` under `name`, replacing any earlier entry
    pub fn register(&mut self, name: impl Into<String>, capability: Arc<dyn Capability>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = capability,
            None => self.entries.push((name, capability)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, capability: Arc<dyn Capability>) -> Self {
        self.register(name, capability);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Capability>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, capability)| capability)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn function_specs(&self) -> Vec<Value> {
        self.entries
            .iter()
            .map(|(_, capability)| capability.function_spec())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error(transparent)]
    Parser(#[from] ToolParserError),
}

pub struct BrowseEnv {
    parser: Arc<dyn ToolCallExtractor>,
    capabilities: CapabilityRegistry,
    ground_truth: GroundTruth,
    max_turns: usize,
    turns: usize,
    chat_history: Vec<Message>,
    logger: Option<Arc<EpisodeLogger>>,
}

impl BrowseEnv {
    /// Episode with the default `brave_search` capability
    pub fn new(env_config: &EnvConfig, extras: EnvExtras) -> Result<Self, EnvError> {
        let capabilities = CapabilityRegistry::new()
            .with(BRAVE_SEARCH_TOOL, Arc::new(BraveSearch::new(None)));
        Self::with_capabilities(env_config, extras, capabilities)
    }

    pub fn with_capabilities(
        env_config: &EnvConfig,
        extras: EnvExtras,
        capabilities: CapabilityRegistry,
    ) -> Result<Self, EnvError> {
        let parser: Arc<dyn ToolCallExtractor> =
            tools::create_parser(&env_config.tool_call_parser)?.into();
        crate::log_debug!(
            "BrowseEnv using parser {} with tools {:?}",
            parser.name(),
            capabilities.names()
        );
        Ok(Self {
            parser,
            capabilities,
            ground_truth: extras.reward_spec.ground_truth,
            max_turns: extras.max_turns,
            turns: 0,
            chat_history: Vec::new(),
            logger: EpisodeLogger::new(),
        })
    }

    pub fn turns(&self) -> usize {
        self.turns
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn chat_history(&self) -> &[Message] {
        &self.chat_history
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    pub fn parser_name(&self) -> &'static str {
        self.parser.name()
    }

    fn is_done(&self, action: &str) -> bool {
        self.turns >= self.max_turns || (action.contains(ANSWER_START) && action.contains(ANSWER_END))
    }

    fn reward(&self, done: bool) -> f64 {
        if !done {
            return 0.0;
        }
        let transcript: String = self
            .chat_history
            .iter()
            .map(|message| message.content.as_str())
            .collect();
        reward::compute_score(&transcript, &self.ground_truth)
    }

    fn run_tool(&self, name: &str, arguments: &Map<String, Value>) -> String {
        let Some(capability) = self.capabilities.get(name) else {
            return format!(
                "Error: Unknown tool call: {}. The only supported tools are: {:?}",
                name,
                self.capabilities.names()
            );
        };
        match capability
            .call(arguments)
            .and_then(|value| Ok(serde_json::to_string(&value)?))
        {
            Ok(observation) => observation,
            Err(e) => {
                crate::log_warn!("Tool {} failed: {}", name, e);
                e.to_string()
            }
        }
    }

    /// Advance the episode by one model response
    pub fn step(&mut self, action: &str) -> StepOutput {
        self.turns += 1;
        self.chat_history.push(Message::assistant(action));
        if let Some(logger) = &self.logger {
            logger.log_action(self.turns, action);
        }

        let done = self.is_done(action);
        let reward = self.reward(done);
        if done {
            crate::log_info!("Episode finished after {} turn(s), reward {}", self.turns, reward);
            if let Some(logger) = &self.logger {
                logger.log_reward(reward, done);
            }
            return StepOutput::finished(reward, done, Vec::new());
        }

        let result = self.parser.extract_tool_calls(action);
        if !result.tools_called() {
            let observation = Message::user(NO_TOOL_CALL_ERROR);
            if let Some(logger) = &self.logger {
                logger.log_observation(&observation);
            }
            return StepOutput::finished(reward, done, vec![observation]);
        }

        let calls = result.into_tool_calls();
        tools::helpers::log_tool_calls(self.parser.name(), &calls);
        if let Some(logger) = &self.logger {
            logger.log_tool_calls(self.parser.name(), &calls);
        }

        let mut observations = Vec::with_capacity(calls.len());
        let mut metadata = Vec::with_capacity(calls.len());
        for call in calls {
            let content = self.run_tool(&call.name, &call.arguments);
            let message = Message::tool(call.name.clone(), content);
            if let Some(logger) = &self.logger {
                logger.log_observation(&message);
            }
            self.chat_history.push(message.clone());
            observations.push(message);
            metadata.push(ToolInvocation {
                tool_group: TOOL_GROUP.to_string(),
                tool_name: call.name,
                tool_input: call.arguments,
            });
        }

        StepOutput {
            observations,
            reward,
            done,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::reward::GroundTruth;
    use crate::utils::config::RewardSpec;
    use anyhow::bail;
    use serde_json::json;

    struct Echo;

    impl Capability for Echo {
        fn function_spec(&self) -> Value {
            tools::schema::function_spec(
                "echo",
                "Echo the arguments back",
                tools::schema::SchemaBuilder::object().build(),
            )
        }

        fn call(&self, arguments: &Map<String, Value>) -> anyhow::Result<Value> {
            if arguments.contains_key("fail") {
                bail!("echo() got an unexpected keyword argument 'fail'");
            }
            Ok(Value::Object(arguments.clone()))
        }
    }

    fn extras(max_turns: usize) -> EnvExtras {
        EnvExtras {
            reward_spec: RewardSpec {
                ground_truth: GroundTruth::new(vec!["Paris".to_string()]),
            },
            max_turns,
        }
    }

    fn env(parser: &str, max_turns: usize) -> BrowseEnv {
        let config = EnvConfig {
            tool_call_parser: parser.to_string(),
        };
        let capabilities = CapabilityRegistry::new().with("echo", Arc::new(Echo));
        BrowseEnv::with_capabilities(&config, extras(max_turns), capabilities).unwrap()
    }

    #[test]
    fn rejects_unknown_parser() {
        let config = EnvConfig {
            tool_call_parser: "hermes".to_string(),
        };
        let err = BrowseEnv::with_capabilities(&config, extras(2), CapabilityRegistry::new())
            .err()
            .expect("unknown parser must fail");
        assert!(err.to_string().starts_with("Invalid tool call parser: hermes."));
    }

    #[test]
    fn default_env_registers_brave_search() {
        let config = EnvConfig {
            tool_call_parser: "qwen3".to_string(),
        };
        let env = BrowseEnv::new(&config, extras(2)).unwrap();
        assert_eq!(env.capabilities().names(), vec![BRAVE_SEARCH_TOOL]);
        assert_eq!(env.parser_name(), "qwen3");
        assert_eq!(env.max_turns(), 2);
    }

    #[test]
    fn answer_ends_episode_with_reward() {
        let mut env = env("qwen3", 5);
        let out = env.step("Thinking... <answer>paris</answer>");
        assert!(out.done);
        assert_eq!(out.reward, 1.0);
        assert!(out.observations.is_empty());
        assert!(out.metadata.is_empty());
        assert_eq!(env.turns(), 1);
    }

    #[test]
    fn turn_budget_ends_episode() {
        let mut env = env("qwen3", 1);
        let out = env.step("no answer, no calls");
        assert!(out.done);
        assert_eq!(out.reward, 0.0);
        assert!(out.observations.is_empty());
    }

    #[test]
    fn missing_tool_call_gets_user_error() {
        let mut env = env("qwen3", 3);
        let out = env.step("I will think more.");
        assert!(!out.done);
        assert_eq!(out.reward, 0.0);
        assert_eq!(out.observations, vec![Message::user(NO_TOOL_CALL_ERROR)]);
        assert_eq!(env.chat_history().len(), 1);
    }

    #[test]
    fn dispatches_tool_calls_in_order() {
        let mut env = env("qwen3", 3);
        let action = concat!(
            "<tool_call>{\"name\": \"echo\", \"arguments\": {\"q\": \"a\"}}</tool_call>",
            "<tool_call>{\"name\": \"lookup\", \"arguments\": {\"q\": \"b\"}}</tool_call>",
            "<tool_call>{\"name\": \"echo\", \"arguments\": {\"fail\": true}}</tool_call>",
        );
        let out = env.step(action);
        assert!(!out.done);
        assert_eq!(out.observations.len(), 3);

        assert_eq!(out.observations[0], Message::tool("echo", r#"{"q":"a"}"#));
        assert_eq!(
            out.observations[1].content,
            r#"Error: Unknown tool call: lookup. The only supported tools are: ["echo"]"#
        );
        assert_eq!(out.observations[1].name.as_deref(), Some("lookup"));
        assert_eq!(
            out.observations[2].content,
            "echo() got an unexpected keyword argument 'fail'"
        );

        assert_eq!(out.metadata[1].tool_group, TOOL_GROUP);
        assert_eq!(out.metadata[1].tool_name, "lookup");
        assert_eq!(out.metadata[1].tool_input.get("q"), Some(&json!("b")));
        assert_eq!(env.chat_history().len(), 4);
    }

    #[test]
    fn reward_scans_whole_transcript() {
        let mut env = env("glm4", 2);
        let first = env.step("The answer is <answer>Paris");
        assert!(!first.done);
        assert_eq!(first.observations[0].role, "user");

        // the closing tag alone does not end the episode, the turn budget does
        let last = env.step("</answer>");
        assert!(last.done);
        assert_eq!(last.reward, 1.0);
    }

    #[test]
    fn glm4_calls_are_dispatched() {
        let mut env = env("glm4", 2);
        let out = env.step("<tool_call>echo\n<arg_key>n</arg_key>\n<arg_value>3</arg_value>\n</tool_call>");
        assert_eq!(out.observations, vec![Message::tool("echo", r#"{"n":3}"#)]);
        assert_eq!(out.metadata[0].tool_input.get("n"), Some(&json!(3)));
    }

    #[test]
    fn registry_replaces_and_orders() {
        let mut registry = CapabilityRegistry::new();
        registry.register("b", Arc::new(Echo));
        registry.register("a", Arc::new(Echo));
        registry.register("b", Arc::new(Echo));
        assert_eq!(registry.names(), vec!["b", "a"]);
        assert!(registry.get("c").is_none());
        assert_eq!(registry.function_specs().len(), 2);
        assert_eq!(format!("{:?}", registry), r#"CapabilityRegistry { names: ["b", "a"] }"#);
    }

    #[test]
    fn message_serialization_skips_missing_name() {
        assert_eq!(
            serde_json::to_value(Message::user("hi")).unwrap(),
            json!({"role": "user", "content": "hi"})
        );
        assert_eq!(
            serde_json::to_value(Message::tool("echo", "{}")).unwrap(),
            json!({"role": "tool", "name": "echo", "content": "{}"})
        );
    }
}
