use anyhow::{bail, Context, Result};
use browse_rs::env::BrowseEnv;
use browse_rs::search::{BraveSearch, DEFAULT_MAX_RESULTS, DEFAULT_REGION};
use browse_rs::tools::{self, ExtractionResult, ToolCallExtractor};
use browse_rs::utils::config::{self, EnvConfig, EnvExtras};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "browse-rs")]
#[command(about = "Tool-call extraction and browsing episodes for agentic RL")]
#[command(version)]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, global = true, default_value_t = false)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract tool calls from model output
    Extract {
        /// Parser name (glm4 or qwen3)
        #[arg(long)]
        parser: String,

        /// Input file (default: stdin)
        #[arg(long)]
        input: Option<PathBuf>,

        /// One text per line, as a JSON string or an object with a `text` field
        #[arg(long, default_value_t = false)]
        jsonl: bool,
    },

    /// List registered tool call parsers
    Parsers,

    /// Run a Brave web search
    Search {
        keywords: String,

        #[arg(long, default_value_t = DEFAULT_MAX_RESULTS)]
        max_results: usize,

        #[arg(long, default_value = DEFAULT_REGION)]
        region: String,
    },

    /// Run one episode step on an action text
    Step {
        /// JSON file with the env config (`tool_call_parser`)
        #[arg(long)]
        config: PathBuf,

        /// JSON file with the sample extras (`reward_spec`, `max_turns`)
        #[arg(long)]
        extras: PathBuf,

        /// Action file (default: stdin)
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

fn read_input(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

fn line_text(line: &str) -> Result<String> {
    match serde_json::from_str::<Value>(line)? {
        Value::String(text) => Ok(text),
        Value::Object(mut obj) => match obj.remove("text") {
            Some(Value::String(text)) => Ok(text),
            _ => bail!("object line has no string `text` field"),
        },
        _ => bail!("line must be a JSON string or an object with a `text` field"),
    }
}

fn extract_lines(parser: &dyn ToolCallExtractor, input: &str) -> Result<Vec<ExtractionResult>> {
    let lines: Vec<(usize, &str)> = input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .collect();
    lines
        .par_iter()
        .map(|(idx, line)| {
            let text = line_text(line).with_context(|| format!("invalid input line {}", idx + 1))?;
            Ok(parser.extract_tool_calls(&text))
        })
        .collect()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            parser,
            input,
            jsonl,
        } => {
            let parser = tools::create_parser(&parser)?;
            let text = read_input(input.as_ref())?;
            if jsonl {
                let results = extract_lines(parser.as_ref(), &text)?;
                tracing::info!(
                    "Extracted {} line(s), {} with tool calls",
                    results.len(),
                    results.iter().filter(|r| r.tools_called()).count()
                );
                for result in &results {
                    println!("{}", to_json(result, cli.pretty)?);
                }
            } else {
                let result = parser.extract_tool_calls(&text);
                tools::helpers::log_tool_calls(parser.name(), result.tool_calls());
                println!("{}", to_json(&result, cli.pretty)?);
            }
        }
        Commands::Parsers => {
            for name in tools::list_parsers() {
                println!("{}", name);
            }
        }
        Commands::Search {
            keywords,
            max_results,
            region,
        } => {
            let results = BraveSearch::new(None).search(&keywords, Some(max_results), &region)?;
            println!("{}", to_json(&results, cli.pretty)?);
        }
        Commands::Step {
            config,
            extras,
            input,
        } => {
            let env_config: EnvConfig = config::load_json(&config)?;
            let extras: EnvExtras = config::load_json(&extras)?;
            let action = read_input(input.as_ref())?;
            let mut env = BrowseEnv::new(&env_config, extras)?;
            let output = env.step(&action);
            println!("{}", to_json(&output, cli.pretty)?);
        }
    }
    Ok(())
}
