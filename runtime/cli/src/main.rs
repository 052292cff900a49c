//! ibkr-relay: call IBKR terminal operations through the relay queues
//!
//! `list` prints the operation catalog. `call` validates arguments, sends
//! one request and prints the result JSON on stdout; failures go to stderr
//! with their kind and a non-zero exit code.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ibkr_relay_catalog::{build_request, Operation, RelayClient};
use ibkr_relay_core::CallError;
use ibkr_relay_fabric::config::{self, RelayConfig};
use ibkr_relay_fabric::transport::SqsQueue;
use ibkr_relay_fabric::Dispatcher;
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ibkr-relay", version)]
#[command(about = "Call IBKR terminal operations through the relay queues")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the operation catalog as JSON
    List,
    /// Invoke one operation and print its result
    Call(CallArgs),
}

#[derive(clap::Args, Debug)]
struct CallArgs {
    /// Tool name, e.g. ibkr_health
    tool: String,

    /// Arguments as a JSON object
    #[arg(long = "args", value_name = "JSON")]
    arguments: Option<String>,

    /// Override the operation's default timeout
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    #[arg(long, env = config::REQUEST_QUEUE_VAR)]
    request_queue: Option<String>,

    #[arg(long, env = config::RESPONSE_QUEUE_VAR)]
    response_queue: Option<String>,

    #[arg(long, env = config::REGION_VAR)]
    region: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::List => {
            println!("{}", serde_json::to_string_pretty(&catalog())?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Call(args) => call(args).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn call(args: CallArgs) -> Result<ExitCode> {
    let arguments: Value = match &args.arguments {
        Some(raw) => serde_json::from_str(raw).context("--args is not valid JSON")?,
        None => Value::Null,
    };

    // Validate before any queue client exists
    let request = match build_request(&args.tool, &arguments) {
        Ok(request) => request,
        Err(e) => return Ok(report(&e)),
    };

    let config = relay_config(&args).context("Invalid relay configuration")?;
    info!(
        requests = %config.request_queue,
        responses = %config.response_queue,
        region = %config.region,
        "Connecting to relay queues"
    );
    let queue = SqsQueue::connect(&config).await;

    let mut client = RelayClient::new(Dispatcher::from_config(Arc::new(queue), &config));
    if let Some(secs) = args.timeout_secs {
        client = client.with_timeout(Duration::from_secs(secs));
    }

    match client.execute(request).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(report(&e)),
    }
}

/// Command-line values win over the environment they default from
fn relay_config(args: &CallArgs) -> Result<RelayConfig, ibkr_relay_fabric::ConfigError> {
    RelayConfig::from_lookup(|name| match name {
        config::REQUEST_QUEUE_VAR => args.request_queue.clone(),
        config::RESPONSE_QUEUE_VAR => args.response_queue.clone(),
        config::REGION_VAR => args.region.clone(),
        _ => std::env::var(name).ok(),
    })
}

fn report(error: &CallError) -> ExitCode {
    eprintln!("error[{}]: {error}", error.kind());
    ExitCode::from(exit_status(error))
}

/// 2 for requests rejected locally, 1 for everything that reached the queue
fn exit_status(error: &CallError) -> u8 {
    if error.is_local() {
        2
    } else {
        1
    }
}

#[derive(Debug, Serialize)]
struct ToolListing {
    name: &'static str,
    wire_name: &'static str,
    description: &'static str,
    default_timeout_secs: u64,
    parameters: Vec<ParameterListing>,
}

#[derive(Debug, Serialize)]
struct ParameterListing {
    name: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    required: bool,
    description: &'static str,
}

fn catalog() -> Vec<ToolListing> {
    Operation::ALL
        .into_iter()
        .map(|op| ToolListing {
            name: op.tool_name(),
            wire_name: op.wire_name(),
            description: op.description(),
            default_timeout_secs: op.default_timeout().as_secs(),
            parameters: op
                .parameters()
                .iter()
                .map(|p| ParameterListing {
                    name: p.name,
                    kind: p.kind,
                    required: p.required,
                    description: p.description,
                })
                .collect(),
        })
        .collect()
}
