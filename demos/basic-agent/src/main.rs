//! Interactive Azure assistant: one agent, no tools.

use std::process::ExitCode;
use std::sync::Arc;

use agentflow::config::ServiceConfig;
use agentflow::connect::model_adapter;
use agentflow::kernel::{Agent, AgentRunner, TracingCallSink};
use agentflow::primitives::AgentSpec;
use agentflow::repl::{Interrupt, Repl};
use agentflow::telemetry::init_tracing;
use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

const INSTRUCTIONS: &str = "You are a helpful AI assistant specialized in Azure services.

Guidelines:
1. Provide accurate, up-to-date information about Azure
2. Include code examples when appropriate
3. Recommend best practices for security and cost optimization
4. If unsure, acknowledge uncertainty rather than guessing
";

const DEMO_QUERIES: [&str; 2] = [
    "What is Azure AI Search and when should I use it?",
    "How do I keep API keys out of my application code on Azure?",
];

/// Chat with an Azure-savvy assistant.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Run scripted queries instead of the interactive prompt.
    #[arg(long)]
    demo: bool,

    /// Agent name shown in logs.
    #[arg(long, default_value = "AssistantBot")]
    name: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing()?;
    let args = Args::parse();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "configuration incomplete");
            eprintln!("{}", err.help());
            return Ok(ExitCode::FAILURE);
        }
    };

    let spec = AgentSpec::builder(args.name).instructions(INSTRUCTIONS).build()?;
    let agent = Agent::builder(spec, model_adapter(&config.openai)?)
        .sink(Arc::new(TracingCallSink))
        .build()?;
    info!(agent = agent.spec().name(), "created agent");

    if args.demo {
        let interrupt = Interrupt::ctrl_c();
        for query in DEMO_QUERIES {
            println!("\n{}", "=".repeat(50));
            println!("Query: {query}");
            println!("{}", "=".repeat(50));
            tokio::select! {
                () = ask(&agent, query) => {}
                () = interrupt.after(0) => {
                    println!("\nInterrupted.");
                    break;
                }
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    println!("\n{}", "=".repeat(50));
    println!("Azure AI Assistant");
    println!("Type 'quit' to exit");
    println!("{}\n", "=".repeat(50));

    let mut repl = Repl::stdio("You: ");
    while let Some(input) = repl.next_request().await? {
        info!(query = %preview(&input), "processing query");
        tokio::select! {
            () = ask(&agent, &input) => {}
            () = repl.interrupted() => println!("\nInterrupted."),
        }
    }
    println!("Goodbye!");
    Ok(ExitCode::SUCCESS)
}

async fn ask(agent: &Agent, input: &str) {
    match agent.run(input).await {
        Ok(response) => println!("\nAssistant: {response}\n"),
        Err(err) => {
            error!(%err, "agent call failed");
            println!("An error occurred: {err}");
        }
    }
}

fn preview(input: &str) -> String {
    let mut preview: String = input.chars().take(50).collect();
    if preview.len() < input.len() {
        preview.push_str("...");
    }
    preview
}
