//! Research assistant that can tell the time, search documents, calculate
//! and summarize.

use std::process::ExitCode;
use std::sync::Arc;

use agentflow::config::ServiceConfig;
use agentflow::connect::{builtin_tools, model_adapter};
use agentflow::kernel::{
    Agent, AgentResult, AgentRunner, DEFAULT_MAX_TOOL_ROUNDS, TracingCallSink,
};
use agentflow::primitives::AgentSpec;
use agentflow::repl::{Interrupt, Repl};
use agentflow::telemetry::init_tracing;
use agentflow::tools::builtin::{CALCULATE, CREATE_SUMMARY, GET_CURRENT_TIME, SEARCH_DOCUMENTS};
use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

const INSTRUCTIONS: &str = "You are a helpful research assistant with access to tools.

Available tools:
1. get_current_time: Get the current date and time
2. search_documents: Search the knowledge base for information
3. calculate: Perform mathematical calculations
4. create_summary: Summarize text content

Guidelines:
- Use search_documents when users ask about specific topics
- Use calculate for any math operations
- Always cite sources when using search results
- Be concise and accurate
";

const DEMO_QUERIES: [&str; 3] = [
    "What time is it?",
    "What is 15% of 250?",
    "Search for information about Azure AI services",
];

/// Chat with a tool-using research assistant.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Run the scripted queries instead of the interactive prompt.
    #[arg(long)]
    demo: bool,

    /// Tool rounds allowed before the assistant must answer.
    #[arg(long, default_value_t = DEFAULT_MAX_TOOL_ROUNDS)]
    max_tool_rounds: usize,
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

    let spec = AgentSpec::builder("ResearchAssistant")
        .instructions(INSTRUCTIONS)
        .tools([GET_CURRENT_TIME, SEARCH_DOCUMENTS, CALCULATE, CREATE_SUMMARY])
        .build()?;
    let agent = Agent::builder(spec, model_adapter(&config.openai)?)
        .tools(builtin_tools(&config)?)
        .max_tool_rounds(args.max_tool_rounds)
        .sink(Arc::new(TracingCallSink))
        .build()?;
    info!(
        agent = agent.spec().name(),
        tools = agent.spec().tools().len(),
        "created agent"
    );

    if args.demo {
        let interrupt = Interrupt::ctrl_c();
        for query in DEMO_QUERIES {
            println!("\n{}", "=".repeat(50));
            println!("Query: {query}");
            println!("{}", "=".repeat(50));
            tokio::select! {
                result = agent.run(query) => report(result, "Response"),
                () = interrupt.after(0) => {
                    println!("\nInterrupted.");
                    break;
                }
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    println!("\n{}", "=".repeat(50));
    println!("Research Assistant (with Tools)");
    println!("Available: time, search, calculate, summarize");
    println!("Type 'quit' to exit");
    println!("{}\n", "=".repeat(50));

    let mut repl = Repl::stdio("You: ");
    while let Some(input) = repl.next_request().await? {
        tokio::select! {
            result = agent.run(&input) => report(result, "\nAssistant"),
            () = repl.interrupted() => println!("\nInterrupted."),
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn report(result: AgentResult<String>, label: &str) {
    match result {
        Ok(response) => println!("{label}: {response}"),
        Err(err) => {
            error!(%err, "agent call failed");
            println!("An error occurred: {err}");
        }
    }
}
