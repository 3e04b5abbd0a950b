//! Planner, researcher, writer and reviewer collaborating on one request.

use std::future::Future;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use agentflow::adapters::ModelAdapter;
use agentflow::config::ServiceConfig;
use agentflow::connect::model_adapter;
use agentflow::kernel::{Agent, AgentResult, AgentRunner};
use agentflow::primitives::AgentSpec;
use agentflow::repl::{Interrupt, Repl};
use agentflow::telemetry::init_tracing;
use agentflow::workflow::pipeline::{DRAFT, FINAL_OUTPUT, PLAN, RESEARCH};
use agentflow::workflow::{
    SequentialWorkflow, TracingObserver, WorkflowError, WorkflowEvent, research_pipeline,
};
use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::error;

const DEMO_REQUEST: &str = "Create a guide for deploying an Azure AI agent to production.
Include security best practices and monitoring recommendations.";

/// Run a request through the plan, research, draft and review agents.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Run the scripted request instead of the interactive prompt.
    #[arg(long)]
    demo: bool,
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

    let adapter = model_adapter(&config.openai)?;
    let workflow = research_pipeline(|spec| agent(spec, &adapter))?
        .observer(Arc::new(TracingObserver))
        .observer(Arc::new(print_stage))
        .build()?;

    if args.demo {
        println!("{}", "=".repeat(60));
        println!("MULTI-AGENT WORKFLOW DEMO");
        println!("{}", "=".repeat(60));
        println!("\nRequest: {DEMO_REQUEST}\n");

        run(&workflow, DEMO_REQUEST, Interrupt::ctrl_c().after(0)).await;

        println!("\n{}", "=".repeat(60));
        println!("WORKFLOW COMPLETE");
        println!("{}", "=".repeat(60));
        return Ok(ExitCode::SUCCESS);
    }

    println!("\n{}", "=".repeat(60));
    println!("MULTI-AGENT WORKFLOW");
    println!("Enter a complex task and watch the agents collaborate");
    println!("Type 'quit' to exit");
    println!("{}\n", "=".repeat(60));

    let mut repl = Repl::stdio("Your request: ");
    session(&workflow, &mut repl).await?;
    Ok(ExitCode::SUCCESS)
}

/// Serves requests until the session ends and returns how many completed.
///
/// An interrupt during a run cancels that run only.
async fn session<R, W>(workflow: &SequentialWorkflow, repl: &mut Repl<R, W>) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut completed = 0;
    while let Some(request) = repl.next_request().await? {
        match run(workflow, &request, repl.interrupted()).await {
            RunOutcome::Completed => completed += 1,
            RunOutcome::Interrupted => repl.clear_interrupt(),
            RunOutcome::Failed => {}
        }
    }
    Ok(completed)
}

fn agent(spec: AgentSpec, adapter: &Arc<dyn ModelAdapter>) -> AgentResult<Arc<dyn AgentRunner>> {
    let agent = Agent::builder(spec, Arc::clone(adapter)).build()?;
    Ok(Arc::new(agent))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunOutcome {
    Completed,
    Interrupted,
    Failed,
}

/// Runs one request; `interrupted` abandons the in-flight stage.
async fn run<C>(workflow: &SequentialWorkflow, request: &str, interrupted: C) -> RunOutcome
where
    C: Future<Output = ()>,
{
    match workflow.run_until(request, interrupted).await {
        Ok(_) => RunOutcome::Completed,
        Err(WorkflowError::Cancelled { stage }) => {
            println!("\nWorkflow interrupted during {stage}.");
            RunOutcome::Interrupted
        }
        Err(err) => {
            error!(%err, "workflow failed");
            println!("\nWorkflow failed: {err}\n");
            RunOutcome::Failed
        }
    }
}

fn print_stage(event: &WorkflowEvent) {
    if let WorkflowEvent::StageCompleted { stage, output, .. } = event {
        let heading = match stage.as_str() {
            PLAN => "📋 PLAN",
            RESEARCH => "🔍 RESEARCH",
            DRAFT => "✏️ DRAFT",
            FINAL_OUTPUT => "✅ FINAL",
            other => other,
        };
        println!("\n{heading}:\n{output}\n");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use agentflow::kernel::{AgentError, agent_fn};

    use super::*;

    /// Pipeline whose agents echo their prompt, stalling on prompts that
    /// mention `STALL`.
    fn stalling_pipeline(calls: &Arc<AtomicUsize>) -> SequentialWorkflow {
        research_pipeline(|spec| {
            let calls = Arc::clone(calls);
            let agent = agent_fn(spec, move |input: String| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if input.contains("STALL") {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    }
                    Ok::<_, AgentError>(format!("ok: {}", input.len()))
                }
            });
            Ok(Arc::new(agent) as Arc<dyn AgentRunner>)
        })
        .unwrap()
        .build()
        .unwrap()
    }

    #[tokio::test]
    async fn interrupt_cancels_the_run_and_the_session_continues() {
        let calls = Arc::new(AtomicUsize::new(0));
        let workflow = stalling_pipeline(&calls);
        let (trigger, interrupt) = Interrupt::manual();
        let mut repl = Repl::new(
            &b"STALL on this one\nthen this\n"[..],
            Vec::new(),
            "Your request: ",
            interrupt,
        );

        let pressed = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
        };
        let (completed, ()) = tokio::join!(session(&workflow, &mut repl), pressed);

        assert_eq!(completed.unwrap(), 1);
        // One planner call for the cancelled run, four stages for the second.
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        let prompted = String::from_utf8(repl.into_writer()).unwrap();
        assert_eq!(prompted.matches("Your request: ").count(), 3);
    }

    #[tokio::test]
    async fn failed_run_keeps_the_session() {
        let workflow = research_pipeline(|spec| {
            let agent = agent_fn(spec, |_input: String| async move {
                Err::<String, _>(AgentError::failed("model unavailable"))
            });
            Ok(Arc::new(agent) as Arc<dyn AgentRunner>)
        })
        .unwrap()
        .build()
        .unwrap();
        let (_trigger, interrupt) = Interrupt::manual();
        let mut repl = Repl::new(&b"first\nsecond\nquit\n"[..], Vec::new(), "> ", interrupt);

        assert_eq!(session(&workflow, &mut repl).await.unwrap(), 0);
        let prompted = String::from_utf8(repl.into_writer()).unwrap();
        assert_eq!(prompted.matches("> ").count(), 3);
    }
}
