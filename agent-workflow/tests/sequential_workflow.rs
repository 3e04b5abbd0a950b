use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use agent_kernel::{AdmissionLimit, AgentError, AgentResult, AgentRunner, agent_fn};
use agent_primitives::AgentSpec;
use agent_workflow::pipeline::{DRAFT, FINAL_OUTPUT, PLAN, RESEARCH};
use agent_workflow::{
    CollectingObserver, PromptBuilder, SequentialWorkflow, Stage, StageError, WorkflowError,
    WorkflowEvent, research_pipeline,
};
use tokio::sync::oneshot;

fn spec(name: &str) -> AgentSpec {
    AgentSpec::builder(name)
        .instructions("test persona")
        .build()
        .unwrap()
}

/// Stub agent that prefixes its answer and counts calls.
fn prefixing(name: &str, prefix: &'static str, calls: Arc<AtomicUsize>) -> Arc<dyn AgentRunner> {
    Arc::new(agent_fn(spec(name), move |input: String| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AgentError>(format!("{prefix}{input}"))
        }
    }))
}

fn failing(name: &str, calls: Arc<AtomicUsize>) -> Arc<dyn AgentRunner> {
    Arc::new(agent_fn(spec(name), move |_input: String| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>(AgentError::failed("model unavailable"))
        }
    }))
}

fn field(name: &str) -> PromptBuilder {
    let name = name.to_owned();
    PromptBuilder::custom(move |ctx| ctx.output(&name).unwrap_or_default().to_owned())
}

struct Counters([Arc<AtomicUsize>; 4]);

impl Counters {
    fn new() -> Self {
        Self(std::array::from_fn(|_| Arc::new(AtomicUsize::new(0))))
    }

    fn get(&self, index: usize) -> Arc<AtomicUsize> {
        Arc::clone(&self.0[index])
    }

    fn snapshot(&self) -> [usize; 4] {
        std::array::from_fn(|index| self.0[index].load(Ordering::SeqCst))
    }
}

fn stub_pipeline(counters: &Counters, fail_research: bool) -> SequentialWorkflow {
    let planner = Arc::new(agent_fn(spec("Planner"), {
        let calls = counters.get(0);
        move |_input: String| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AgentError>("PLAN".to_owned())
            }
        }
    }));
    let researcher = if fail_research {
        failing("Researcher", counters.get(1))
    } else {
        prefixing("Researcher", "RESEARCH:", counters.get(1))
    };

    SequentialWorkflow::builder("stub")
        .stage(Stage::new(
            PLAN,
            planner,
            PromptBuilder::template("Create a plan for: {{request}}").unwrap(),
        ))
        .stage(Stage::new(RESEARCH, researcher, field(PLAN)))
        .stage(Stage::new(
            DRAFT,
            prefixing("Writer", "DRAFT:", counters.get(2)),
            field(RESEARCH),
        ))
        .stage(Stage::new(
            FINAL_OUTPUT,
            prefixing("Reviewer", "FINAL:", counters.get(3)),
            field(DRAFT),
        ))
        .build()
        .unwrap()
}

#[tokio::test]
async fn threads_outputs_through_every_stage() {
    let counters = Counters::new();
    let workflow = stub_pipeline(&counters, false);

    let ctx = workflow.run_context("X").await.unwrap();

    assert_eq!(ctx.request(), "X");
    assert_eq!(ctx.output(PLAN), Some("PLAN"));
    assert_eq!(ctx.output(RESEARCH), Some("RESEARCH:PLAN"));
    assert_eq!(ctx.output(DRAFT), Some("DRAFT:RESEARCH:PLAN"));
    assert_eq!(ctx.output(FINAL_OUTPUT), Some("FINAL:DRAFT:RESEARCH:PLAN"));
    assert_eq!(counters.snapshot(), [1, 1, 1, 1]);

    assert_eq!(workflow.run("X").await.unwrap(), "FINAL:DRAFT:RESEARCH:PLAN");
}

#[tokio::test]
async fn failing_stage_stops_the_run() {
    let counters = Counters::new();
    let workflow = stub_pipeline(&counters, true);

    let err = workflow.run("X").await.expect_err("research fails");

    match err {
        WorkflowError::StageFailed {
            stage,
            index,
            source,
        } => {
            assert_eq!(stage, RESEARCH);
            assert_eq!(index, 1);
            assert!(matches!(source, StageError::Agent(AgentError::Failed { .. })));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(counters.snapshot(), [1, 1, 0, 0]);
}

#[tokio::test]
async fn observers_see_each_stage_in_order() {
    let counters = Counters::new();
    let observer = CollectingObserver::new();
    let stages = stub_pipeline(&counters, false).stages().to_vec();
    let workflow = stages
        .into_iter()
        .fold(SequentialWorkflow::builder("observed"), |builder, stage| {
            builder.stage(stage)
        })
        .observer(observer.clone())
        .build()
        .unwrap();

    workflow.run("X").await.unwrap();

    let events = observer.drain();
    assert!(matches!(events.first(), Some(WorkflowEvent::RunStarted { request, .. }) if request == "X"));
    assert!(matches!(events.last(), Some(WorkflowEvent::RunCompleted { .. })));

    let completed: Vec<(String, String)> = events
        .iter()
        .filter_map(|event| match event {
            WorkflowEvent::StageCompleted { stage, output, .. } => {
                Some((stage.clone(), output.clone()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        completed,
        [
            (PLAN.to_owned(), "PLAN".to_owned()),
            (RESEARCH.to_owned(), "RESEARCH:PLAN".to_owned()),
            (DRAFT.to_owned(), "DRAFT:RESEARCH:PLAN".to_owned()),
            (FINAL_OUTPUT.to_owned(), "FINAL:DRAFT:RESEARCH:PLAN".to_owned()),
        ]
    );

    let run_id = events[0].run_id();
    assert!(events.iter().all(|event| event.run_id() == run_id));
}

#[tokio::test]
async fn failure_is_reported_to_observers() {
    let counters = Counters::new();
    let observer = CollectingObserver::new();
    let calls = counters.get(0);
    let workflow = SequentialWorkflow::builder("failing")
        .stage(Stage::new(
            PLAN,
            failing("Planner", calls),
            PromptBuilder::template("{{request}}").unwrap(),
        ))
        .observer(observer.clone())
        .build()
        .unwrap();

    assert!(workflow.run("X").await.is_err());

    let events = observer.drain();
    assert!(matches!(
        events.last(),
        Some(WorkflowEvent::StageFailed { stage, index: 0, error, .. })
            if stage == PLAN && error.contains("model unavailable")
    ));
    assert!(!events
        .iter()
        .any(|event| matches!(event, WorkflowEvent::RunCompleted { .. })));
}

#[tokio::test]
async fn cancellation_drops_the_inflight_stage() {
    let later_calls = Arc::new(AtomicUsize::new(0));
    let slow = Arc::new(agent_fn(spec("Slow"), |_input: String| async move {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok::<_, AgentError>("too late".to_owned())
    }));
    let workflow = SequentialWorkflow::builder("cancellable")
        .stage(Stage::new(
            PLAN,
            slow,
            PromptBuilder::template("{{request}}").unwrap(),
        ))
        .stage(Stage::new(
            RESEARCH,
            prefixing("Researcher", "R:", Arc::clone(&later_calls)),
            field(PLAN),
        ))
        .build()
        .unwrap();

    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let run = workflow.run_until("X", async move {
        let _ = cancel_rx.await;
    });
    let trigger = async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = cancel_tx.send(());
    };

    let (result, ()) = tokio::join!(run, trigger);

    assert!(matches!(result, Err(WorkflowError::Cancelled { ref stage }) if stage == PLAN));
    assert_eq!(later_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_runs_keep_separate_contexts() {
    let echo = Arc::new(agent_fn(spec("Echo"), |input: String| async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok::<_, AgentError>(input)
    }));
    let workflow = Arc::new(
        SequentialWorkflow::builder("echo")
            .stage(Stage::new(
                PLAN,
                echo.clone(),
                PromptBuilder::template("{{request}}").unwrap(),
            ))
            .stage(Stage::new(
                RESEARCH,
                echo,
                PromptBuilder::template("{{plan}}/{{request}}").unwrap(),
            ))
            .build()
            .unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let workflow = Arc::clone(&workflow);
            tokio::spawn(async move { workflow.run(&i.to_string()).await })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap().unwrap(), format!("{i}/{i}"));
    }
}

#[tokio::test]
async fn admission_limit_wraps_stage_agents() {
    let limit = AdmissionLimit::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let workflow = research_pipeline(|spec| -> AgentResult<Arc<dyn AgentRunner>> {
        let calls = Arc::clone(&calls);
        let agent = Arc::new(agent_fn(spec, move |input: String| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AgentError>(input.len().to_string())
            }
        }));
        Ok(limit.wrap(agent))
    })
    .unwrap()
    .build()
    .unwrap();

    workflow.run("X").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    limit.close();
    let err = workflow.run("X").await.expect_err("gate closed");
    assert!(matches!(err, WorkflowError::StageFailed { index: 0, .. }));
}

#[test]
fn build_rejects_invalid_stage_lists() {
    let calls = Arc::new(AtomicUsize::new(0));
    let agent = prefixing("A", "", calls);

    let empty = SequentialWorkflow::builder("empty").build();
    assert!(matches!(empty, Err(WorkflowError::InvalidStage { .. })));

    let duplicate = SequentialWorkflow::builder("dup")
        .stage(Stage::new(PLAN, agent.clone(), field(PLAN)))
        .stage(Stage::new(PLAN, agent.clone(), field(PLAN)))
        .build();
    assert!(matches!(duplicate, Err(WorkflowError::InvalidStage { .. })));

    let reserved = SequentialWorkflow::builder("reserved")
        .stage(Stage::new("request", agent.clone(), field(PLAN)))
        .build();
    assert!(matches!(reserved, Err(WorkflowError::InvalidStage { .. })));

    let forward = SequentialWorkflow::builder("forward")
        .stage(Stage::new(
            PLAN,
            agent.clone(),
            PromptBuilder::template("{{draft}}").unwrap(),
        ))
        .stage(Stage::new(DRAFT, agent.clone(), field(PLAN)))
        .build();
    match forward {
        Err(WorkflowError::InvalidStage { reason }) => assert!(reason.contains("draft")),
        other => panic!("expected InvalidStage, got {other:?}"),
    }

    let own_output = SequentialWorkflow::builder("self")
        .stage(Stage::new(
            PLAN,
            agent,
            PromptBuilder::template("{{plan}}").unwrap(),
        ))
        .build();
    assert!(own_output.is_err());
}
