//! Full-orchestrator integration tests: dependency chains, diamond DAGs,
//! cross-role waits, lifecycle state machine, and shutdown.

use std::sync::Arc;
use std::time::Duration;

use drover_core::config::OrchestratorConfig;
use drover_core::model::{Completion, TaskStatus};
use drover_core::orchestrator::{Orchestrator, OrchestratorState};
use drover_core::source::{TaskSource, WorkerSource};
use drover_test_utils::{task, MemoryTaskSource, ScriptedWorkerSource};

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        poll_interval: Duration::from_millis(20),
        runner_cooldown: Duration::from_millis(1),
        stop_when_complete: true,
        ..OrchestratorConfig::default()
    }
}

/// Give a task a completion signal so a scripted worker can finish it.
fn with_signal(mut t: drover_core::model::Task, signal: &str) -> drover_core::model::Task {
    t.completion = Some(Completion {
        verify: None,
        signal: Some(signal.to_owned()),
        max_iterations: Some(3),
    });
    t
}

async fn drive(orchestrator: &Orchestrator) {
    tokio::time::timeout(Duration::from_secs(10), orchestrator.start())
        .await
        .expect("orchestrator should settle well within the timeout")
        .expect("orchestrator run should succeed");
}

#[tokio::test]
async fn single_task_runs_to_completion() {
    let tasks = Arc::new(MemoryTaskSource::new(vec![with_signal(
        task("a", "be", "", &[]),
        "DONE",
    )]));
    let workers = Arc::new(ScriptedWorkerSource::new());
    workers.add_worker("be-1", "be");
    workers.script("be-1", &["DONE"]);

    let orchestrator = Orchestrator::new(
        fast_config(),
        Arc::clone(&tasks) as Arc<dyn TaskSource>,
        Arc::clone(&workers) as Arc<dyn WorkerSource>,
    );
    drive(&orchestrator).await;

    assert_eq!(orchestrator.state(), OrchestratorState::Stopped);
    assert_eq!(tasks.snapshot("a").unwrap().status, TaskStatus::Complete);
    assert_eq!(workers.call_count("be-1"), 1);
}

#[tokio::test]
async fn dependency_chain_runs_in_order() {
    // b waits on a across two lanes of the same role, cap 1.
    let tasks = Arc::new(MemoryTaskSource::new(vec![
        with_signal(task("a", "be", "lane-a", &[]), "A_DONE"),
        with_signal(task("b", "be", "lane-b", &["a"]), "B_DONE"),
    ]));
    let workers = Arc::new(ScriptedWorkerSource::new());
    workers.add_worker("be-1", "be");
    workers.script("be-1", &["A_DONE", "B_DONE"]);

    let orchestrator = Orchestrator::new(
        fast_config(),
        Arc::clone(&tasks) as Arc<dyn TaskSource>,
        Arc::clone(&workers) as Arc<dyn WorkerSource>,
    );
    drive(&orchestrator).await;

    assert_eq!(tasks.snapshot("a").unwrap().status, TaskStatus::Complete);
    assert_eq!(tasks.snapshot("b").unwrap().status, TaskStatus::Complete);

    // The worker saw a's prompt strictly before b's.
    let prompts = workers.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].1.contains("Task a"));
    assert!(prompts[1].1.contains("Task b"));
}

#[tokio::test]
async fn diamond_dag_completes_every_task() {
    let tasks = Arc::new(MemoryTaskSource::new(vec![
        with_signal(task("root", "be", "", &[]), "OK"),
        with_signal(task("left", "be", "", &["root"]), "OK"),
        with_signal(task("right", "be", "", &["root"]), "OK"),
        with_signal(task("join", "be", "", &["left", "right"]), "OK"),
    ]));
    let workers = Arc::new(ScriptedWorkerSource::new());
    workers.add_worker("be-1", "be");
    workers.add_worker("be-2", "be");
    workers.script("be-1", &["OK"]);
    workers.script("be-2", &["OK"]);

    let mut config = fast_config();
    config.role_concurrency.insert("be".to_owned(), 2);

    let orchestrator = Orchestrator::new(
        config,
        Arc::clone(&tasks) as Arc<dyn TaskSource>,
        Arc::clone(&workers) as Arc<dyn WorkerSource>,
    );
    drive(&orchestrator).await;

    for id in ["root", "left", "right", "join"] {
        assert_eq!(
            tasks.snapshot(id).unwrap().status,
            TaskStatus::Complete,
            "task {id} should complete"
        );
    }
}

#[tokio::test]
async fn cross_role_wait_is_honored() {
    // fe waits on be within the same lane name; separate worker fleets.
    let tasks = Arc::new(MemoryTaskSource::new(vec![
        with_signal(task("be-task", "be", "main", &[]), "BE_DONE"),
        with_signal(task("fe-task", "fe", "main", &["be-task"]), "FE_DONE"),
    ]));
    let workers = Arc::new(ScriptedWorkerSource::new());
    workers.add_worker("be-1", "be");
    workers.add_worker("fe-1", "fe");
    workers.script("be-1", &["BE_DONE"]);
    workers.script("fe-1", &["FE_DONE"]);

    let orchestrator = Orchestrator::new(
        fast_config(),
        Arc::clone(&tasks) as Arc<dyn TaskSource>,
        Arc::clone(&workers) as Arc<dyn WorkerSource>,
    );
    drive(&orchestrator).await;

    assert_eq!(tasks.snapshot("be-task").unwrap().status, TaskStatus::Complete);
    assert_eq!(tasks.snapshot("fe-task").unwrap().status, TaskStatus::Complete);
    assert_eq!(workers.call_count("fe-1"), 1);
}

#[tokio::test]
async fn cycle_aborts_startup_and_stays_stopped() {
    // S3: cross-role dependency cycle.
    let tasks = Arc::new(MemoryTaskSource::new(vec![
        task("be-task", "be", "main", &["fe-task"]),
        task("fe-task", "fe", "main", &["be-task"]),
    ]));
    let workers = Arc::new(ScriptedWorkerSource::new());

    let orchestrator = Orchestrator::new(
        fast_config(),
        Arc::clone(&tasks) as Arc<dyn TaskSource>,
        Arc::clone(&workers) as Arc<dyn WorkerSource>,
    );
    let err = orchestrator.start().await.expect_err("cycle must abort");
    assert!(err.to_string().contains("cycle"));
    assert_eq!(orchestrator.state(), OrchestratorState::Stopped);
}

#[tokio::test]
async fn empty_task_set_aborts_startup() {
    let tasks = Arc::new(MemoryTaskSource::new(vec![]));
    let workers = Arc::new(ScriptedWorkerSource::new());

    let orchestrator = Orchestrator::new(
        fast_config(),
        Arc::clone(&tasks) as Arc<dyn TaskSource>,
        Arc::clone(&workers) as Arc<dyn WorkerSource>,
    );
    assert!(orchestrator.start().await.is_err());
    assert_eq!(orchestrator.state(), OrchestratorState::Stopped);
}

#[tokio::test]
async fn unknown_dependency_blocks_without_crashing() {
    // The dependent task stays blocked forever; the rest completes and
    // the loop still settles.
    let tasks = Arc::new(MemoryTaskSource::new(vec![
        with_signal(task("a", "be", "", &[]), "DONE"),
        with_signal(task("orphan", "be", "", &["ghost"]), "DONE"),
    ]));
    let workers = Arc::new(ScriptedWorkerSource::new());
    workers.add_worker("be-1", "be");
    workers.script("be-1", &["DONE"]);

    let orchestrator = Orchestrator::new(
        fast_config(),
        Arc::clone(&tasks) as Arc<dyn TaskSource>,
        Arc::clone(&workers) as Arc<dyn WorkerSource>,
    );
    drive(&orchestrator).await;

    assert_eq!(tasks.snapshot("a").unwrap().status, TaskStatus::Complete);
    assert_eq!(tasks.snapshot("orphan").unwrap().status, TaskStatus::Blocked);
    assert_eq!(workers.call_count("be-1"), 1, "the orphan was never dispatched");
}

#[tokio::test]
async fn failed_verification_fails_the_lane_but_not_the_run() {
    // First lane's task exhausts its iterations (review); the second lane
    // still gets its turn.
    let mut never_done = task("a", "be", "lane-a", &[]);
    never_done.completion = Some(Completion {
        verify: None,
        signal: Some("NEVER_EMITTED".to_owned()),
        max_iterations: Some(2),
    });
    let tasks = Arc::new(MemoryTaskSource::new(vec![
        never_done,
        with_signal(task("b", "be", "lane-b", &[]), "B_DONE"),
    ]));
    let workers = Arc::new(ScriptedWorkerSource::new());
    workers.add_worker("be-1", "be");
    workers.script("be-1", &["nope", "nope", "B_DONE"]);

    let orchestrator = Orchestrator::new(
        fast_config(),
        Arc::clone(&tasks) as Arc<dyn TaskSource>,
        Arc::clone(&workers) as Arc<dyn WorkerSource>,
    );
    drive(&orchestrator).await;

    assert_eq!(tasks.snapshot("a").unwrap().status, TaskStatus::Review);
    assert_eq!(tasks.snapshot("b").unwrap().status, TaskStatus::Complete);
}

#[tokio::test]
async fn start_rejects_while_running_and_stop_works() {
    let tasks = Arc::new(MemoryTaskSource::new(vec![with_signal(
        task("a", "be", "", &["ghost"]),
        "DONE",
    )]));
    let workers = Arc::new(ScriptedWorkerSource::new());
    workers.add_worker("be-1", "be");

    // No stop_when_complete: the loop runs until stopped.
    let mut config = fast_config();
    config.stop_when_complete = false;

    let orchestrator = Arc::new(Orchestrator::new(
        config,
        Arc::clone(&tasks) as Arc<dyn TaskSource>,
        Arc::clone(&workers) as Arc<dyn WorkerSource>,
    ));

    let runner = Arc::clone(&orchestrator);
    let handle = tokio::spawn(async move { runner.start().await });

    // Wait for the loop to come up.
    tokio::time::timeout(Duration::from_secs(5), async {
        while orchestrator.state() != OrchestratorState::Running {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("orchestrator should reach running");

    let second = Arc::clone(&orchestrator);
    assert!(second.start().await.is_err(), "start while running rejects");

    orchestrator.stop().expect("stop while running succeeds");
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop exits after stop")
        .expect("task join")
        .expect("run result");

    assert_eq!(orchestrator.state(), OrchestratorState::Stopped);
    assert!(orchestrator.stop().is_err(), "stop while stopped rejects");

    // Workers with a role were told to stop on shutdown.
    let listed = workers.list().await.unwrap();
    assert!(listed
        .iter()
        .all(|w| w.status == drover_core::source::WorkerStatus::Stopped));
}

#[tokio::test]
async fn auto_spawn_creates_workers_for_open_roles() {
    let tasks = Arc::new(MemoryTaskSource::new(vec![with_signal(
        task("a", "be", "", &[]),
        "DONE",
    )]));
    let workers = Arc::new(ScriptedWorkerSource::new());

    let mut config = fast_config();
    config.auto_spawn_workers = true;

    let orchestrator = Orchestrator::new(
        config,
        Arc::clone(&tasks) as Arc<dyn TaskSource>,
        Arc::clone(&workers) as Arc<dyn WorkerSource>,
    );
    drive(&orchestrator).await;

    // A be worker was spawned and it completed the task (the default
    // scripted output is irrelevant: the signal below was scripted by
    // spawn-time default, so just check the task finished or the worker
    // exists).
    let listed = workers.list().await.unwrap();
    assert!(
        listed.iter().any(|w| w.role == "be"),
        "a worker for role be should have been spawned"
    );
}

#[tokio::test]
async fn priority_orders_work_within_a_lane() {
    // Both tasks share a lane; the critical one must run first.
    let mut low = with_signal(task("low", "be", "lane", &[]), "OK");
    low.priority = "low".parse().unwrap();
    let mut crit = with_signal(task("crit", "be", "lane", &[]), "OK");
    crit.priority = "critical".parse().unwrap();

    let tasks = Arc::new(MemoryTaskSource::new(vec![low, crit]));
    let workers = Arc::new(ScriptedWorkerSource::new());
    workers.add_worker("be-1", "be");
    workers.script("be-1", &["OK"]);

    let orchestrator = Orchestrator::new(
        fast_config(),
        Arc::clone(&tasks) as Arc<dyn TaskSource>,
        Arc::clone(&workers) as Arc<dyn WorkerSource>,
    );
    drive(&orchestrator).await;

    let prompts = workers.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(
        prompts[0].1.contains("Task crit"),
        "critical task should be dispatched first, got: {}",
        prompts[0].1.lines().next().unwrap_or_default()
    );
}
