//! Deployment watcher: polls server tasks until they finish or a deadline passes.
//!
//! # Design
//!
//! - Each round fans out one status check per unfinished task and waits for all of them before
//!   evaluating termination.
//! - Terminal tasks are never polled again.
//! - A round with any failed status check is discarded. Retryable failures (connectivity,
//!   timeouts, throttling, 5xx) are retried on the next round and the most recent one is
//!   reported only if the deadline is reached; any other failure stops the watch at once.
//! - Apart from that, the deadline is the only way a watch ends early.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::time::{Instant, sleep};
use tracing::{info, warn};

use crate::codec::Codec;
use crate::error::{ClientError, ClientResult, TaskList};
use crate::model::{TaskReference, TaskResource, TaskState};
use crate::session::Session;

/// Default deadline for a watch.
pub const DEFAULT_DEPLOYMENT_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Default pause between poll rounds.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Source of current task states.
#[async_trait]
pub trait TaskStatusSource: Send + Sync {
    /// Fetch the current state of a task.
    async fn task_state(&self, task: &TaskReference) -> ClientResult<TaskState>;
}

#[async_trait]
impl<C: Codec> TaskStatusSource for Session<C> {
    async fn task_state(&self, task: &TaskReference) -> ClientResult<TaskState> {
        let resource: TaskResource = self.get(&task.link).await?;
        Ok(resource.state)
    }
}

/// Overall result of a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchVerdict {
    /// Every task ended in `Success`.
    Succeeded,
    /// Every task is terminal and at least one did not succeed.
    Failed,
    /// The deadline passed with tasks still pending.
    TimedOut,
    /// A status check failed in a way that retrying cannot fix.
    Aborted,
}

/// Consolidated outcome of a watch.
#[derive(Debug, Clone)]
pub struct WatchReport {
    /// Overall verdict.
    pub verdict: WatchVerdict,
    /// Every watched task with its last known state.
    pub tasks: Vec<TaskReference>,
    /// Number of poll rounds executed.
    pub rounds: u32,
    /// Time spent watching.
    pub elapsed: Duration,
    /// Deadline the watch ran against.
    pub timeout: Duration,
    /// Most recent status-check failure that was not followed by a clean round; for an
    /// aborted watch, the failure that stopped it.
    pub last_error: Option<ClientError>,
}

impl WatchReport {
    /// Terminal tasks that did not succeed.
    #[must_use]
    pub fn failed(&self) -> Vec<TaskReference> {
        self.tasks
            .iter()
            .filter(|task| task.state.is_terminal() && !task.state.is_success())
            .cloned()
            .collect()
    }

    /// Tasks that are not terminal yet.
    #[must_use]
    pub fn pending(&self) -> Vec<TaskReference> {
        self.tasks
            .iter()
            .filter(|task| !task.state.is_terminal())
            .cloned()
            .collect()
    }

    /// Convert the verdict into the error taxonomy.
    ///
    /// # Errors
    ///
    /// [`ClientError::DeploymentFailed`] or [`ClientError::DeploymentTimeout`] for the
    /// corresponding verdicts; an aborted watch yields the status-check failure itself.
    pub fn into_result(self) -> ClientResult<Self> {
        match self.verdict {
            WatchVerdict::Succeeded => Ok(self),
            WatchVerdict::Failed => Err(ClientError::DeploymentFailed {
                failed: TaskList(self.failed()),
            }),
            WatchVerdict::TimedOut => Err(ClientError::DeploymentTimeout {
                timeout: self.timeout,
                pending: TaskList(self.pending()),
                last_error: self.last_error.map(Box::new),
            }),
            WatchVerdict::Aborted => {
                let pending = TaskList(self.pending());
                Err(self
                    .last_error
                    .unwrap_or(ClientError::DeploymentTimeout {
                        timeout: self.timeout,
                        pending,
                        last_error: None,
                    }))
            }
        }
    }
}

/// Blocks until a set of deployment tasks finishes or a deadline passes.
#[derive(Debug, Clone, Copy)]
pub struct DeploymentWatcher {
    timeout: Duration,
    poll_interval: Duration,
}

impl Default for DeploymentWatcher {
    fn default() -> Self {
        Self::new(DEFAULT_DEPLOYMENT_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

impl DeploymentWatcher {
    /// Watcher with the given deadline and poll interval.
    #[must_use]
    pub const fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// Deadline for a watch.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Pause between rounds.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Poll `tasks` until all are terminal or the deadline passes.
    ///
    /// The returned report always carries a verdict; use [`WatchReport::into_result`] to turn
    /// failures and timeouts into errors.
    pub async fn watch<S>(&self, source: &S, mut tasks: Vec<TaskReference>) -> WatchReport
    where
        S: TaskStatusSource + ?Sized,
    {
        let started = Instant::now();
        let mut rounds = 0_u32;
        let mut last_error = None;

        if !tasks.is_empty() {
            info!(
                count = tasks.len(),
                timeout = ?self.timeout,
                "waiting for deployments to complete"
            );
        }

        loop {
            if tasks.iter().all(|task| task.state.is_terminal()) {
                let verdict = if tasks.iter().all(|task| task.state.is_success()) {
                    WatchVerdict::Succeeded
                } else {
                    WatchVerdict::Failed
                };
                return WatchReport {
                    verdict,
                    tasks,
                    rounds,
                    elapsed: started.elapsed(),
                    timeout: self.timeout,
                    last_error: None,
                };
            }

            if rounds > 0 && started.elapsed() >= self.timeout {
                warn!(elapsed = ?started.elapsed(), "deployments did not complete before the deadline");
                return WatchReport {
                    verdict: WatchVerdict::TimedOut,
                    tasks,
                    rounds,
                    elapsed: started.elapsed(),
                    timeout: self.timeout,
                    last_error,
                };
            }

            if rounds > 0 {
                sleep(self.poll_interval).await;
            }
            rounds += 1;

            match poll_round(source, &tasks).await {
                Ok(updates) => {
                    last_error = None;
                    for (index, state) in updates {
                        let task = &mut tasks[index];
                        if task.state != state {
                            info!(task = %task.id, label = %task.label, from = %task.state, to = %state, "task state changed");
                            task.state = state;
                        }
                    }
                }
                Err(err) if !err.is_retryable() => {
                    warn!(round = rounds, error = %err, "task status check failed; giving up");
                    return WatchReport {
                        verdict: WatchVerdict::Aborted,
                        tasks,
                        rounds,
                        elapsed: started.elapsed(),
                        timeout: self.timeout,
                        last_error: Some(err),
                    };
                }
                Err(err) => {
                    warn!(round = rounds, error = %err, "task status check failed; retrying next round");
                    last_error = Some(err);
                }
            }
        }
    }

    /// [`DeploymentWatcher::watch`] followed by [`WatchReport::into_result`].
    ///
    /// # Errors
    ///
    /// See [`WatchReport::into_result`].
    pub async fn wait<S>(&self, source: &S, tasks: Vec<TaskReference>) -> ClientResult<WatchReport>
    where
        S: TaskStatusSource + ?Sized,
    {
        self.watch(source, tasks).await.into_result()
    }
}

async fn poll_round<S>(source: &S, tasks: &[TaskReference]) -> ClientResult<Vec<(usize, TaskState)>>
where
    S: TaskStatusSource + ?Sized,
{
    let pending: Vec<usize> = tasks
        .iter()
        .enumerate()
        .filter(|(_, task)| !task.state.is_terminal())
        .map(|(index, _)| index)
        .collect();

    let results = join_all(pending.iter().map(|&index| source.task_state(&tasks[index]))).await;

    pending
        .into_iter()
        .zip(results)
        .map(|(index, result)| result.map(|state| (index, state)))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use super::*;
    use crate::error::ErrorKind;

    /// Replays a scripted sequence of states per task link.
    struct ScriptedSource {
        scripts: Mutex<HashMap<String, VecDeque<ClientResult<TaskState>>>>,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl ScriptedSource {
        fn new(scripts: Vec<(&str, Vec<ClientResult<TaskState>>)>) -> Self {
            Self {
                scripts: Mutex::new(
                    scripts
                        .into_iter()
                        .map(|(link, states)| (link.to_string(), states.into_iter().collect()))
                        .collect(),
                ),
                calls: Mutex::new(HashMap::new()),
            }
        }

        fn calls(&self, link: &str) -> usize {
            self.calls
                .lock()
                .expect("calls lock")
                .get(link)
                .copied()
                .unwrap_or(0)
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().expect("calls lock").values().sum()
        }
    }

    #[async_trait]
    impl TaskStatusSource for ScriptedSource {
        async fn task_state(&self, task: &TaskReference) -> ClientResult<TaskState> {
            *self
                .calls
                .lock()
                .expect("calls lock")
                .entry(task.link.clone())
                .or_default() += 1;
            let mut scripts = self.scripts.lock().expect("scripts lock");
            let script = scripts.get_mut(&task.link).expect("scripted task");
            if script.len() > 1 {
                script.pop_front().expect("non-empty script")
            } else {
                script.front().cloned().expect("non-empty script")
            }
        }
    }

    fn task(label: &str) -> TaskReference {
        TaskReference::new(format!("ServerTasks-{label}"), label, label)
    }

    fn api_failure(status: u16, message: &str) -> ClientError {
        ClientError::Api {
            status,
            method: "GET".into(),
            target: "/api/tasks/ServerTasks-1".into(),
            uri: "http://localhost/api/tasks/ServerTasks-1".parse().expect("url"),
            message: message.into(),
            body: String::new(),
        }
    }

    fn poll_failure() -> ClientError {
        api_failure(503, "server unavailable")
    }

    #[tokio::test(start_paused = true)]
    async fn empty_task_set_succeeds_without_polling() {
        let source = ScriptedSource::new(Vec::new());
        let report = DeploymentWatcher::default().watch(&source, Vec::new()).await;
        assert_eq!(report.verdict, WatchVerdict::Succeeded);
        assert_eq!(report.rounds, 0);
        assert_eq!(source.total_calls(), 0);
        assert!(report.into_result().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn tasks_that_all_succeed_finish_after_two_rounds() {
        let source = ScriptedSource::new(vec![
            ("T1", vec![Ok(TaskState::Executing), Ok(TaskState::Success)]),
            ("T2", vec![Ok(TaskState::Executing), Ok(TaskState::Success)]),
        ]);
        let watcher = DeploymentWatcher::new(Duration::from_secs(60), Duration::from_secs(10));
        let report = watcher.watch(&source, vec![task("T1"), task("T2")]).await;

        assert_eq!(report.verdict, WatchVerdict::Succeeded);
        assert_eq!(report.rounds, 2);
        assert_eq!(source.calls("T1"), 2);
        assert_eq!(source.calls("T2"), 2);
        assert!(report.elapsed >= Duration::from_secs(10));
        assert!(report.elapsed < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn never_finishing_task_times_out_at_the_deadline() {
        let source = ScriptedSource::new(vec![("T1", vec![Ok(TaskState::Executing)])]);
        let watcher = DeploymentWatcher::new(Duration::from_secs(30), Duration::from_secs(10));
        let report = watcher.watch(&source, vec![task("T1")]).await;

        assert_eq!(report.verdict, WatchVerdict::TimedOut);
        assert!(report.elapsed >= Duration::from_secs(30));
        assert!(report.elapsed < Duration::from_secs(31));
        assert_eq!(report.rounds, 4);
        assert_eq!(report.pending().len(), 1);

        let err = report.into_result().expect_err("timeout");
        assert_eq!(err.kind(), ErrorKind::DeploymentTimeout);
        assert!(err.to_string().contains("T1: Executing"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_task_stops_the_watch_once_all_are_terminal() {
        let source = ScriptedSource::new(vec![
            ("T1", vec![Ok(TaskState::Success)]),
            ("T2", vec![Ok(TaskState::Failed)]),
        ]);
        let watcher = DeploymentWatcher::new(Duration::from_secs(60), Duration::from_secs(10));
        let report = watcher.watch(&source, vec![task("T1"), task("T2")]).await;

        assert_eq!(report.verdict, WatchVerdict::Failed);
        assert_eq!(report.rounds, 1);
        assert_eq!(source.calls("T1"), 1);
        assert_eq!(report.elapsed, Duration::ZERO);

        let err = report.into_result().expect_err("failure");
        assert_eq!(err.kind(), ErrorKind::DeploymentFailed);
        let message = err.to_string();
        assert!(message.contains("T2: Failed"));
        assert!(!message.contains("T1"));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_tasks_are_not_polled_again() {
        let source = ScriptedSource::new(vec![
            ("T1", vec![Ok(TaskState::Success)]),
            (
                "T2",
                vec![
                    Ok(TaskState::Queued),
                    Ok(TaskState::Executing),
                    Ok(TaskState::Canceled),
                ],
            ),
        ]);
        let watcher = DeploymentWatcher::new(Duration::from_secs(60), Duration::from_secs(5));
        let report = watcher.watch(&source, vec![task("T1"), task("T2")]).await;

        assert_eq!(report.verdict, WatchVerdict::Failed);
        assert_eq!(report.rounds, 3);
        assert_eq!(source.calls("T1"), 1);
        assert_eq!(source.calls("T2"), 3);
        assert_eq!(report.failed()[0].state, TaskState::Canceled);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_poll_failures_are_retried() {
        let source = ScriptedSource::new(vec![(
            "T1",
            vec![Err(poll_failure()), Ok(TaskState::Success)],
        )]);
        let watcher = DeploymentWatcher::new(Duration::from_secs(60), Duration::from_secs(10));
        let report = watcher.watch(&source, vec![task("T1")]).await;

        assert_eq!(report.verdict, WatchVerdict::Succeeded);
        assert_eq!(report.rounds, 2);
        assert!(report.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_round_is_discarded_as_a_whole() {
        let source = ScriptedSource::new(vec![
            ("T1", vec![Ok(TaskState::Success), Ok(TaskState::Success)]),
            ("T2", vec![Err(poll_failure()), Ok(TaskState::Success)]),
        ]);
        let watcher = DeploymentWatcher::new(Duration::from_secs(60), Duration::from_secs(10));
        let report = watcher.watch(&source, vec![task("T1"), task("T2")]).await;

        assert_eq!(report.verdict, WatchVerdict::Succeeded);
        assert_eq!(source.calls("T1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_poll_failures_surface_at_the_deadline() {
        let source = ScriptedSource::new(vec![("T1", vec![Err(poll_failure())])]);
        let watcher = DeploymentWatcher::new(Duration::from_secs(20), Duration::from_secs(10));
        let err = watcher
            .wait(&source, vec![task("T1")])
            .await
            .expect_err("deadline");

        match err {
            ClientError::DeploymentTimeout {
                pending,
                last_error: Some(last),
                ..
            } => {
                assert_eq!(pending.tasks().len(), 1);
                assert!(last.to_string().contains("server unavailable"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn direct_jump_from_pending_to_terminal_is_valid() {
        let source = ScriptedSource::new(vec![("T1", vec![Ok(TaskState::Success)])]);
        let report = DeploymentWatcher::default()
            .wait(&source, vec![task("T1")])
            .await
            .expect("success");
        assert_eq!(report.rounds, 1);
        assert_eq!(report.tasks[0].state, TaskState::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_task_link_stops_the_watch_without_waiting_for_the_deadline() {
        let source = ScriptedSource::new(vec![
            ("T1", vec![Ok(TaskState::Executing)]),
            ("T2", vec![Err(api_failure(404, "Task not found"))]),
        ]);
        let watcher = DeploymentWatcher::new(Duration::from_secs(600), Duration::from_secs(10));
        let report = watcher.watch(&source, vec![task("T1"), task("T2")]).await;

        assert_eq!(report.verdict, WatchVerdict::Aborted);
        assert_eq!(report.rounds, 1);
        assert_eq!(report.elapsed, Duration::ZERO);
        assert_eq!(source.calls("T2"), 1);
        assert_eq!(report.pending().len(), 2);

        let err = report.into_result().expect_err("aborted");
        assert_eq!(err.kind(), ErrorKind::Api);
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("Task not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_task_link_aborts_on_the_first_round() {
        let source = ScriptedSource::new(vec![(
            "T1",
            vec![Err(ClientError::MissingLink {
                resource: "ServerTasks-T1".into(),
                relation: "Self".into(),
            })],
        )]);
        let watcher = DeploymentWatcher::new(Duration::from_secs(600), Duration::from_secs(10));
        let err = watcher
            .wait(&source, vec![task("T1")])
            .await
            .expect_err("aborted");

        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(source.calls("T1"), 1);
    }
}
