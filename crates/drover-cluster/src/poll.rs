//! The step poll loop shared by blocking reports and background watches.
//!
//! The control plane has no push notifications, so both
//! [`report_step`](crate::ClusterManager::report_step) and
//! [`watch_step`](crate::ClusterManager::watch_step) sleep and poll. They
//! differ only in what they do with each observed state, which is the
//! closure passed to [`poll_step`].

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use drover_core::{
    ClusterControlPlane, ClusterId, DroverError, Result, RetryPolicy, StepId, StepState,
};

/// What the poll loop should do after observing a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollControl {
    Continue,
    Stop,
}

/// How a poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollEnd {
    /// The closure asked to stop after observing this state.
    Stopped(StepState),
    /// The cancellation signal fired.
    Cancelled,
}

/// Poll a step's state every `interval` until `on_state` says stop or
/// `cancel` fires.
///
/// The first poll happens immediately. Transient describe failures are
/// retried under `retry`; any other error ends the loop.
pub(crate) async fn poll_step<F>(
    control_plane: &dyn ClusterControlPlane,
    retry: &RetryPolicy,
    cluster_id: &ClusterId,
    step_id: &StepId,
    interval: Duration,
    cancel: Option<watch::Receiver<bool>>,
    mut on_state: F,
) -> Result<PollEnd>
where
    F: FnMut(StepState) -> PollControl,
{
    loop {
        if cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Ok(PollEnd::Cancelled);
        }

        let step = with_retry(retry, "DescribeStep", || {
            control_plane.describe_step(cluster_id, step_id)
        })
        .await?;

        if on_state(step.state) == PollControl::Stop {
            return Ok(PollEnd::Stopped(step.state));
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = wait_for_cancel(cancel.as_ref()) => {
                debug!(step_id = %step_id, "Step poll cancelled");
                return Ok(PollEnd::Cancelled);
            }
        }
    }
}

/// Run an idempotent control-plane read, retrying transient failures.
pub(crate) async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(error = %e, attempt, ?delay, "{what} failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Wait until the watch channel signals `true`.
///
/// Without a receiver, or once the sender is dropped, this never resolves:
/// a detached watch keeps running until its step finishes.
async fn wait_for_cancel(rx: Option<&watch::Receiver<bool>>) {
    let Some(rx) = rx else {
        return std::future::pending().await;
    };
    let mut rx = rx.clone();
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

/// Result of a background step watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOutcome {
    /// The terminal state the step ended in; `None` if the watch was cancelled first.
    pub final_state: Option<StepState>,
    /// The state that triggered the callback, if it ran.
    pub fired_on: Option<StepState>,
}

/// Handle to a background step watch.
///
/// Dropping the handle detaches the watch; it keeps polling until the step
/// reaches a terminal state.
#[derive(Debug)]
pub struct WatchHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<Result<WatchOutcome>>,
}

impl WatchHandle {
    pub(crate) fn new(cancel: watch::Sender<bool>, task: JoinHandle<Result<WatchOutcome>>) -> Self {
        Self { cancel, task }
    }

    /// Stop polling. A callback that has not fired yet will not fire.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Wait for the watch to end and return how it ended.
    pub async fn join(self) -> Result<WatchOutcome> {
        self.task.await.map_err(|e| DroverError::Internal {
            message: format!("Step watch task failed: {e}"),
        })?
    }
}
