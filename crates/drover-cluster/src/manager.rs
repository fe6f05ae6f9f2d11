//! The cluster manager: launch clusters, submit Spark steps, track them.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use drover_core::control_plane::{JobFlowRequest, StepConfig};
use drover_core::{
    ActionOnFailure, ClusterControlPlane, ClusterDescription, ClusterId, DroverConfig,
    DroverError, Result, SparkJob, StepDescription, StepId, StepState, StepSummary,
};
use drover_storage::Session;

use crate::emr::EmrControlPlane;
use crate::logs::{self, ErrorLog};
use crate::poll::{poll_step, with_retry, PollControl, PollEnd, WatchHandle, WatchOutcome};

/// Suffix appended to the name of clusters launched with their jobs.
const JOB_CLUSTER_SUFFIX: &str = "-m2x";

/// A cluster created together with its steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchedCluster {
    pub cluster_id: ClusterId,
    /// Step ids in submission order.
    pub step_ids: Vec<StepId>,
}

/// One observation of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepStatus {
    pub step: StepDescription,
    /// Present only for `FAILED` steps.
    pub error_log: Option<ErrorLog>,
}

impl StepStatus {
    pub fn state(&self) -> StepState {
        self.step.state
    }
}

/// One observation of a cluster and its steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterStatus {
    pub cluster: ClusterDescription,
    pub steps: Vec<StepSummary>,
    /// Why the cluster is shutting down; `None` while it is alive.
    pub termination_reason: Option<String>,
}

/// Launches clusters, submits Spark steps, and reports on them.
///
/// Cheap to clone; clones share the control-plane client and the
/// object-store session used for fetching failure logs.
#[derive(Clone)]
pub struct ClusterManager {
    control_plane: Arc<dyn ClusterControlPlane>,
    session: Session,
    config: DroverConfig,
}

impl ClusterManager {
    pub fn new(
        control_plane: Arc<dyn ClusterControlPlane>,
        session: Session,
        config: DroverConfig,
    ) -> Self {
        Self {
            control_plane,
            session,
            config,
        }
    }

    /// A manager backed by EMR and S3 in the configured region.
    pub async fn from_config(config: DroverConfig) -> Result<Self> {
        let control_plane = EmrControlPlane::from_config(&config).await;
        let session = Session::s3(&config);
        Ok(Self::new(Arc::new(control_plane), session, config))
    }

    pub fn config(&self) -> &DroverConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn job_flow(&self, name: String, keep_alive: bool, steps: Vec<StepConfig>) -> JobFlowRequest {
        JobFlowRequest {
            name,
            log_uri: self.config.log_uri.clone(),
            ec2_key_name: self.config.ec2_key_name.clone(),
            keep_alive,
            template: self.config.cluster.clone(),
            steps,
        }
    }

    fn step_configs(
        &self,
        jar_path: &str,
        jobs: &[SparkJob],
        action_on_failure: ActionOnFailure,
    ) -> Vec<StepConfig> {
        jobs.iter()
            .map(|job| StepConfig {
                name: job.step_name().to_string(),
                action_on_failure,
                jar: self.config.spark.runner_jar.clone(),
                args: self.config.spark.command(jar_path, job),
            })
            .collect()
    }

    /// Start a long-lived cluster that stays up when idle.
    #[instrument(skip(self))]
    pub async fn launch_cluster(&self, job_name: &str) -> Result<ClusterId> {
        let request = self.job_flow(job_name.to_string(), true, Vec::new());
        let cluster_id = self.control_plane.run_job_flow(&request).await?;
        info!(cluster_id = %cluster_id, "Cluster launched");
        Ok(cluster_id)
    }

    /// Start a cluster that runs `jobs` in order and terminates when done.
    ///
    /// `step_ids` is empty if the steps could not be listed after launch;
    /// [`cluster_status`](Self::cluster_status) lists them later.
    #[instrument(skip(self, jobs), fields(jobs = jobs.len()))]
    pub async fn launch_cluster_with_jobs(
        &self,
        name: &str,
        jar_path: &str,
        jobs: &[SparkJob],
    ) -> Result<LaunchedCluster> {
        let steps = self.step_configs(jar_path, jobs, ActionOnFailure::TerminateCluster);
        let request = self.job_flow(format!("{name}{JOB_CLUSTER_SUFFIX}"), false, steps);
        let cluster_id = self.control_plane.run_job_flow(&request).await?;

        // The cluster exists from here on; a failed listing must not lose its id.
        let step_ids: Vec<StepId> = match with_retry(&self.config.retry, "ListSteps", || {
            self.control_plane.list_steps(&cluster_id)
        })
        .await
        {
            Ok(listed) => listed.into_iter().map(|s| s.id).collect(),
            Err(e) => {
                warn!(cluster_id = %cluster_id, error = %e, "Cluster launched but its steps could not be listed");
                Vec::new()
            }
        };

        info!(cluster_id = %cluster_id, steps = step_ids.len(), "Cluster launched with jobs");
        Ok(LaunchedCluster {
            cluster_id,
            step_ids,
        })
    }

    /// Request termination without waiting for it.
    #[instrument(skip(self), fields(cluster_id = %cluster_id))]
    pub async fn terminate_cluster(&self, cluster_id: &ClusterId) -> Result<()> {
        self.control_plane.terminate_cluster(cluster_id).await?;
        info!(cluster_id = %cluster_id, "Termination requested");
        Ok(())
    }

    /// Submit `jobs` to a running cluster; a failing step terminates it.
    pub async fn run_steps(
        &self,
        jar_path: &str,
        cluster_id: &ClusterId,
        jobs: &[SparkJob],
    ) -> Result<Vec<StepId>> {
        self.run_steps_with(jar_path, cluster_id, jobs, ActionOnFailure::default())
            .await
    }

    /// Submit `jobs` with an explicit action on failure. Ids come back in
    /// submission order.
    #[instrument(skip(self, jobs), fields(cluster_id = %cluster_id, jobs = jobs.len()))]
    pub async fn run_steps_with(
        &self,
        jar_path: &str,
        cluster_id: &ClusterId,
        jobs: &[SparkJob],
        action_on_failure: ActionOnFailure,
    ) -> Result<Vec<StepId>> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }
        let steps = self.step_configs(jar_path, jobs, action_on_failure);
        let step_ids = self.control_plane.add_steps(cluster_id, &steps).await?;
        if step_ids.len() != steps.len() {
            return Err(DroverError::Internal {
                message: format!(
                    "Submitted {} steps but the control plane returned {} ids",
                    steps.len(),
                    step_ids.len()
                ),
            });
        }
        info!(cluster_id = %cluster_id, steps = step_ids.len(), "Steps submitted");
        Ok(step_ids)
    }

    /// Poll a step once. Failed steps come with their error log.
    #[instrument(skip(self), fields(step_id = %step_id, cluster_id = %cluster_id))]
    pub async fn step_status(&self, step_id: &StepId, cluster_id: &ClusterId) -> Result<StepStatus> {
        let step = with_retry(&self.config.retry, "DescribeStep", || {
            self.control_plane.describe_step(cluster_id, step_id)
        })
        .await?;
        debug!(state = %step.state, "Step described");

        let error_log = if step.state == StepState::Failed {
            Some(self.fetch_error_log(&step, cluster_id).await)
        } else {
            None
        };
        Ok(StepStatus { step, error_log })
    }

    async fn fetch_error_log(&self, step: &StepDescription, cluster_id: &ClusterId) -> ErrorLog {
        let reported = step.failure.as_ref().and_then(|f| f.log_file.as_deref());
        let Some(path) = logs::stderr_path(
            reported,
            self.config.log_uri.as_deref(),
            cluster_id,
            &step.id,
        ) else {
            warn!(step_id = %step.id, "No log location known for failed step");
            return ErrorLog::Unavailable {
                path: None,
                reason: "No log location reported and no log URI configured".to_string(),
            };
        };

        let fetched = self.session.get(&path).await;
        match fetched.and_then(|data| logs::decompress(&data)) {
            Ok(raw) => ErrorLog::Available {
                text: logs::format_for_display(&raw),
                path,
            },
            Err(DroverError::NotFound { .. }) => {
                warn!(path = %path, "Error log not written yet");
                ErrorLog::Unavailable {
                    path: Some(path),
                    reason: "The log has not been written yet; try again in a few minutes"
                        .to_string(),
                }
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to fetch error log");
                ErrorLog::Unavailable {
                    path: Some(path),
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Poll a cluster once, together with its steps.
    #[instrument(skip(self), fields(cluster_id = %cluster_id))]
    pub async fn cluster_status(&self, cluster_id: &ClusterId) -> Result<ClusterStatus> {
        let cluster = with_retry(&self.config.retry, "DescribeCluster", || {
            self.control_plane.describe_cluster(cluster_id)
        })
        .await?;
        let steps = with_retry(&self.config.retry, "ListSteps", || {
            self.control_plane.list_steps(cluster_id)
        })
        .await?;

        let termination_reason = if cluster.state.is_shutdown() {
            cluster.state_change_reason.clone()
        } else {
            None
        };
        Ok(ClusterStatus {
            cluster,
            steps,
            termination_reason,
        })
    }

    /// Block until the step reaches a terminal state and return it.
    ///
    /// There is no timeout; wrap the call in `tokio::time::timeout` if one
    /// is needed.
    #[instrument(skip(self), fields(step_id = %step_id, cluster_id = %cluster_id))]
    pub async fn report_step(&self, step_id: &StepId, cluster_id: &ClusterId) -> Result<StepState> {
        let end = poll_step(
            self.control_plane.as_ref(),
            &self.config.retry,
            cluster_id,
            step_id,
            self.config.poll_interval,
            None,
            |state| {
                debug!(state = %state, "Step polled");
                if state.is_terminal() {
                    PollControl::Stop
                } else {
                    PollControl::Continue
                }
            },
        )
        .await?;

        match end {
            PollEnd::Stopped(state) => Ok(state),
            PollEnd::Cancelled => Err(DroverError::Internal {
                message: format!("Report on step {step_id} ended without a terminal state"),
            }),
        }
    }

    /// Watch a step in the background.
    ///
    /// `callback` runs once, the first time the step is in `watch_state` or
    /// in any terminal state, whichever comes first. Polling continues
    /// until the step is terminal or the returned handle is cancelled.
    pub fn watch_step<F>(
        &self,
        step_id: &StepId,
        cluster_id: &ClusterId,
        callback: F,
        watch_state: StepState,
    ) -> WatchHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let manager = self.clone();
        let step_id = step_id.clone();
        let cluster_id = cluster_id.clone();

        let task = tokio::spawn(async move {
            let mut callback = Some(callback);
            let mut fired_on = None;

            let end = poll_step(
                manager.control_plane.as_ref(),
                &manager.config.retry,
                &cluster_id,
                &step_id,
                manager.config.poll_interval,
                Some(cancel_rx),
                |state| {
                    info!(step_id = %step_id, cluster_id = %cluster_id, state = %state, "Step state");
                    if state == watch_state || state.is_terminal() {
                        if let Some(callback) = callback.take() {
                            callback();
                            fired_on = Some(state);
                        }
                    }
                    if state.is_terminal() {
                        PollControl::Stop
                    } else {
                        PollControl::Continue
                    }
                },
            )
            .await?;

            Ok(WatchOutcome {
                final_state: match end {
                    PollEnd::Stopped(state) => Some(state),
                    PollEnd::Cancelled => None,
                },
                fired_on,
            })
        });

        WatchHandle::new(cancel_tx, task)
    }
}
