//! A control plane that replays scripted step states, for tests and demos.
//!
//! Every step walks through its script one state per `describe_step`
//! call and then stays on the last state forever, which is how a real
//! step looks from the outside once it finishes.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use drover_core::control_plane::{JobFlowRequest, StepConfig};
use drover_core::{
    ClusterControlPlane, ClusterDescription, ClusterId, ClusterState, DroverError,
    FailureDetails, Result, StepDescription, StepId, StepState, StepSummary,
};

/// Reason recorded when a cluster is terminated through the control plane.
pub const USER_TERMINATION_REASON: &str = "Terminated by user request";

#[derive(Debug)]
struct ScriptedStep {
    config: StepConfig,
    script: Vec<StepState>,
    cursor: usize,
    failure: Option<FailureDetails>,
}

impl ScriptedStep {
    fn current(&self) -> StepState {
        self.script[self.cursor.min(self.script.len() - 1)]
    }
}

#[derive(Debug)]
struct ScriptedCluster {
    name: String,
    state: ClusterState,
    reason: Option<String>,
    steps: Vec<StepId>,
}

#[derive(Debug, Default)]
struct Inner {
    clusters: HashMap<ClusterId, ScriptedCluster>,
    steps: HashMap<StepId, ScriptedStep>,
    requests: Vec<JobFlowRequest>,
    transient_failures: u32,
    describe_calls: u32,
}

impl Inner {
    fn register_steps(&mut self, cluster_id: &ClusterId, steps: &[StepConfig], script: &[StepState]) -> Vec<StepId> {
        let mut ids = Vec::with_capacity(steps.len());
        for config in steps {
            let id = StepId::generate();
            self.steps.insert(
                id.clone(),
                ScriptedStep {
                    config: config.clone(),
                    script: script.to_vec(),
                    cursor: 0,
                    failure: None,
                },
            );
            ids.push(id);
        }
        if let Some(cluster) = self.clusters.get_mut(cluster_id) {
            cluster.steps.extend(ids.iter().cloned());
        }
        ids
    }

    fn step(&mut self, cluster_id: &ClusterId, step_id: &StepId) -> Result<&mut ScriptedStep> {
        let owned = self
            .clusters
            .get(cluster_id)
            .is_some_and(|c| c.steps.contains(step_id));
        if !owned {
            return Err(DroverError::not_found(format!("{cluster_id}/{step_id}")));
        }
        self.steps
            .get_mut(step_id)
            .ok_or_else(|| DroverError::not_found(step_id.as_str()))
    }
}

/// In-process [`ClusterControlPlane`] driven by per-step state scripts.
#[derive(Debug)]
pub struct ScriptedControlPlane {
    inner: Mutex<Inner>,
    default_script: Vec<StepState>,
}

impl Default for ScriptedControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedControlPlane {
    /// Steps run `PENDING -> RUNNING -> COMPLETED` unless scripted otherwise.
    pub fn new() -> Self {
        Self::with_default_script(vec![StepState::Pending, StepState::Running, StepState::Completed])
    }

    /// Use `script` for every step that is not scripted explicitly.
    /// An empty script means steps stay `PENDING`.
    pub fn with_default_script(script: Vec<StepState>) -> Self {
        let script = if script.is_empty() {
            vec![StepState::Pending]
        } else {
            script
        };
        Self {
            inner: Mutex::new(Inner::default()),
            default_script: script,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| DroverError::Internal {
            message: "Scripted control plane lock poisoned".to_string(),
        })
    }

    /// Replace the remaining states of a step. The next describe returns
    /// the first state of `script`.
    pub fn script_step(&self, step_id: &StepId, script: Vec<StepState>) -> Result<()> {
        if script.is_empty() {
            return Err(DroverError::Config {
                message: "A step script needs at least one state".to_string(),
            });
        }
        let mut inner = self.lock()?;
        let step = inner
            .steps
            .get_mut(step_id)
            .ok_or_else(|| DroverError::not_found(step_id.as_str()))?;
        step.script = script;
        step.cursor = 0;
        Ok(())
    }

    /// Attach failure details, reported whenever the step is `FAILED`.
    pub fn set_failure(&self, step_id: &StepId, failure: FailureDetails) -> Result<()> {
        let mut inner = self.lock()?;
        let step = inner
            .steps
            .get_mut(step_id)
            .ok_or_else(|| DroverError::not_found(step_id.as_str()))?;
        step.failure = Some(failure);
        Ok(())
    }

    /// Force a cluster into `state`.
    pub fn set_cluster_state(
        &self,
        cluster_id: &ClusterId,
        state: ClusterState,
        reason: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.lock()?;
        let cluster = inner
            .clusters
            .get_mut(cluster_id)
            .ok_or_else(|| DroverError::not_found(cluster_id.as_str()))?;
        cluster.state = state;
        cluster.reason = reason.map(str::to_string);
        Ok(())
    }

    /// Make the next `n` describe or list calls fail with a transport error.
    pub fn fail_next_describes(&self, n: u32) -> Result<()> {
        self.lock()?.transient_failures = n;
        Ok(())
    }

    /// Every cluster creation request received so far.
    pub fn requests(&self) -> Result<Vec<JobFlowRequest>> {
        Ok(self.lock()?.requests.clone())
    }

    /// The configuration a step was submitted with.
    pub fn step_config(&self, step_id: &StepId) -> Result<StepConfig> {
        let inner = self.lock()?;
        inner
            .steps
            .get(step_id)
            .map(|s| s.config.clone())
            .ok_or_else(|| DroverError::not_found(step_id.as_str()))
    }

    /// Number of `describe_step` calls answered, failed ones included.
    pub fn describe_calls(&self) -> Result<u32> {
        Ok(self.lock()?.describe_calls)
    }

    fn take_transient_failure(inner: &mut Inner, what: &str) -> Result<()> {
        if inner.transient_failures == 0 {
            return Ok(());
        }
        inner.transient_failures -= 1;
        Err(DroverError::transport(
            format!("{what} failed"),
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "scripted outage"),
        ))
    }
}

#[async_trait]
impl ClusterControlPlane for ScriptedControlPlane {
    async fn run_job_flow(&self, request: &JobFlowRequest) -> Result<ClusterId> {
        let mut inner = self.lock()?;
        let cluster_id = ClusterId::generate();
        inner.clusters.insert(
            cluster_id.clone(),
            ScriptedCluster {
                name: request.name.clone(),
                state: ClusterState::Starting,
                reason: None,
                steps: Vec::new(),
            },
        );
        inner.register_steps(&cluster_id, &request.steps, &self.default_script);
        inner.requests.push(request.clone());
        Ok(cluster_id)
    }

    async fn add_steps(&self, cluster_id: &ClusterId, steps: &[StepConfig]) -> Result<Vec<StepId>> {
        let mut inner = self.lock()?;
        if !inner.clusters.contains_key(cluster_id) {
            return Err(DroverError::not_found(cluster_id.as_str()));
        }
        Ok(inner.register_steps(cluster_id, steps, &self.default_script))
    }

    async fn list_steps(&self, cluster_id: &ClusterId) -> Result<Vec<StepSummary>> {
        let mut inner = self.lock()?;
        Self::take_transient_failure(&mut inner, "ListSteps")?;
        let cluster = inner
            .clusters
            .get(cluster_id)
            .ok_or_else(|| DroverError::not_found(cluster_id.as_str()))?;
        Ok(cluster
            .steps
            .iter()
            .filter_map(|id| {
                inner.steps.get(id).map(|step| StepSummary {
                    id: id.clone(),
                    name: step.config.name.clone(),
                    state: step.current(),
                })
            })
            .collect())
    }

    async fn describe_step(&self, cluster_id: &ClusterId, step_id: &StepId) -> Result<StepDescription> {
        let mut inner = self.lock()?;
        inner.describe_calls += 1;
        Self::take_transient_failure(&mut inner, "DescribeStep")?;

        let step = inner.step(cluster_id, step_id)?;
        let state = step.current();
        if step.cursor + 1 < step.script.len() {
            step.cursor += 1;
        }
        Ok(StepDescription {
            id: step_id.clone(),
            name: step.config.name.clone(),
            args: step.config.args.clone(),
            action_on_failure: step.config.action_on_failure,
            state,
            failure: if state == StepState::Failed {
                step.failure.clone()
            } else {
                None
            },
        })
    }

    async fn describe_cluster(&self, cluster_id: &ClusterId) -> Result<ClusterDescription> {
        let mut inner = self.lock()?;
        Self::take_transient_failure(&mut inner, "DescribeCluster")?;
        let cluster = inner
            .clusters
            .get(cluster_id)
            .ok_or_else(|| DroverError::not_found(cluster_id.as_str()))?;
        Ok(ClusterDescription {
            id: cluster_id.clone(),
            name: cluster.name.clone(),
            state: cluster.state,
            state_change_reason: cluster.reason.clone(),
        })
    }

    async fn terminate_cluster(&self, cluster_id: &ClusterId) -> Result<()> {
        self.set_cluster_state(
            cluster_id,
            ClusterState::Terminated,
            Some(USER_TERMINATION_REASON),
        )
    }
}
