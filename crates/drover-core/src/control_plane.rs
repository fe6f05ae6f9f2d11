//! The ClusterControlPlane trait, Drover's view of the managed cluster API.
//!
//! The cluster manager never talks to EMR directly; it goes through this
//! trait. The production implementation wraps the AWS SDK and the
//! scripted implementation replays canned state sequences for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ClusterTemplate;
use crate::types::{
    ActionOnFailure, ClusterDescription, ClusterId, StepDescription, StepId, StepSummary,
};
use crate::Result;

/// A step ready to be submitted: a jar invocation with arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfig {
    pub name: String,
    pub action_on_failure: ActionOnFailure,
    pub jar: String,
    pub args: Vec<String>,
}

/// Everything needed to create a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFlowRequest {
    pub name: String,
    pub log_uri: Option<String>,
    pub ec2_key_name: Option<String>,
    /// Keep the cluster running once it has no steps left.
    pub keep_alive: bool,
    pub template: ClusterTemplate,
    /// Steps to run as soon as the cluster is up, in order.
    pub steps: Vec<StepConfig>,
}

/// The external cluster control plane.
///
/// Implementations must be `Send + Sync` so a manager can be shared
/// across tasks and used from background watch loops.
#[async_trait]
pub trait ClusterControlPlane: Send + Sync {
    /// Create a cluster and return its identifier without waiting for it
    /// to start.
    async fn run_job_flow(&self, request: &JobFlowRequest) -> Result<ClusterId>;

    /// Append steps to a cluster. Returns one id per step, in order.
    async fn add_steps(&self, cluster_id: &ClusterId, steps: &[StepConfig]) -> Result<Vec<StepId>>;

    /// List a cluster's steps in submission order.
    async fn list_steps(&self, cluster_id: &ClusterId) -> Result<Vec<StepSummary>>;

    /// Describe one step. [`DroverError::NotFound`](crate::DroverError::NotFound)
    /// if the cluster or step is unknown.
    async fn describe_step(&self, cluster_id: &ClusterId, step_id: &StepId) -> Result<StepDescription>;

    /// Describe one cluster.
    async fn describe_cluster(&self, cluster_id: &ClusterId) -> Result<ClusterDescription>;

    /// Request termination. Returns once the request is accepted.
    async fn terminate_cluster(&self, cluster_id: &ClusterId) -> Result<()>;
}
