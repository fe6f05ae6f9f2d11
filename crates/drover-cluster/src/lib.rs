//! Drover cluster manager: launch EMR clusters, submit Spark steps, and
//! track them to completion.
//!
//! [`ClusterManager`] is the entry point. It talks to the cluster through
//! a [`ClusterControlPlane`](drover_core::ClusterControlPlane):
//! [`EmrControlPlane`] in production, [`ScriptedControlPlane`] in tests.
//! Failure logs of failed steps are read through a
//! [`Session`](drover_storage::Session).

pub mod emr;
pub mod logs;
pub mod manager;
pub mod poll;
pub mod scripted;

pub use emr::EmrControlPlane;
pub use logs::ErrorLog;
pub use manager::{ClusterManager, ClusterStatus, LaunchedCluster, StepStatus};
pub use poll::{PollControl, WatchHandle, WatchOutcome};
pub use scripted::ScriptedControlPlane;
