//! Typed identifiers and remote state enums for clusters and steps.
//!
//! Identifiers are newtype wrappers around `String` so that a [`StepId`]
//! cannot be passed where a [`ClusterId`] is expected. States mirror the
//! control plane's wire names (`RUNNING`, `TERMINATED_WITH_ERRORS`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::DroverError;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new identifier from a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a new random identifier in the control plane's style.
            pub fn generate() -> Self {
                let raw = Uuid::new_v4().simple().to_string().to_uppercase();
                Self(format!("{}{}", $prefix, &raw[..13]))
            }

            /// Return the inner string value.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

define_id!(
    /// Identifier of a cluster (job flow), e.g. `j-2AXXXXXXGAPLF`.
    ClusterId,
    "j-"
);

define_id!(
    /// Identifier of a step within a cluster, e.g. `s-1XXXXXXXXXXF`.
    StepId,
    "s-"
);

/// Generates `as_str`, `Display` and `FromStr` over the wire names.
macro_rules! wire_enum {
    ($name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The control plane's name for this value.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = DroverError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_uppercase().as_str() {
                    $($wire => Ok($name::$variant),)+
                    other => Err(DroverError::Internal {
                        message: format!(
                            "unknown {} '{}'", stringify!($name), other
                        ),
                    }),
                }
            }
        }
    };
}

/// Remote state of a step.
///
/// ```text
/// PENDING -> RUNNING -> {COMPLETED, FAILED, INTERRUPTED}
/// PENDING -> CANCEL_PENDING -> CANCELLED
/// RUNNING -> CANCEL_PENDING -> CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepState {
    Pending,
    CancelPending,
    Running,
    Completed,
    Cancelled,
    Failed,
    Interrupted,
}

wire_enum!(StepState {
    Pending => "PENDING",
    CancelPending => "CANCEL_PENDING",
    Running => "RUNNING",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
    Failed => "FAILED",
    Interrupted => "INTERRUPTED",
});

impl StepState {
    /// No further transition happens from a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed | StepState::Cancelled | StepState::Failed | StepState::Interrupted
        )
    }
}

/// Remote lifecycle state of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterState {
    Starting,
    Bootstrapping,
    Running,
    Waiting,
    Terminating,
    Terminated,
    TerminatedWithErrors,
}

wire_enum!(ClusterState {
    Starting => "STARTING",
    Bootstrapping => "BOOTSTRAPPING",
    Running => "RUNNING",
    Waiting => "WAITING",
    Terminating => "TERMINATING",
    Terminated => "TERMINATED",
    TerminatedWithErrors => "TERMINATED_WITH_ERRORS",
});

impl ClusterState {
    /// The cluster has stopped for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClusterState::Terminated | ClusterState::TerminatedWithErrors)
    }

    /// The cluster is going away or gone; a termination reason is available.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, ClusterState::Terminating) || self.is_terminal()
    }
}

/// What the cluster does when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionOnFailure {
    #[default]
    TerminateCluster,
    CancelAndWait,
    Continue,
}

wire_enum!(ActionOnFailure {
    TerminateCluster => "TERMINATE_CLUSTER",
    CancelAndWait => "CANCEL_AND_WAIT",
    Continue => "CONTINUE",
});

/// A Spark job to run as a step: the main class and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparkJob {
    pub class_name: String,
    pub args: Vec<String>,
}

impl SparkJob {
    pub fn new<I, S>(class_name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            class_name: class_name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Step name: the last dotted segment of the class name.
    pub fn step_name(&self) -> &str {
        match self.class_name.rsplit_once('.') {
            Some((_, simple)) if !simple.is_empty() => simple,
            _ => &self.class_name,
        }
    }
}

/// Why a step failed, as reported by the control plane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetails {
    pub reason: Option<String>,
    pub message: Option<String>,
    /// `s3://` prefix (or file) where the step's logs were written.
    pub log_file: Option<String>,
}

/// A described step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDescription {
    pub id: StepId,
    pub name: String,
    pub args: Vec<String>,
    pub action_on_failure: ActionOnFailure,
    pub state: StepState,
    pub failure: Option<FailureDetails>,
}

/// One entry of a cluster's step listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSummary {
    pub id: StepId,
    pub name: String,
    pub state: StepState,
}

/// A described cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDescription {
    pub id: ClusterId,
    pub name: String,
    pub state: ClusterState,
    /// Free-text state change message; set by the control plane once the
    /// cluster begins shutting down.
    pub state_change_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_step_states() {
        let terminal: Vec<_> = StepState::ALL.iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(
            terminal,
            vec![
                &StepState::Completed,
                &StepState::Cancelled,
                &StepState::Failed,
                &StepState::Interrupted
            ]
        );
    }

    #[test]
    fn test_step_state_wire_names() {
        for state in StepState::ALL {
            assert_eq!(state.as_str().parse::<StepState>().unwrap(), *state);
        }
        assert_eq!("cancel_pending".parse::<StepState>().unwrap(), StepState::CancelPending);
        assert!("DONE".parse::<StepState>().is_err());
    }

    #[test]
    fn test_step_state_serde_matches_wire() {
        let json = serde_json::to_string(&StepState::CancelPending).unwrap();
        assert_eq!(json, "\"CANCEL_PENDING\"");
    }

    #[test]
    fn test_cluster_shutdown_states() {
        assert!(ClusterState::Terminating.is_shutdown());
        assert!(!ClusterState::Terminating.is_terminal());
        assert!(ClusterState::TerminatedWithErrors.is_terminal());
        assert!(!ClusterState::Waiting.is_shutdown());
        assert_eq!(
            "TERMINATED_WITH_ERRORS".parse::<ClusterState>().unwrap(),
            ClusterState::TerminatedWithErrors
        );
    }

    #[test]
    fn test_step_name_from_class() {
        assert_eq!(SparkJob::new("com.acme.jobs.ClassA", ["x"]).step_name(), "ClassA");
        assert_eq!(SparkJob::new("ClassB", Vec::<String>::new()).step_name(), "ClassB");
    }

    #[test]
    fn test_generated_ids() {
        let a = ClusterId::generate();
        let b = ClusterId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("j-"));
        assert!(StepId::generate().as_str().starts_with("s-"));
    }

    #[test]
    fn test_id_serialize_transparent() {
        let id = StepId::new("s-123");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"s-123\"");
    }
}
