//! Replica preservation for autoscaled control-plane deployments.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Values;

/// Upper bound handed to the live autoscaler when nothing else is configured.
pub const DEFAULT_MAX_REPLICAS: i32 = 3;

/// Statically configured replica count and scale bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticScale {
    pub replicas: i32,
    pub min_replicas: i32,
    pub max_replicas: i32,
}

/// How replica counts are governed for this installation. Selected once per pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum AutoscalingMode {
    /// Replicas and bounds come from static configuration; live state is ignored.
    Centralized(StaticScale),
    /// A horizontal autoscaler owns the replica count; keep whatever is running.
    LiveDriven,
}

impl AutoscalingMode {
    pub fn is_centralized(&self) -> bool {
        matches!(self, AutoscalingMode::Centralized(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaDecision {
    Pinned(StaticScale),
    /// `replicas` is `None` when there is no positive live count, leaving the
    /// field to the chart default.
    Preserved { replicas: Option<i32>, max_replicas: i32 },
}

/// Decide replicas from the autoscaling mode and the live count of the deployment
/// (`None` when it does not exist or has no replica count).
pub fn decide_replicas(mode: &AutoscalingMode, live_replicas: Option<i32>) -> ReplicaDecision {
    match mode {
        AutoscalingMode::Centralized(scale) => ReplicaDecision::Pinned(*scale),
        AutoscalingMode::LiveDriven => ReplicaDecision::Preserved {
            replicas: live_replicas.filter(|n| *n > 0),
            max_replicas: DEFAULT_MAX_REPLICAS,
        },
    }
}

impl ReplicaDecision {
    pub fn replicas(&self) -> Option<i32> {
        match self {
            ReplicaDecision::Pinned(s) => Some(s.replicas),
            ReplicaDecision::Preserved { replicas, .. } => *replicas,
        }
    }

    /// Write `replicas`, `minReplicas` and `maxReplicas` into `values`, leaving
    /// unset fields untouched.
    pub fn apply_to(&self, values: &mut Values) {
        match self {
            ReplicaDecision::Pinned(s) => {
                values.insert("replicas".into(), Value::from(s.replicas));
                values.insert("minReplicas".into(), Value::from(s.min_replicas));
                values.insert("maxReplicas".into(), Value::from(s.max_replicas));
            }
            ReplicaDecision::Preserved { replicas, max_replicas } => {
                if let Some(n) = replicas {
                    values.insert("replicas".into(), Value::from(*n));
                }
                values.insert("maxReplicas".into(), Value::from(*max_replicas));
            }
        }
    }
}
