//! Trellis core: pure control-plane policies (sizing, checksum annotations,
//! admission plugin merge, replica preservation) and shared types.
//!
//! Nothing in this crate performs I/O. Collaborators (cluster reads, chart
//! application, cloud providers) live in sibling crates and report failures
//! through [`Error`].

#![forbid(unsafe_code)]

pub mod admission;
pub mod checksums;
pub mod error;
pub mod replicas;
pub mod sizing;
pub mod version;

use serde::{Deserialize, Serialize};

pub use admission::{default_plugins_for_version, merge_admission_plugins, AdmissionPlugin};
pub use checksums::{ChecksumMap, ChecksumRef};
pub use error::{Error, Result};
pub use replicas::{decide_replicas, AutoscalingMode, ReplicaDecision, StaticScale};
pub use sizing::{size_for, ResourceLimits, ResourceProfile};
pub use version::KubernetesVersion;

/// Untyped chart values payload (a JSON object).
pub type Values = serde_json::Map<String, serde_json::Value>;

/// Well-known object names shared between the synthesizers and the cluster.
pub mod names {
    pub const KUBE_APISERVER: &str = "kube-apiserver";
    pub const KUBE_CONTROLLER_MANAGER: &str = "kube-controller-manager";
    pub const CLOUD_CONTROLLER_MANAGER: &str = "cloud-controller-manager";
    pub const KUBE_SCHEDULER: &str = "kube-scheduler";
    pub const ETCD: &str = "etcd";

    pub const CLOUD_PROVIDER_CONFIG: &str = "cloud-provider-config";
    /// Data key holding the provider config text inside the config map.
    pub const CLOUD_PROVIDER_CONFIG_KEY: &str = "cloudprovider.conf";
    pub const CLOUD_PROVIDER_SECRET: &str = "cloudprovider";
    pub const BACKUP_SECRET: &str = "etcd-backup";
    pub const KUBECFG_SECRET: &str = "kubecfg";

    pub const ETCD_CLIENT_PORT: u16 = 2379;
    pub const APISERVER_SECURE_PORT: u16 = 443;
}

/// Data role of a store instance. `Main` holds the cluster state and is backed up,
/// `Events` only holds events and never is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StoreRole {
    Main,
    Events,
}

impl StoreRole {
    /// Processing order of the two roles within one pass.
    pub const ALL: [StoreRole; 2] = [StoreRole::Main, StoreRole::Events];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreRole::Main => "main",
            StoreRole::Events => "events",
        }
    }

    /// Role-qualified workload name, e.g. `etcd-main`.
    pub fn resource_name(&self) -> String {
        format!("{}-{}", names::ETCD, self.as_str())
    }

    /// In-namespace client service FQDN, e.g. `etcd-main-client.shoot--x.svc`.
    pub fn client_service_fqdn(&self, namespace: &str) -> String {
        format!("{}-client.{}.svc", self.resource_name(), namespace)
    }

    pub fn backed_up(&self) -> bool {
        matches!(self, StoreRole::Main)
    }
}

impl std::fmt::Display for StoreRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
