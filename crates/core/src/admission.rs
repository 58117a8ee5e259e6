//! Admission plugin defaults and the override merge.

use serde::{Deserialize, Serialize};

use crate::version::KubernetesVersion;

/// A named admission plugin with opaque plugin configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionPlugin {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl AdmissionPlugin {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), config: None }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }
}

/// Merge user overrides into the defaults by name.
///
/// An override whose name matches a default replaces the first matching default in
/// place. Unmatched overrides are appended after all defaults, in override order.
pub fn merge_admission_plugins(defaults: Vec<AdmissionPlugin>, overrides: &[AdmissionPlugin]) -> Vec<AdmissionPlugin> {
    let mut merged = defaults;
    let mut appended = Vec::new();
    for plugin in overrides {
        match merged.iter().position(|d| d.name == plugin.name) {
            Some(i) => merged[i] = plugin.clone(),
            None => appended.push(plugin.clone()),
        }
    }
    merged.extend(appended);
    merged
}

const PLUGINS_1_8: &[&str] = &[
    "Priority",
    "NamespaceLifecycle",
    "LimitRanger",
    "ServiceAccount",
    "NodeRestriction",
    "DefaultStorageClass",
    "PersistentVolumeLabel",
    "DefaultTolerationSeconds",
    "ResourceQuota",
];

const PLUGINS_1_9: &[&str] = &[
    "Priority",
    "NamespaceLifecycle",
    "LimitRanger",
    "ServiceAccount",
    "NodeRestriction",
    "DefaultStorageClass",
    "PersistentVolumeLabel",
    "DefaultTolerationSeconds",
    "MutatingAdmissionWebhook",
    "ValidatingAdmissionWebhook",
    "ResourceQuota",
];

const PLUGINS_1_10: &[&str] = &[
    "Priority",
    "NamespaceLifecycle",
    "LimitRanger",
    "PodSecurityPolicy",
    "ServiceAccount",
    "NodeRestriction",
    "DefaultStorageClass",
    "PersistentVolumeLabel",
    "DefaultTolerationSeconds",
    "StorageObjectInUseProtection",
    "MutatingAdmissionWebhook",
    "ValidatingAdmissionWebhook",
    "ResourceQuota",
];

// PersistentVolumeLabel moved to the cloud-controller-manager.
const PLUGINS_1_12: &[&str] = &[
    "Priority",
    "NamespaceLifecycle",
    "LimitRanger",
    "PodSecurityPolicy",
    "ServiceAccount",
    "NodeRestriction",
    "DefaultStorageClass",
    "DefaultTolerationSeconds",
    "StorageObjectInUseProtection",
    "MutatingAdmissionWebhook",
    "ValidatingAdmissionWebhook",
    "ResourceQuota",
];

const TABLES: &[((u32, u32), &[&str])] = &[((1, 8), PLUGINS_1_8), ((1, 9), PLUGINS_1_9), ((1, 10), PLUGINS_1_10), ((1, 12), PLUGINS_1_12)];

/// Ordered default plugins for a version: the newest table not above the version's
/// minor. Versions older than every table get the oldest one.
pub fn default_plugins_for_version(version: &KubernetesVersion) -> Vec<AdmissionPlugin> {
    let key = (version.major, version.minor);
    let table = TABLES
        .iter()
        .rev()
        .find(|(v, _)| *v <= key)
        .map(|(_, t)| *t)
        .unwrap_or(PLUGINS_1_8);
    table.iter().map(|n| AdmissionPlugin::named(*n)).collect()
}
