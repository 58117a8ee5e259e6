//! Per-pass operation context: what is being deployed and where.

use std::collections::BTreeMap;
use std::path::PathBuf;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use trellis_core::{AdmissionPlugin, AutoscalingMode, KubernetesVersion};

pub type FeatureGates = BTreeMap<String, bool>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeApiServerConfig {
    #[serde(default)]
    pub feature_gates: FeatureGates,
    #[serde(default)]
    pub runtime_config: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc_config: Option<Value>,
    #[serde(default)]
    pub admission_plugins: Vec<AdmissionPlugin>,
}

/// Settings shared by the controller managers and the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeComponentConfig {
    #[serde(default)]
    pub feature_gates: FeatureGates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesConfig {
    pub version: KubernetesVersion,
    #[serde(default, rename = "kubeAPIServer", skip_serializing_if = "Option::is_none")]
    pub kube_apiserver: Option<KubeApiServerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_controller_manager: Option<KubeComponentConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_controller_manager: Option<KubeComponentConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_scheduler: Option<KubeComponentConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShootNetworks {
    pub pods: String,
    pub services: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedNetworks {
    pub pods: String,
    pub services: String,
    pub nodes: String,
}

/// The managed cluster whose control plane is deployed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shoot {
    /// Namespace in the seed hosting the control plane. Doubles as the cluster name.
    pub namespace: String,
    pub api_server_address: String,
    /// Sum of the worker pools' maximum sizes.
    #[serde(default)]
    pub node_count: i64,
    pub kubernetes: KubernetesConfig,
    pub networks: ShootNetworks,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seed {
    pub networks: SeedNetworks,
}

/// Basic-auth credentials of the shoot's admin kubeconfig.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl BasicAuth {
    /// `base64("<username>:<password>")`, as sent by the health checks.
    pub fn health_check_credentials(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", self.username, self.password))
    }
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth").field("username", &self.username).field("password", &"<redacted>").finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub shoot: Shoot,
    pub seed: Seed,
    pub autoscaling: AutoscalingMode,
    pub charts_dir: PathBuf,
    /// Read from the `kubecfg` secret; `None` leaves health check credentials out.
    pub basic_auth: Option<BasicAuth>,
}

impl Operation {
    pub fn namespace(&self) -> &str {
        &self.shoot.namespace
    }

    pub fn chart(&self, name: &str) -> PathBuf {
        self.charts_dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_check_credentials_are_base64_user_colon_password() {
        let auth = BasicAuth { username: "admin".into(), password: "s3cret".into() };
        assert_eq!(auth.health_check_credentials(), "YWRtaW46czNjcmV0");
        assert!(!format!("{:?}", auth).contains("s3cret"));
    }

    #[test]
    fn kubernetes_config_reads_camel_case_keys() {
        let yaml = r#"
version: v1.12.3
kubeAPIServer:
  featureGates: {PodPriority: true}
  runtimeConfig: {"batch/v2alpha1": true}
  admissionPlugins:
  - name: PodNodeSelector
    config: {podNodeSelectorPluginConfig: {clusterDefaultNodeSelector: "role=worker"}}
kubeScheduler:
  featureGates: {TaintNodesByCondition: false}
"#;
        let cfg: KubernetesConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.version.to_string(), "1.12.3");
        let api = cfg.kube_apiserver.unwrap();
        assert_eq!(api.feature_gates.get("PodPriority"), Some(&true));
        assert_eq!(api.admission_plugins[0].name, "PodNodeSelector");
        assert!(api.admission_plugins[0].config.is_some());
        assert!(cfg.kube_controller_manager.is_none());
        assert_eq!(cfg.kube_scheduler.unwrap().feature_gates.get("TaintNodesByCondition"), Some(&false));
    }
}
