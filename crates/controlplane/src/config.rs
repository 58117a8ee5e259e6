//! Cluster file: everything a pass needs that is not read from the seed.
//!
//! ```yaml
//! shoot:
//!   namespace: shoot--dev--a
//!   apiServerAddress: api.a.dev.example.com
//!   nodeCount: 5
//!   kubernetes:
//!     version: "1.12.3"
//!   networks: {pods: 100.96.0.0/11, services: 100.64.0.0/13}
//! seed:
//!   networks: {pods: 10.241.128.0/17, services: 10.241.0.0/17, nodes: 10.240.0.0/16}
//! autoscaling:
//!   mode: liveDriven
//! provider:
//!   type: local
//! imageVector: images.yaml
//! chartsDir: charts/seed-controlplane
//! ```
//!
//! Relative paths resolve against the file's directory. `TRELLIS_CHARTS_DIR`
//! overrides `chartsDir`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use trellis_cloud::ProviderSelection;
use trellis_core::{AutoscalingMode, Error, Result};

use crate::operation::{BasicAuth, Operation, Seed, Shoot};

fn default_autoscaling() -> AutoscalingMode {
    AutoscalingMode::LiveDriven
}

fn default_charts_dir() -> PathBuf {
    PathBuf::from("charts")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub shoot: Shoot,
    pub seed: Seed,
    #[serde(default = "default_autoscaling")]
    pub autoscaling: AutoscalingMode,
    #[serde(default)]
    pub provider: ProviderSelection,
    pub image_vector: PathBuf,
    #[serde(default = "default_charts_dir")]
    pub charts_dir: PathBuf,
}

impl ClusterConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config(format!("reading {}: {}", path.display(), e)))?;
        let mut cfg = Self::from_yaml(&text)?;
        if let Some(dir) = std::env::var_os("TRELLIS_CHARTS_DIR") {
            cfg.charts_dir = PathBuf::from(dir);
        }
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        cfg.resolve_paths(base);
        debug!(path = %path.display(), ns = %cfg.shoot.namespace, "cluster config loaded");
        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let cfg: ClusterConfig = serde_yaml::from_str(text).map_err(|e| Error::Config(format!("parsing cluster config: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.shoot.namespace.trim().is_empty() {
            return Err(Error::Config("shoot.namespace must not be empty".into()));
        }
        if self.shoot.api_server_address.trim().is_empty() {
            return Err(Error::Config("shoot.apiServerAddress must not be empty".into()));
        }
        if self.shoot.node_count < 0 {
            return Err(Error::Config(format!("shoot.nodeCount must not be negative, got {}", self.shoot.node_count)));
        }
        if let AutoscalingMode::Centralized(s) = &self.autoscaling {
            if s.min_replicas > s.max_replicas {
                return Err(Error::Config(format!(
                    "autoscaling.minReplicas ({}) exceeds maxReplicas ({})",
                    s.min_replicas, s.max_replicas
                )));
            }
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.image_vector);
        resolve(&mut self.charts_dir);
        if let ProviderSelection::Profile { path } = &mut self.provider {
            resolve(path);
        }
    }

    pub fn operation(&self, basic_auth: Option<BasicAuth>) -> Operation {
        Operation {
            shoot: self.shoot.clone(),
            seed: self.seed.clone(),
            autoscaling: self.autoscaling,
            charts_dir: self.charts_dir.clone(),
            basic_auth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::StaticScale;

    const CONFIG: &str = r#"
shoot:
  namespace: shoot--dev--a
  apiServerAddress: api.a.dev.example.com
  nodeCount: 5
  kubernetes:
    version: v1.12.3
    kubeAPIServer:
      featureGates: {PodPriority: true}
  networks:
    pods: 100.96.0.0/11
    services: 100.64.0.0/13
seed:
  networks:
    pods: 10.241.128.0/17
    services: 10.241.0.0/17
    nodes: 10.240.0.0/16
autoscaling:
  mode: centralized
  replicas: 2
  minReplicas: 2
  maxReplicas: 4
provider:
  type: profile
  path: providers/openstack.yaml
imageVector: images.yaml
"#;

    #[test]
    fn loads_and_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.yaml");
        std::fs::write(&path, CONFIG).unwrap();
        let cfg = ClusterConfig::load(&path).unwrap();
        assert_eq!(cfg.autoscaling, AutoscalingMode::Centralized(StaticScale { replicas: 2, min_replicas: 2, max_replicas: 4 }));
        assert_eq!(cfg.image_vector, dir.path().join("images.yaml"));
        assert_eq!(cfg.provider, ProviderSelection::Profile { path: dir.path().join("providers/openstack.yaml") });
        assert_eq!(cfg.shoot.kubernetes.version.to_string(), "1.12.3");
        let op = cfg.operation(None);
        assert_eq!(op.namespace(), "shoot--dev--a");
        assert!(op.basic_auth.is_none());
    }

    #[test]
    fn autoscaling_defaults_to_live_driven() {
        let text = CONFIG.split("autoscaling:").next().unwrap().to_string() + "imageVector: images.yaml\n";
        let cfg = ClusterConfig::from_yaml(&text).unwrap();
        assert_eq!(cfg.autoscaling, AutoscalingMode::LiveDriven);
        assert_eq!(cfg.provider, ProviderSelection::Local);
        assert_eq!(cfg.charts_dir, PathBuf::from("charts"));
    }

    #[test]
    fn rejects_invalid_version() {
        let text = CONFIG.replace("v1.12.3", "twelve");
        assert!(matches!(ClusterConfig::from_yaml(&text), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_inverted_scale_bounds() {
        let text = CONFIG.replace("minReplicas: 2", "minReplicas: 5");
        let err = ClusterConfig::from_yaml(&text).unwrap_err();
        assert!(err.to_string().contains("exceeds maxReplicas"), "{}", err);
    }

    #[test]
    fn rejects_negative_node_count() {
        let text = CONFIG.replace("nodeCount: 5", "nodeCount: -1");
        assert!(ClusterConfig::from_yaml(&text).is_err());
    }
}
