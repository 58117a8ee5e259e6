use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use trellis_core::{names, Error, Result, Values};

use crate::{BackupMaterial, CloudControlPlaneProvider};

/// Profile file contents.
///
/// ```yaml
/// name: openstack
/// cloudProviderConfig: |
///   [Global]
///   auth-url=https://keystone.example.com/v3
/// backup:
///   secret:
///     username: etcd
///   config:
///     storageProvider: Swift
///     storageContainer: shoot--dev--a
/// components:
///   kube-apiserver:
///     environment: []
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub cloud_provider_config: String,
    #[serde(default)]
    pub backup: Option<BackupProfile>,
    /// Per-component chart value fragments, keyed by deployment name.
    #[serde(default)]
    pub components: BTreeMap<String, Values>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupProfile {
    #[serde(default)]
    pub secret: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub config: Option<Values>,
}

/// Provider whose contributions are read from a [`Profile`].
#[derive(Debug, Clone)]
pub struct ProfileProvider {
    profile: Profile,
}

impl ProfileProvider {
    pub fn new(profile: Profile) -> Self {
        Self { profile }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config(format!("reading profile {}: {}", path.display(), e)))?;
        let profile: Profile =
            serde_yaml::from_str(&text).map_err(|e| Error::Config(format!("parsing profile {}: {}", path.display(), e)))?;
        if profile.name.trim().is_empty() {
            return Err(Error::Config(format!("profile {} has no name", path.display())));
        }
        debug!(provider = %profile.name, components = profile.components.len(), "profile loaded");
        Ok(Self::new(profile))
    }

    fn component(&self, name: &str) -> Values {
        self.profile.components.get(name).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CloudControlPlaneProvider for ProfileProvider {
    fn name(&self) -> String {
        self.profile.name.clone()
    }

    async fn generate_backup_config(&self) -> Result<BackupMaterial> {
        let Some(backup) = &self.profile.backup else {
            return Ok(BackupMaterial::default());
        };
        Ok(BackupMaterial {
            secret_data: backup.secret.as_ref().map(|s| s.iter().map(|(k, v)| (k.clone(), v.clone().into_bytes())).collect()),
            config: backup.config.clone(),
        })
    }

    async fn generate_cloud_provider_config(&self) -> Result<String> {
        Ok(self.profile.cloud_provider_config.clone())
    }

    fn refresh_cloud_provider_config(&self, mut current: BTreeMap<String, String>) -> BTreeMap<String, String> {
        current.insert(names::CLOUD_PROVIDER_CONFIG_KEY.to_string(), self.profile.cloud_provider_config.clone());
        current
    }

    async fn generate_kube_apiserver_config(&self) -> Result<Values> {
        Ok(self.component(names::KUBE_APISERVER))
    }

    async fn generate_kube_controller_manager_config(&self) -> Result<Values> {
        Ok(self.component(names::KUBE_CONTROLLER_MANAGER))
    }

    async fn generate_cloud_controller_manager_config(&self) -> Result<Values> {
        Ok(self.component(names::CLOUD_CONTROLLER_MANAGER))
    }

    async fn generate_kube_scheduler_config(&self) -> Result<Values> {
        Ok(self.component(names::KUBE_SCHEDULER))
    }
}
