use std::collections::BTreeMap;

use async_trait::async_trait;
use trellis_core::{Result, Values};

use crate::{BackupMaterial, CloudControlPlaneProvider};

/// Provider for seeds without a cloud integration (kind, bare metal).
/// Contributes nothing and supports no backups.
#[derive(Debug, Clone, Default)]
pub struct LocalProvider;

impl LocalProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CloudControlPlaneProvider for LocalProvider {
    fn name(&self) -> String {
        "local".to_string()
    }

    async fn generate_backup_config(&self) -> Result<BackupMaterial> {
        Ok(BackupMaterial::default())
    }

    async fn generate_cloud_provider_config(&self) -> Result<String> {
        Ok(String::new())
    }

    fn refresh_cloud_provider_config(&self, current: BTreeMap<String, String>) -> BTreeMap<String, String> {
        current
    }

    async fn generate_kube_apiserver_config(&self) -> Result<Values> {
        Ok(Values::new())
    }

    async fn generate_kube_controller_manager_config(&self) -> Result<Values> {
        Ok(Values::new())
    }

    async fn generate_cloud_controller_manager_config(&self) -> Result<Values> {
        Ok(Values::new())
    }

    async fn generate_kube_scheduler_config(&self) -> Result<Values> {
        Ok(Values::new())
    }
}
