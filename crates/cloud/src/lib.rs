//! Cloud provider abstraction for control-plane configuration.
//!
//! A provider contributes the cloud-specific fragment of every component's chart
//! values, the cloud provider config text, and the store backup configuration.
//! The concrete provider is chosen once at startup from [`ProviderSelection`].
//!
//! # Supported Providers
//!
//! - [`LocalProvider`] - no cloud integration, no backups
//! - [`ProfileProvider`] - fragments loaded from a YAML profile

mod local;
mod profile;

pub use local::LocalProvider;
pub use profile::{Profile, ProfileProvider};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use trellis_core::{Result, Values};

/// Backup material for the main store. Either part may be absent when the
/// platform has no backup support.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackupMaterial {
    pub secret_data: Option<BTreeMap<String, Vec<u8>>>,
    pub config: Option<Values>,
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait CloudControlPlaneProvider: Send + Sync {
    /// Provider name as passed to `--cloud-provider`.
    fn name(&self) -> String;

    async fn generate_backup_config(&self) -> Result<BackupMaterial>;

    async fn generate_cloud_provider_config(&self) -> Result<String>;

    /// Return the complete updated config map data for `current`, e.g. after a
    /// credential rotation.
    fn refresh_cloud_provider_config(&self, current: BTreeMap<String, String>) -> BTreeMap<String, String>;

    async fn generate_kube_apiserver_config(&self) -> Result<Values>;

    async fn generate_kube_controller_manager_config(&self) -> Result<Values>;

    async fn generate_cloud_controller_manager_config(&self) -> Result<Values>;

    async fn generate_kube_scheduler_config(&self) -> Result<Values>;
}

/// Which provider to run with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ProviderSelection {
    Local,
    Profile { path: PathBuf },
}

impl Default for ProviderSelection {
    fn default() -> Self {
        ProviderSelection::Local
    }
}

pub fn provider_from_selection(selection: &ProviderSelection) -> Result<Arc<dyn CloudControlPlaneProvider>> {
    match selection {
        ProviderSelection::Local => Ok(Arc::new(LocalProvider::new())),
        ProviderSelection::Profile { path } => Ok(Arc::new(ProfileProvider::load(path)?)),
    }
}
