//! Trellis control plane: chart values synthesis and deployment for the control
//! plane of a shoot hosted in a seed namespace.
//!
//! One reconciliation pass runs, in order:
//! 1. cloud provider config (writes its checksum)
//! 2. store, `main` then `events`
//! 3. kube-apiserver (after its address resolves)
//! 4. kube-controller-manager
//! 5. cloud-controller-manager
//! 6. kube-scheduler
//!
//! The first error aborts the pass. Components applied before it stay in place
//! and the next pass starts over.

#![forbid(unsafe_code)]

mod apiserver;
mod artifacts;
mod cloud_config;
mod cloud_controller_manager;
pub mod config;
mod controller_manager;
mod etcd;
pub mod images;
pub mod operation;
mod scheduler;

pub use artifacts::{collect_artifacts, referenced_secrets, Artifacts};
pub use config::ClusterConfig;
pub use images::{ImageResolver, ImageSource, ImageVector};
pub use operation::{BasicAuth, Operation};

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};
use trellis_apply::ChartApplier;
use trellis_cloud::CloudControlPlaneProvider;
use trellis_core::{ChecksumMap, ChecksumRef, Result, Values};
use trellis_kubehub::{HostResolver, SeedClient};

/// External services a pass talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub seed: Arc<dyn SeedClient>,
    pub charts: Arc<dyn ChartApplier>,
    pub cloud: Arc<dyn CloudControlPlaneProvider>,
    pub images: Arc<dyn ImageResolver>,
    pub dns: Arc<dyn HostResolver>,
}

/// Synthesized chart input for one release. The two layers stay separate until
/// they reach the chart applier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentValues {
    pub release: String,
    pub chart: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<Values>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Values>,
}

impl ComponentValues {
    /// Effective values with overrides winning, for previews only.
    pub fn merged(&self) -> Values {
        let empty = Values::new();
        trellis_apply::merge_layers(self.defaults.as_ref().unwrap_or(&empty), self.overrides.as_ref().unwrap_or(&empty))
    }

    pub fn pod_annotations(&self) -> Option<&Values> {
        self.defaults
            .as_ref()
            .and_then(|d| d.get("podAnnotations"))
            .or_else(|| self.overrides.as_ref().and_then(|o| o.get("podAnnotations")))
            .and_then(Value::as_object)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub namespace: String,
    pub api_server_ip: IpAddr,
    /// Releases in the order they were applied.
    pub releases: Vec<String>,
}

pub struct ControlPlane {
    op: Operation,
    collab: Collaborators,
}

impl ControlPlane {
    pub fn new(op: Operation, collab: Collaborators) -> Self {
        Self { op, collab }
    }

    pub fn operation(&self) -> &Operation {
        &self.op
    }

    /// Run one full reconciliation pass. `checksums` gains the cloud provider
    /// config entry; everything else only reads it.
    pub async fn reconcile(&self, checksums: &mut ChecksumMap) -> Result<ReconcileReport> {
        let t0 = Instant::now();
        counter!("controlplane_reconcile_total", 1u64);
        let result = self.reconcile_inner(checksums).await;
        match &result {
            Ok(report) => {
                histogram!("controlplane_reconcile_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
                info!(ns = %report.namespace, releases = report.releases.len(), "control plane reconciled");
            }
            Err(e) => {
                counter!("controlplane_reconcile_err", 1u64);
                error!(ns = %self.op.namespace(), error = %e, "control plane reconcile failed");
            }
        }
        result
    }

    async fn reconcile_inner(&self, checksums: &mut ChecksumMap) -> Result<ReconcileReport> {
        let mut releases = Vec::new();

        self.deploy_cloud_provider_config(checksums).await?;
        releases.push(trellis_core::names::CLOUD_PROVIDER_CONFIG.to_string());

        let checksums = &*checksums;
        releases.extend(self.deploy_etcd(checksums).await?);

        let api_server_ip = self.deploy_kube_apiserver(checksums).await?;
        releases.push(trellis_core::names::KUBE_APISERVER.to_string());

        self.deploy_kube_controller_manager(checksums).await?;
        releases.push(trellis_core::names::KUBE_CONTROLLER_MANAGER.to_string());

        self.deploy_cloud_controller_manager(checksums).await?;
        releases.push(trellis_core::names::CLOUD_CONTROLLER_MANAGER.to_string());

        self.deploy_kube_scheduler(checksums).await?;
        releases.push(trellis_core::names::KUBE_SCHEDULER.to_string());

        Ok(ReconcileReport { namespace: self.op.namespace().to_string(), api_server_ip, releases })
    }

    /// Synthesize every release of a pass without applying anything. The
    /// cloud provider config checksum is computed into a copy of `checksums`.
    pub async fn render_all(&self, checksums: &ChecksumMap) -> Result<Vec<ComponentValues>> {
        let mut checksums = checksums.clone();
        let (cloud_config, checksum) = self.cloud_provider_config_values().await?;
        checksums.insert(trellis_core::names::CLOUD_PROVIDER_CONFIG, checksum);

        let mut out = vec![cloud_config];
        let backup = self.collab.cloud.generate_backup_config().await?;
        out.extend(self.etcd_values(&checksums, &backup).await?.into_iter().map(|(_, v)| v));
        out.push(self.kube_apiserver_values(&checksums).await?);
        out.push(self.kube_controller_manager_values(&checksums).await?);
        out.push(self.cloud_controller_manager_values(&checksums).await?);
        out.push(self.kube_scheduler_values(&checksums).await?);
        Ok(out)
    }

    async fn apply(&self, values: ComponentValues) -> Result<()> {
        let ComponentValues { release, chart, defaults, overrides } = values;
        debug!(release = %release, chart = %chart.display(), "applying chart");
        self.collab.charts.apply(&chart, &release, self.op.namespace(), defaults, overrides).await?;
        counter!("controlplane_component_deployed_total", 1u64, "release" => release.clone());
        info!(release = %release, ns = %self.op.namespace(), "component deployed");
        Ok(())
    }

    /// Resolve `names` into `values` against the seed's server version, the
    /// version the image vector is keyed by.
    async fn inject_images(&self, values: Values, names: &[(&str, &str)]) -> Result<Values> {
        let seed_version = self.collab.seed.server_version().await?;
        self.collab.images.resolve(values, &seed_version, names)
    }

    /// Live replica count of a deployment; `None` when it does not exist.
    async fn live_replicas(&self, deployment: &str) -> Result<Option<i32>> {
        match self.collab.seed.get_deployment(self.op.namespace(), deployment).await {
            Ok(d) => Ok(d.spec.and_then(|s| s.replicas)),
            Err(e) if e.is_not_found() => {
                debug!(deployment = %deployment, "no live deployment, using chart default replicas");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// `podAnnotations` value for the given checksum references.
fn pod_annotations(checksums: &ChecksumMap, refs: &[ChecksumRef]) -> Value {
    Value::Object(checksums.annotations(refs).into_iter().map(|(k, v)| (k, Value::String(v))).collect())
}

fn into_values(v: Value) -> Values {
    match v {
        Value::Object(m) => m,
        _ => Values::new(),
    }
}

#[cfg(test)]
pub(crate) mod testing;
