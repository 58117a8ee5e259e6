//! Trellis apply: render charts with layered values and server-side apply the result.

#![forbid(unsafe_code)]

pub mod manifest;
pub mod values;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use kube::{
    api::{Api, Patch, PatchParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    discovery::{Discovery, Scope},
    Client,
};
use metrics::{counter, histogram};
use tracing::{debug, info, Level};
use trellis_core::{Error, Result, Values};

pub use manifest::{diff_against_live, diff_summary, split_manifests, DiffSummary};
pub use values::merge_layers;

/// Renders a chart and applies it to the seed.
///
/// `defaults` and `overrides` are independent precedence layers; `overrides`
/// wins on key conflicts. Either layer may be absent.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ChartApplier: Send + Sync {
    async fn apply(
        &self,
        chart: &Path,
        release: &str,
        namespace: &str,
        defaults: Option<Values>,
        overrides: Option<Values>,
    ) -> Result<()>;
}

/// Runs `helm template` with layered values files. Needs no cluster access.
#[derive(Debug, Clone)]
pub struct HelmRenderer {
    helm_bin: PathBuf,
}

impl HelmRenderer {
    pub fn new(helm_bin: impl Into<PathBuf>) -> Self {
        Self { helm_bin: helm_bin.into() }
    }

    /// `TRELLIS_HELM_BIN`, falling back to `helm` on the `PATH`.
    pub fn from_env() -> Self {
        Self::new(std::env::var_os("TRELLIS_HELM_BIN").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("helm")))
    }

    /// Render the chart into individual manifest documents.
    pub async fn render(
        &self,
        chart: &Path,
        release: &str,
        namespace: &str,
        defaults: Option<&Values>,
        overrides: Option<&Values>,
    ) -> Result<Vec<String>> {
        // later -f files take precedence in helm, so order is defaults then overrides
        let mut layers = Vec::new();
        for layer in [defaults, overrides].into_iter().flatten() {
            layers.push(write_values_file(layer).map_err(|e| Error::chart(release, format!("{:#}", e)))?);
        }
        let mut cmd = tokio::process::Command::new(&self.helm_bin);
        cmd.arg("template").arg(release).arg(chart).args(["--namespace", namespace]);
        for f in &layers {
            cmd.arg("--values").arg(f.path());
        }
        let output = cmd.output().await.map_err(|e| Error::chart(release, format!("failed to run helm: {}", e)))?;
        if !output.status.success() {
            return Err(Error::chart(release, format!("helm template failed: {}", String::from_utf8_lossy(&output.stderr).trim())));
        }
        let docs = split_manifests(&String::from_utf8_lossy(&output.stdout));
        debug!(release = %release, count = docs.len(), "chart rendered");
        Ok(docs)
    }
}

/// `helm template` + server-side apply of every rendered object.
pub struct HelmChartApplier {
    client: Client,
    renderer: HelmRenderer,
    field_manager: String,
}

impl HelmChartApplier {
    pub fn new(client: Client) -> Self {
        Self { client, renderer: HelmRenderer::from_env(), field_manager: "trellis".to_string() }
    }

    async fn apply_document(&self, discovery: &Discovery, release: &str, namespace: &str, doc: &str) -> anyhow::Result<()> {
        let target = manifest::parse_target(doc, Some(namespace))?;
        let (ar, namespaced) = find_api_resource(discovery, &target.gvk)?;
        let api: Api<DynamicObject> = if namespaced {
            let ns = target.namespace.as_deref().unwrap_or(namespace);
            Api::namespaced_with(self.client.clone(), ns, &ar)
        } else {
            Api::all_with(self.client.clone(), &ar)
        };

        let mut desired = target.json.clone();
        manifest::ensure_metadata(&mut desired, &target.name, if namespaced { target.namespace.as_deref() } else { None });

        // debug only; a failed read never blocks the apply
        if tracing::enabled!(Level::DEBUG) {
            let live = api.get_opt(&target.name).await.map(|o| o.and_then(|o| serde_json::to_value(o).ok()));
            if let Some(summary) = manifest::diff_against_live(&desired, live) {
                debug!(release = %release, kind = %target.gvk.kind, name = %target.name, adds = summary.adds, updates = summary.updates, removes = summary.removes, "diff vs live");
            }
        }

        let pp = PatchParams::apply(&self.field_manager).force();
        api.patch(&target.name, &pp, &Patch::Apply(&desired))
            .await
            .with_context(|| format!("server-side apply of {} {} failed", target.gvk.kind, target.name))?;
        Ok(())
    }
}

#[async_trait]
impl ChartApplier for HelmChartApplier {
    async fn apply(
        &self,
        chart: &Path,
        release: &str,
        namespace: &str,
        defaults: Option<Values>,
        overrides: Option<Values>,
    ) -> Result<()> {
        let t0 = Instant::now();
        counter!("chart_apply_total", 1u64);
        let result = async {
            let docs = self.renderer.render(chart, release, namespace, defaults.as_ref(), overrides.as_ref()).await?;
            let discovery = Discovery::new(self.client.clone())
                .run()
                .await
                .map_err(|e| Error::chart(release, format!("discovery failed: {}", e)))?;
            for doc in &docs {
                self.apply_document(&discovery, release, namespace, doc)
                    .await
                    .map_err(|e| Error::chart(release, format!("{:#}", e)))?;
            }
            Ok::<usize, Error>(docs.len())
        }
        .await;
        match result {
            Ok(objects) => {
                histogram!("chart_apply_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
                info!(release = %release, ns = %namespace, objects, "chart applied");
                Ok(())
            }
            Err(e) => {
                counter!("chart_apply_err", 1u64);
                Err(e)
            }
        }
    }
}

fn write_values_file(values: &Values) -> anyhow::Result<tempfile::NamedTempFile> {
    let mut f = tempfile::Builder::new().prefix("trellis-values-").suffix(".yaml").tempfile().context("creating values file")?;
    let yaml = serde_yaml::to_string(values).context("serializing values")?;
    f.write_all(yaml.as_bytes()).context("writing values file")?;
    f.flush()?;
    Ok(f)
}

fn find_api_resource(discovery: &Discovery, gvk: &GroupVersionKind) -> anyhow::Result<(ApiResource, bool)> {
    for group in discovery.groups() {
        for (ar, caps) in group.recommended_resources() {
            if ar.group == gvk.group && ar.version == gvk.version && ar.kind == gvk.kind {
                return Ok((ar, matches!(caps.scope, Scope::Namespaced)));
            }
        }
    }
    Err(anyhow!("GVK not found: {}/{}/{}", gvk.group, gvk.version, gvk.kind))
}
