use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use k8s_openapi::api::apps::v1::Deployment;
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};
use trellis_apply::{ChartApplier, HelmChartApplier, HelmRenderer};
use trellis_cloud::provider_from_selection;
use trellis_controlplane::{collect_artifacts, ClusterConfig, Collaborators, ComponentValues, ControlPlane, ImageVector};
use trellis_core::{
    default_plugins_for_version, merge_admission_plugins, size_for, AdmissionPlugin, ChecksumMap, Error, KubernetesVersion,
    Values,
};
use trellis_kubehub::{get_kube_client, KubeSeedClient, PollingResolver, SeedClient};

#[derive(Parser, Debug)]
#[command(name = "trellisctl", version, about = "Trellis control-plane CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Cluster file
    #[arg(short = 'c', long = "config", global = true, env = "TRELLIS_CONFIG", default_value = "cluster.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
    Yaml,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one reconciliation pass against the seed
    Reconcile,
    /// Synthesize chart values for every release without applying them
    Render {
        /// Print effective values (overrides win) instead of the two layers
        #[arg(long = "merged", action = ArgAction::SetTrue)]
        merged: bool,
        /// Run helm template on the values and print the manifests
        #[arg(long = "manifests", action = ArgAction::SetTrue, conflicts_with = "merged")]
        manifests: bool,
        /// Do not contact the seed; treat live state and secrets as absent
        #[arg(long = "offline", action = ArgAction::SetTrue)]
        offline: bool,
        /// Seed API server version to resolve images for when offline
        /// (defaults to the shoot version)
        #[arg(long = "seed-version", requires = "offline")]
        seed_version: Option<String>,
    },
    /// Let the provider rewrite the cloud provider config map
    RefreshCloudConfig,
    /// Show API server resources for a node count
    Size { node_count: i64 },
    /// Show the admission plugins for a Kubernetes version
    Plugins {
        version: String,
        /// YAML list of plugin overrides ({name, config?})
        #[arg(long = "overrides")]
        overrides: Option<PathBuf>,
    },
}

fn init_tracing() {
    let env = std::env::var("TRELLIS_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("TRELLIS_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid TRELLIS_METRICS_ADDR; expected host:port");
        }
    }
}

fn print_structured<T: Serialize>(output: Output, value: &T) -> Result<()> {
    match output {
        Output::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Output::Yaml | Output::Human => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

/// Stand-in seed and chart applier for `render --offline`: every read is
/// not-found, every write fails, the server version is fixed.
#[derive(Clone)]
struct Offline {
    server_version: KubernetesVersion,
}

#[async_trait]
impl SeedClient for Offline {
    async fn get_config_map(&self, _namespace: &str, name: &str) -> trellis_core::Result<BTreeMap<String, String>> {
        Err(Error::not_found("ConfigMap", name))
    }

    async fn update_config_map(&self, _namespace: &str, name: &str, _data: BTreeMap<String, String>) -> trellis_core::Result<()> {
        Err(Error::Config(format!("offline: cannot update config map {}", name)))
    }

    async fn get_deployment(&self, _namespace: &str, name: &str) -> trellis_core::Result<Deployment> {
        Err(Error::not_found("Deployment", name))
    }

    async fn get_secret(&self, _namespace: &str, name: &str) -> trellis_core::Result<BTreeMap<String, Vec<u8>>> {
        Err(Error::not_found("Secret", name))
    }

    async fn apply_secret(
        &self,
        _namespace: &str,
        name: &str,
        _secret_type: &str,
        _data: BTreeMap<String, Vec<u8>>,
    ) -> trellis_core::Result<()> {
        Err(Error::Config(format!("offline: cannot apply secret {}", name)))
    }

    async fn delete_service(&self, _namespace: &str, name: &str) -> trellis_core::Result<()> {
        Err(Error::Config(format!("offline: cannot delete service {}", name)))
    }

    async fn server_version(&self) -> trellis_core::Result<KubernetesVersion> {
        Ok(self.server_version.clone())
    }
}

#[async_trait]
impl ChartApplier for Offline {
    async fn apply(
        &self,
        _chart: &Path,
        release: &str,
        _namespace: &str,
        _defaults: Option<Values>,
        _overrides: Option<Values>,
    ) -> trellis_core::Result<()> {
        Err(Error::chart(release, "offline: charts are not applied"))
    }
}

/// How `build` reaches the seed.
enum SeedMode {
    Live,
    /// No cluster access; images resolve for the given seed version.
    Offline(Option<KubernetesVersion>),
}

/// Load the cluster file and wire up the collaborators. The seed secrets are
/// read here; their checksums and the admin credentials feed synthesis.
async fn build(config: &Path, mode: SeedMode) -> Result<(ControlPlane, ChecksumMap)> {
    let cfg = ClusterConfig::load(config).with_context(|| format!("loading {}", config.display()))?;
    let cloud = provider_from_selection(&cfg.provider)?;
    let images = ImageVector::load(&cfg.image_vector)?;
    info!(ns = %cfg.shoot.namespace, provider = %cloud.name(), version = %cfg.shoot.kubernetes.version, "cluster config loaded");

    let (seed, charts): (Arc<dyn SeedClient>, Arc<dyn ChartApplier>) = match mode {
        SeedMode::Offline(version) => {
            let server_version = version.unwrap_or_else(|| {
                warn!(version = %cfg.shoot.kubernetes.version, "no --seed-version, resolving images for the shoot version");
                cfg.shoot.kubernetes.version.clone()
            });
            let offline = Offline { server_version };
            (Arc::new(offline.clone()), Arc::new(offline))
        }
        SeedMode::Live => {
            let client = get_kube_client().await?;
            (Arc::new(KubeSeedClient::new(client.clone())), Arc::new(HelmChartApplier::new(client)))
        }
    };
    let artifacts = collect_artifacts(seed.as_ref(), &cfg.shoot.namespace).await?;
    if artifacts.basic_auth.is_none() {
        warn!(ns = %cfg.shoot.namespace, "kubecfg secret not found");
    }

    let collab = Collaborators { seed, charts, cloud, images: Arc::new(images), dns: Arc::new(PollingResolver::from_env()) };
    Ok((ControlPlane::new(cfg.operation(artifacts.basic_auth), collab), artifacts.checksums))
}

fn print_values(output: Output, releases: &[ComponentValues], merged: bool) -> Result<()> {
    if !merged {
        return print_structured(output, &releases);
    }
    let effective: BTreeMap<&str, Values> = releases.iter().map(|r| (r.release.as_str(), r.merged())).collect();
    print_structured(output, &effective)
}

async fn print_manifests(releases: &[ComponentValues], namespace: &str) -> Result<()> {
    let renderer = HelmRenderer::from_env();
    for r in releases {
        let docs = renderer.render(&r.chart, &r.release, namespace, r.defaults.as_ref(), r.overrides.as_ref()).await?;
        println!("# release: {}", r.release);
        for doc in docs {
            println!("---\n{}", doc);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Reconcile => {
            let (cp, mut checksums) = build(&cli.config, SeedMode::Live).await?;
            let report = tokio::select! {
                r = cp.reconcile(&mut checksums) => r?,
                _ = signal::ctrl_c() => bail!("interrupted; the next pass resumes from scratch"),
            };
            match cli.output {
                Output::Human => {
                    println!("namespace: {}", report.namespace);
                    println!("api server: {}", report.api_server_ip);
                    for release in &report.releases {
                        println!("applied {}", release);
                    }
                }
                _ => print_structured(cli.output, &report)?,
            }
        }
        Commands::Render { merged, manifests, offline, seed_version } => {
            let mode = if offline {
                SeedMode::Offline(seed_version.as_deref().map(str::parse).transpose()?)
            } else {
                SeedMode::Live
            };
            let (cp, checksums) = build(&cli.config, mode).await?;
            let releases = cp.render_all(&checksums).await?;
            if manifests {
                print_manifests(&releases, cp.operation().namespace()).await?;
            } else {
                print_values(cli.output, &releases, merged)?;
            }
        }
        Commands::RefreshCloudConfig => {
            let (cp, mut checksums) = build(&cli.config, SeedMode::Live).await?;
            if cp.refresh_cloud_provider_config(&mut checksums).await? {
                let sum = checksums.get(trellis_core::names::CLOUD_PROVIDER_CONFIG).unwrap_or_default();
                match cli.output {
                    Output::Human => println!("cloud provider config refreshed (checksum {})", sum),
                    _ => print_structured(cli.output, &serde_json::json!({ "refreshed": true, "checksum": sum }))?,
                }
            } else {
                match cli.output {
                    Output::Human => println!("no cloud provider config deployed yet; nothing to refresh"),
                    _ => print_structured(cli.output, &serde_json::json!({ "refreshed": false }))?,
                }
            }
        }
        Commands::Size { node_count } => {
            let profile = size_for(node_count);
            match cli.output {
                Output::Human => println!(
                    "requests: cpu={} memory={}\nlimits:   cpu={} memory={}",
                    profile.cpu_request, profile.memory_request, profile.cpu_limit, profile.memory_limit
                ),
                _ => print_structured(cli.output, &profile)?,
            }
        }
        Commands::Plugins { version, overrides } => {
            let version: KubernetesVersion = version.parse()?;
            let overrides: Vec<AdmissionPlugin> = match overrides {
                Some(path) => {
                    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
                    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
                }
                None => Vec::new(),
            };
            let plugins = merge_admission_plugins(default_plugins_for_version(&version), &overrides);
            match cli.output {
                Output::Human => {
                    for p in &plugins {
                        let marker = if p.config.is_some() { " (configured)" } else { "" };
                        println!("{}{}", p.name, marker);
                    }
                }
                _ => print_structured(cli.output, &plugins)?,
            }
        }
    }
    Ok(())
}
