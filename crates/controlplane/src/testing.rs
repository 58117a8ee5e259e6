//! Fixtures shared by the synthesizer unit tests.

use std::path::PathBuf;
use std::sync::Arc;

use trellis_apply::MockChartApplier;
use trellis_cloud::{BackupMaterial, MockCloudControlPlaneProvider};
use trellis_core::{AutoscalingMode, ChecksumMap, Error, Values};
use trellis_kubehub::{MockHostResolver, MockSeedClient};

use crate::images::{ImageSource, ImageVector};
use crate::operation::{BasicAuth, KubernetesConfig, Operation, Seed, SeedNetworks, Shoot, ShootNetworks};
use crate::{Collaborators, ControlPlane};

pub const NAMESPACE: &str = "shoot--dev--a";

pub fn operation(autoscaling: AutoscalingMode) -> Operation {
    Operation {
        shoot: Shoot {
            namespace: NAMESPACE.to_string(),
            api_server_address: "api.a.dev.example.com".to_string(),
            node_count: 5,
            kubernetes: KubernetesConfig {
                version: "1.12.3".parse().unwrap(),
                kube_apiserver: None,
                kube_controller_manager: None,
                cloud_controller_manager: None,
                kube_scheduler: None,
            },
            networks: ShootNetworks {
                pods: "100.96.0.0/11".to_string(),
                services: "100.64.0.0/13".to_string(),
                nodes: Some("10.250.0.0/16".to_string()),
            },
        },
        seed: Seed {
            networks: SeedNetworks {
                pods: "10.241.128.0/17".to_string(),
                services: "10.241.0.0/17".to_string(),
                nodes: "10.240.0.0/16".to_string(),
            },
        },
        autoscaling,
        charts_dir: PathBuf::from("charts/seed-controlplane"),
        basic_auth: Some(BasicAuth { username: "admin".to_string(), password: "s3cret".to_string() }),
    }
}

pub fn image_vector() -> ImageVector {
    let image = |name: &str, repository: &str, tag: Option<&str>| ImageSource {
        name: name.to_string(),
        repository: repository.to_string(),
        tag: tag.map(str::to_string),
        versions: Vec::new(),
    };
    ImageVector::new(vec![
        image("hyperkube", "k8s.gcr.io/hyperkube", None),
        image("vpn-seed", "eu.gcr.io/gardener-project/gardener/vpn-seed", Some("0.9.0")),
        image("blackbox-exporter", "quay.io/prometheus/blackbox-exporter", Some("v0.12.0")),
        image("etcd", "quay.io/coreos/etcd", Some("v3.3.10")),
        image("etcd-backup-restore", "eu.gcr.io/gardener-project/gardener/etcdbrctl", Some("0.3.0")),
    ])
}

/// Every artifact the synthesizers reference, with value `sum-<artifact>`.
pub fn checksums() -> ChecksumMap {
    [
        "ca",
        "ca-front-proxy",
        "kube-apiserver",
        "kube-aggregator",
        "kube-apiserver-kubelet",
        "kube-apiserver-basic-auth",
        "vpn-seed",
        "vpn-seed-tlsauth",
        "service-account-key",
        "ca-etcd",
        "etcd-server-tls",
        "etcd-client-tls",
        "kube-controller-manager",
        "cloudprovider",
        "cloud-provider-config",
        "cloud-controller-manager",
        "kube-scheduler",
    ]
    .into_iter()
    .map(|a| (a.to_string(), format!("sum-{}", a)))
    .collect()
}

/// Provider contributing one marker key per component and no backups.
pub fn cloud() -> MockCloudControlPlaneProvider {
    let fragment = |component: &str| {
        let mut v = Values::new();
        v.insert("cloud".to_string(), component.into());
        v
    };
    let mut cloud = MockCloudControlPlaneProvider::new();
    cloud.expect_name().returning(|| "openstack".to_string());
    cloud.expect_generate_backup_config().returning(|| Ok(BackupMaterial::default()));
    cloud.expect_generate_cloud_provider_config().returning(|| Ok("[Global]\nauth-url=https://keystone\n".to_string()));
    let f = fragment("kube-apiserver");
    cloud.expect_generate_kube_apiserver_config().returning(move || Ok(f.clone()));
    let f = fragment("kube-controller-manager");
    cloud.expect_generate_kube_controller_manager_config().returning(move || Ok(f.clone()));
    let f = fragment("cloud-controller-manager");
    cloud.expect_generate_cloud_controller_manager_config().returning(move || Ok(f.clone()));
    let f = fragment("kube-scheduler");
    cloud.expect_generate_kube_scheduler_config().returning(move || Ok(f.clone()));
    cloud
}

/// Seed API server version the fixture seeds report.
pub const SEED_VERSION: &str = "1.12.3";

/// Seed that only answers the server version query.
pub fn seed_at(version: &'static str) -> MockSeedClient {
    let mut seed = MockSeedClient::new();
    seed.expect_server_version().returning(move || version.parse());
    seed
}

/// Seed without any live deployments.
pub fn empty_seed() -> MockSeedClient {
    let mut seed = seed_at(SEED_VERSION);
    seed.expect_get_deployment().returning(|_, name| Err(Error::not_found("Deployment", name)));
    seed
}

pub struct Fixture {
    pub op: Operation,
    pub seed: MockSeedClient,
    pub charts: MockChartApplier,
    pub cloud: MockCloudControlPlaneProvider,
    pub dns: MockHostResolver,
}

impl Fixture {
    pub fn new(autoscaling: AutoscalingMode) -> Self {
        Self {
            op: operation(autoscaling),
            seed: empty_seed(),
            charts: MockChartApplier::new(),
            cloud: cloud(),
            dns: MockHostResolver::new(),
        }
    }

    pub fn live_driven() -> Self {
        Self::new(AutoscalingMode::LiveDriven)
    }

    pub fn build(self) -> ControlPlane {
        ControlPlane::new(
            self.op,
            Collaborators {
                seed: Arc::new(self.seed),
                charts: Arc::new(self.charts),
                cloud: Arc::new(self.cloud),
                images: Arc::new(image_vector()),
                dns: Arc::new(self.dns),
            },
        )
    }
}
