use std::net::IpAddr;

use serde_json::{json, Value};
use tracing::{info, warn};
use trellis_core::{
    decide_replicas, default_plugins_for_version, merge_admission_plugins, names, size_for, ChecksumMap, ChecksumRef,
    ResourceLimits, Result, StoreRole,
};

use crate::{into_values, pod_annotations, ComponentValues, ControlPlane};

pub(crate) const CHECKSUMS: &[ChecksumRef] = &[
    ChecksumRef::secret("ca", "ca"),
    ChecksumRef::secret("ca-front-proxy", "ca-front-proxy"),
    ChecksumRef::secret("kube-apiserver", names::KUBE_APISERVER),
    ChecksumRef::secret("kube-aggregator", "kube-aggregator"),
    ChecksumRef::secret("kube-apiserver-kubelet", "kube-apiserver-kubelet"),
    ChecksumRef::secret("kube-apiserver-basic-auth", "kube-apiserver-basic-auth"),
    ChecksumRef::secret("vpn-seed", "vpn-seed"),
    ChecksumRef::secret("vpn-seed-tlsauth", "vpn-seed-tlsauth"),
    ChecksumRef::secret("service-account-key", "service-account-key"),
    ChecksumRef::secret("etcd-ca", "ca-etcd"),
    ChecksumRef::secret("etcd-client-tls", "etcd-client-tls"),
];

const IMAGES: &[(&str, &str)] =
    &[("hyperkube", "hyperkube"), ("vpn-seed", "vpn-seed"), ("blackbox-exporter", "blackbox-exporter")];

impl ControlPlane {
    pub async fn kube_apiserver_values(&self, checksums: &ChecksumMap) -> Result<ComponentValues> {
        let shoot = &self.op.shoot;
        let seed = &self.op.seed;
        let ns = shoot.namespace.as_str();

        let mut values = into_values(json!({
            "etcdServicePort": names::ETCD_CLIENT_PORT,
            "etcdMainServiceFqdn": StoreRole::Main.client_service_fqdn(ns),
            "etcdEventsServiceFqdn": StoreRole::Events.client_service_fqdn(ns),
            "kubernetesVersion": shoot.kubernetes.version.to_string(),
            "shootNetworks": { "service": shoot.networks.services },
            "seedNetworks": {
                "service": seed.networks.services,
                "pod": seed.networks.pods,
                "node": seed.networks.nodes,
            },
            "securePort": names::APISERVER_SECURE_PORT,
            "podAnnotations": pod_annotations(checksums, CHECKSUMS),
        }));
        match &self.op.basic_auth {
            Some(auth) => {
                values.insert("probeCredentials".into(), Value::String(auth.health_check_credentials()));
            }
            None => warn!(ns = %ns, "no basic auth credentials, health checks will run unauthenticated"),
        }

        let cloud = self.collab.cloud.generate_kube_apiserver_config().await?;

        let live = if self.op.autoscaling.is_centralized() { None } else { self.live_replicas(names::KUBE_APISERVER).await? };
        decide_replicas(&self.op.autoscaling, live).apply_to(&mut values);
        let resources = if self.op.autoscaling.is_centralized() {
            ResourceLimits::KUBE_APISERVER.to_value()
        } else {
            size_for(shoot.node_count).to_value()
        };
        values.insert("apiServerResources".into(), resources);

        let mut plugins = default_plugins_for_version(&shoot.kubernetes.version);
        if let Some(cfg) = &shoot.kubernetes.kube_apiserver {
            values.insert("featureGates".into(), serde_json::to_value(&cfg.feature_gates)?);
            values.insert("runtimeConfig".into(), serde_json::to_value(&cfg.runtime_config)?);
            if let Some(oidc) = &cfg.oidc_config {
                values.insert("oidcConfig".into(), oidc.clone());
            }
            plugins = merge_admission_plugins(plugins, &cfg.admission_plugins);
        }
        values.insert("admissionPlugins".into(), serde_json::to_value(&plugins)?);

        let values = self.inject_images(values, IMAGES).await?;
        Ok(ComponentValues {
            release: names::KUBE_APISERVER.to_string(),
            chart: self.op.chart(names::KUBE_APISERVER),
            defaults: Some(values),
            overrides: Some(cloud),
        })
    }

    /// Wait for the API server address to resolve, then deploy. Returns the
    /// resolved address.
    pub async fn deploy_kube_apiserver(&self, checksums: &ChecksumMap) -> Result<IpAddr> {
        let address = &self.op.shoot.api_server_address;
        let ip = self.collab.dns.wait_resolvable(address).await?;
        info!(address = %address, ip = %ip, "api server address resolvable");
        let values = self.kube_apiserver_values(checksums).await?;
        self.apply(values).await?;
        Ok(ip)
    }
}
