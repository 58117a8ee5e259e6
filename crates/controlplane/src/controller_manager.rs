use serde_json::json;
use trellis_core::{names, ChecksumMap, ChecksumRef, ResourceLimits, Result};

use crate::{into_values, pod_annotations, ComponentValues, ControlPlane};

pub(crate) const CHECKSUMS: &[ChecksumRef] = &[
    ChecksumRef::secret("ca", "ca"),
    ChecksumRef::secret("kube-controller-manager", names::KUBE_CONTROLLER_MANAGER),
    ChecksumRef::secret("service-account-key", "service-account-key"),
    ChecksumRef::secret("cloudprovider", names::CLOUD_PROVIDER_SECRET),
    ChecksumRef::config_map("cloud-provider-config", names::CLOUD_PROVIDER_CONFIG),
];

impl ControlPlane {
    pub async fn kube_controller_manager_values(&self, checksums: &ChecksumMap) -> Result<ComponentValues> {
        let shoot = &self.op.shoot;
        let mut values = into_values(json!({
            "cloudProvider": self.collab.cloud.name(),
            "clusterName": shoot.namespace,
            "kubernetesVersion": shoot.kubernetes.version.to_string(),
            "podNetwork": shoot.networks.pods,
            "serviceNetwork": shoot.networks.services,
            "podAnnotations": pod_annotations(checksums, CHECKSUMS),
        }));
        let cloud = self.collab.cloud.generate_kube_controller_manager_config().await?;

        if self.op.autoscaling.is_centralized() {
            values.insert("resources".into(), ResourceLimits::KUBE_CONTROLLER_MANAGER.to_value());
            values.insert(
                "horizontalPodAutoscaler".into(),
                json!({ "downscaleDelay": "24h", "upscaleDelay": "1m", "tolerance": 0.2 }),
            );
        }
        if let Some(cfg) = &shoot.kubernetes.kube_controller_manager {
            values.insert("featureGates".into(), serde_json::to_value(&cfg.feature_gates)?);
        }

        let values = self.inject_images(values, &[("hyperkube", "hyperkube")]).await?;
        Ok(ComponentValues {
            release: names::KUBE_CONTROLLER_MANAGER.to_string(),
            chart: self.op.chart(names::KUBE_CONTROLLER_MANAGER),
            defaults: Some(values),
            overrides: Some(cloud),
        })
    }

    pub async fn deploy_kube_controller_manager(&self, checksums: &ChecksumMap) -> Result<()> {
        let values = self.kube_controller_manager_values(checksums).await?;
        self.apply(values).await
    }
}
