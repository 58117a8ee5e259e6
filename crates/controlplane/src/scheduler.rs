use serde_json::json;
use trellis_core::{names, ChecksumMap, ChecksumRef, ResourceLimits, Result};

use crate::{into_values, pod_annotations, ComponentValues, ControlPlane};

pub(crate) const CHECKSUMS: &[ChecksumRef] = &[ChecksumRef::secret("kube-scheduler", names::KUBE_SCHEDULER)];

impl ControlPlane {
    pub async fn kube_scheduler_values(&self, checksums: &ChecksumMap) -> Result<ComponentValues> {
        let shoot = &self.op.shoot;
        let mut values = into_values(json!({
            "kubernetesVersion": shoot.kubernetes.version.to_string(),
            "podAnnotations": pod_annotations(checksums, CHECKSUMS),
        }));
        let cloud = self.collab.cloud.generate_kube_scheduler_config().await?;

        if self.op.autoscaling.is_centralized() {
            values.insert("resources".into(), ResourceLimits::KUBE_SCHEDULER.to_value());
        }
        if let Some(cfg) = &shoot.kubernetes.kube_scheduler {
            values.insert("featureGates".into(), serde_json::to_value(&cfg.feature_gates)?);
        }

        let values = self.inject_images(values, &[("hyperkube", "hyperkube")]).await?;
        Ok(ComponentValues {
            release: names::KUBE_SCHEDULER.to_string(),
            chart: self.op.chart(names::KUBE_SCHEDULER),
            defaults: Some(values),
            overrides: Some(cloud),
        })
    }

    pub async fn deploy_kube_scheduler(&self, checksums: &ChecksumMap) -> Result<()> {
        let values = self.kube_scheduler_values(checksums).await?;
        self.apply(values).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{AutoscalingMode, StaticScale};

    use crate::operation::KubeComponentConfig;
    use crate::testing::{checksums, Fixture};

    #[tokio::test]
    async fn scheduler_payload() {
        let mut fx = Fixture::new(AutoscalingMode::Centralized(StaticScale { replicas: 1, min_replicas: 1, max_replicas: 1 }));
        fx.op.shoot.kubernetes.kube_scheduler = Some(KubeComponentConfig::default());
        let v = fx.build().kube_scheduler_values(&checksums()).await.unwrap();
        let d = v.defaults.unwrap();
        assert_eq!(d["kubernetesVersion"], "1.12.3");
        assert_eq!(d["podAnnotations"], json!({"checksum/secret-kube-scheduler": "sum-kube-scheduler"}));
        assert_eq!(d["resources"], json!({"limits": {"cpu": "300m", "memory": "350Mi"}}));
        assert_eq!(d["featureGates"], json!({}));
        assert_eq!(v.overrides.unwrap()["cloud"], "kube-scheduler");
    }
}
