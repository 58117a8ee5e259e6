//! Cloud provider config: the one checksum this crate writes.

use serde_json::{json, Value};
use tracing::{debug, info};
use trellis_core::checksums::cloud_provider_config_checksum;
use trellis_core::{names, ChecksumMap, Result};

use crate::{into_values, ComponentValues, ControlPlane};

impl ControlPlane {
    /// Chart values for the config map plus the checksum of its content.
    pub async fn cloud_provider_config_values(&self) -> Result<(ComponentValues, String)> {
        let config = self.collab.cloud.generate_cloud_provider_config().await?;
        let checksum = cloud_provider_config_checksum(&config);
        let values = into_values(json!({ "cloudProviderConfig": Value::String(config) }));
        let component = ComponentValues {
            release: names::CLOUD_PROVIDER_CONFIG.to_string(),
            chart: self.op.chart(names::CLOUD_PROVIDER_CONFIG),
            defaults: None,
            overrides: Some(values),
        };
        Ok((component, checksum))
    }

    /// Generate the config, record its checksum and apply the config map chart.
    /// The checksum is recorded before applying.
    pub async fn deploy_cloud_provider_config(&self, checksums: &mut ChecksumMap) -> Result<()> {
        let (values, checksum) = self.cloud_provider_config_values().await?;
        checksums.insert(names::CLOUD_PROVIDER_CONFIG, checksum);
        self.apply(values).await
    }

    /// Let the provider rewrite the existing config map, e.g. after credentials
    /// rotated. Returns `false` when there is no config map yet.
    pub async fn refresh_cloud_provider_config(&self, checksums: &mut ChecksumMap) -> Result<bool> {
        let ns = self.op.namespace();
        let current = match self.collab.seed.get_config_map(ns, names::CLOUD_PROVIDER_CONFIG).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                debug!(ns = %ns, "no cloud provider config to refresh");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let refreshed = self.collab.cloud.refresh_cloud_provider_config(current);
        let config = refreshed.get(names::CLOUD_PROVIDER_CONFIG_KEY).map(String::as_str).unwrap_or_default();
        checksums.insert(names::CLOUD_PROVIDER_CONFIG, cloud_provider_config_checksum(config));

        self.collab.seed.update_config_map(ns, names::CLOUD_PROVIDER_CONFIG, refreshed).await?;
        info!(ns = %ns, provider = %self.collab.cloud.name(), "cloud provider config refreshed");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use trellis_core::Error;

    use crate::testing::Fixture;

    #[tokio::test]
    async fn deploy_records_trimmed_checksum() {
        let mut fx = Fixture::live_driven();
        fx.charts
            .expect_apply()
            .withf(|_, release, _, defaults, overrides| {
                release.to_string() == "cloud-provider-config"
                    && defaults.is_none()
                    && overrides.as_ref().map(|o| o["cloudProviderConfig"].is_string()).unwrap_or(false)
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));
        let mut checksums = ChecksumMap::new();
        fx.build().deploy_cloud_provider_config(&mut checksums).await.unwrap();
        let expected = cloud_provider_config_checksum("[Global]\nauth-url=https://keystone");
        assert_eq!(checksums.get("cloud-provider-config"), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn refresh_without_config_map_is_a_no_op() {
        let mut fx = Fixture::live_driven();
        fx.seed.expect_get_config_map().returning(|_, name| Err(Error::not_found("ConfigMap", name)));
        let mut checksums = ChecksumMap::new();
        let refreshed = fx.build().refresh_cloud_provider_config(&mut checksums).await.unwrap();
        assert!(!refreshed);
        assert!(checksums.is_empty());
    }

    #[tokio::test]
    async fn refresh_updates_config_map_and_checksum() {
        let mut fx = Fixture::live_driven();
        fx.seed.expect_get_config_map().returning(|_, _| {
            Ok(BTreeMap::from([(names::CLOUD_PROVIDER_CONFIG_KEY.to_string(), "old".to_string())]))
        });
        fx.cloud.expect_refresh_cloud_provider_config().returning(|mut data| {
            data.insert(names::CLOUD_PROVIDER_CONFIG_KEY.to_string(), "  rotated\n".to_string());
            data
        });
        fx.seed
            .expect_update_config_map()
            .withf(|_, name, data| name.to_string() == "cloud-provider-config" && data["cloudprovider.conf"] == "  rotated\n")
            .times(1)
            .returning(|_, _, _| Ok(()));
        let mut checksums = ChecksumMap::new();
        assert!(fx.build().refresh_cloud_provider_config(&mut checksums).await.unwrap());
        let expected = cloud_provider_config_checksum("rotated");
        assert_eq!(checksums.get("cloud-provider-config"), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn refresh_read_failure_is_fatal() {
        let mut fx = Fixture::live_driven();
        fx.seed.expect_get_config_map().returning(|_, _| Err(Error::Kube("timeout".into())));
        let err = fx.build().refresh_cloud_provider_config(&mut ChecksumMap::new()).await.unwrap_err();
        assert!(matches!(err, Error::Kube(_)));
    }
}
