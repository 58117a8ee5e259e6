//! Dual-role store deployment. Both roles render the same chart; only `main`
//! carries the provider's backup configuration.

use serde_json::{json, Value};
use tracing::{debug, info};
use trellis_cloud::BackupMaterial;
use trellis_core::{names, ChecksumMap, ChecksumRef, Result, StoreRole};

use crate::{into_values, pod_annotations, ComponentValues, ControlPlane};

pub(crate) const CHECKSUMS: &[ChecksumRef] = &[
    ChecksumRef::secret("etcd-ca", "ca-etcd"),
    ChecksumRef::secret("etcd-server-tls", "etcd-server-tls"),
    ChecksumRef::secret("etcd-client-tls", "etcd-client-tls"),
];

const IMAGES: &[(&str, &str)] = &[("etcd", "etcd"), ("etcd-backup-restore", "etcd-backup-restore")];

impl ControlPlane {
    /// Values for both roles, in processing order. Everything goes into the
    /// override layer.
    pub async fn etcd_values(&self, checksums: &ChecksumMap, backup: &BackupMaterial) -> Result<Vec<(StoreRole, ComponentValues)>> {
        let mut base = into_values(json!({ "podAnnotations": pod_annotations(checksums, CHECKSUMS) }));
        if let Some(config) = &backup.config {
            base.insert("backup".into(), Value::Object(config.clone()));
        }
        let base = self.inject_images(base, IMAGES).await?;

        Ok(StoreRole::ALL
            .into_iter()
            .map(|role| {
                let mut values = base.clone();
                values.insert("role".into(), Value::String(role.as_str().to_string()));
                if !role.backed_up() {
                    // an empty storage provider disables backups
                    values.insert("backup".into(), json!({ "storageProvider": "" }));
                }
                let component = ComponentValues {
                    release: role.resource_name(),
                    chart: self.op.chart(names::ETCD),
                    defaults: None,
                    overrides: Some(values),
                };
                (role, component)
            })
            .collect())
    }

    /// Deploy `main` then `events`. Returns the applied release names. A
    /// failure on `events` leaves `main` deployed.
    pub async fn deploy_etcd(&self, checksums: &ChecksumMap) -> Result<Vec<String>> {
        let ns = self.op.namespace();
        let backup = self.collab.cloud.generate_backup_config().await?;
        match &backup.secret_data {
            Some(data) => self.collab.seed.apply_secret(ns, names::BACKUP_SECRET, "Opaque", data.clone()).await?,
            None => debug!(provider = %self.collab.cloud.name(), "no backup secret material"),
        }

        let mut releases = Vec::with_capacity(StoreRole::ALL.len());
        for (role, values) in self.etcd_values(checksums, &backup).await? {
            let release = values.release.clone();
            self.apply(values).await?;
            // services named like the role predate the client service and must go
            match self.collab.seed.delete_service(ns, &release).await {
                Ok(()) => info!(role = %role, service = %release, "legacy store service deleted"),
                Err(e) if e.is_not_found() => debug!(role = %role, "no legacy store service"),
                Err(e) => return Err(e),
            }
            info!(role = %role, release = %release, "store role deployed");
            releases.push(release);
        }
        Ok(releases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use mockall::predicate::eq;
    use trellis_core::{Error, Values};

    use crate::testing::{checksums, Fixture};

    fn enabled_backup() -> BackupMaterial {
        let mut config = Values::new();
        config.insert("storageProvider".into(), "S3".into());
        config.insert("storageContainer".into(), "shoot--dev--a-backup".into());
        BackupMaterial {
            secret_data: Some(BTreeMap::from([("accessKeyID".to_string(), b"AKIA".to_vec())])),
            config: Some(config),
        }
    }

    #[tokio::test]
    async fn events_role_never_backed_up() {
        let cp = Fixture::live_driven().build();
        let roles = cp.etcd_values(&checksums(), &enabled_backup()).await.unwrap();
        assert_eq!(roles.len(), 2);

        let (role, main) = &roles[0];
        assert_eq!(*role, StoreRole::Main);
        let o = main.overrides.as_ref().unwrap();
        assert_eq!(main.release, "etcd-main");
        assert!(main.defaults.is_none());
        assert_eq!(o["role"], "main");
        assert_eq!(o["backup"]["storageProvider"], "S3");

        let (role, events) = &roles[1];
        assert_eq!(*role, StoreRole::Events);
        let o = events.overrides.as_ref().unwrap();
        assert_eq!(events.release, "etcd-events");
        assert_eq!(o["role"], "events");
        assert_eq!(o["backup"], json!({"storageProvider": ""}));
    }

    #[tokio::test]
    async fn main_without_backup_config_has_no_backup_key() {
        let cp = Fixture::live_driven().build();
        let roles = cp.etcd_values(&checksums(), &BackupMaterial::default()).await.unwrap();
        assert!(roles[0].1.overrides.as_ref().unwrap().get("backup").is_none());
        assert_eq!(roles[1].1.overrides.as_ref().unwrap()["backup"], json!({"storageProvider": ""}));
    }

    #[tokio::test]
    async fn both_roles_share_images_and_annotations() {
        let cp = Fixture::live_driven().build();
        let roles = cp.etcd_values(&checksums(), &BackupMaterial::default()).await.unwrap();
        let (main, events) = (&roles[0].1, &roles[1].1);
        assert_eq!(main.pod_annotations(), events.pod_annotations());
        let o = main.overrides.as_ref().unwrap();
        assert_eq!(o["images"]["etcd"], "quay.io/coreos/etcd:v3.3.10");
        assert_eq!(o["podAnnotations"]["checksum/secret-etcd-server-tls"], "sum-etcd-server-tls");
    }

    #[tokio::test]
    async fn deploy_stores_backup_secret_and_cleans_legacy_services() {
        let mut fx = Fixture::live_driven();
        fx.cloud = trellis_cloud::MockCloudControlPlaneProvider::new();
        fx.cloud.expect_name().returning(|| "aws".to_string());
        fx.cloud.expect_generate_backup_config().times(1).returning(|| Ok(enabled_backup()));
        fx.seed
            .expect_apply_secret()
            .withf(|ns, name, kind, data| {
                ns.to_string() == "shoot--dev--a"
                    && name.to_string() == "etcd-backup"
                    && kind.to_string() == "Opaque"
                    && data.contains_key("accessKeyID")
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        fx.seed
            .expect_delete_service()
            .with(eq("shoot--dev--a"), eq("etcd-main"))
            .times(1)
            .returning(|_, _| Ok(()));
        fx.seed
            .expect_delete_service()
            .with(eq("shoot--dev--a"), eq("etcd-events"))
            .times(1)
            .returning(|_, name| Err(Error::not_found("Service", name)));
        let applied = Arc::new(Mutex::new(Vec::new()));
        let log = applied.clone();
        fx.charts.expect_apply().times(2).returning(move |_, release, _, _, _| {
            log.lock().unwrap().push(release.to_string());
            Ok(())
        });

        let releases = fx.build().deploy_etcd(&checksums()).await.unwrap();
        assert_eq!(releases, vec!["etcd-main", "etcd-events"]);
        assert_eq!(*applied.lock().unwrap(), vec!["etcd-main", "etcd-events"]);
    }

    #[tokio::test]
    async fn no_secret_material_skips_secret() {
        let mut fx = Fixture::live_driven();
        // apply_secret has no expectation and would panic
        fx.seed.expect_delete_service().returning(|_, name| Err(Error::not_found("Service", name)));
        fx.charts.expect_apply().times(2).returning(|_, _, _, _, _| Ok(()));
        fx.build().deploy_etcd(&checksums()).await.unwrap();
    }

    #[tokio::test]
    async fn service_delete_failure_is_fatal_after_main() {
        let mut fx = Fixture::live_driven();
        fx.seed.expect_delete_service().times(1).returning(|_, _| Err(Error::Kube("forbidden".into())));
        fx.charts.expect_apply().times(1).returning(|_, _, _, _, _| Ok(()));
        let err = fx.build().deploy_etcd(&checksums()).await.unwrap_err();
        assert!(matches!(err, Error::Kube(_)));
    }

    #[tokio::test]
    async fn chart_failure_on_events_keeps_main() {
        let mut fx = Fixture::live_driven();
        fx.seed.expect_delete_service().times(1).returning(|_, _| Ok(()));
        fx.charts
            .expect_apply()
            .returning(|_, release, _, _, _| if release == "etcd-events" { Err(Error::chart(release, "boom")) } else { Ok(()) });
        let err = fx.build().deploy_etcd(&checksums()).await.unwrap_err();
        assert!(matches!(err, Error::Chart { ref release, .. } if release == "etcd-events"));
    }
}
