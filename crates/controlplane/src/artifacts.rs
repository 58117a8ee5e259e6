//! Collects the artifact state synthesis reads: secret checksums and the
//! admin basic-auth credentials.

use std::collections::BTreeSet;

use tracing::debug;
use trellis_core::checksums::{secret_checksum, ArtifactKind};
use trellis_core::{names, ChecksumMap, Result};
use trellis_kubehub::SeedClient;

use crate::operation::BasicAuth;
use crate::{apiserver, cloud_controller_manager, controller_manager, etcd, scheduler};

#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    pub checksums: ChecksumMap,
    pub basic_auth: Option<BasicAuth>,
}

/// Secret names referenced by any component's checksum annotations, sorted.
pub fn referenced_secrets() -> Vec<&'static str> {
    [etcd::CHECKSUMS, apiserver::CHECKSUMS, controller_manager::CHECKSUMS, cloud_controller_manager::CHECKSUMS, scheduler::CHECKSUMS]
        .into_iter()
        .flatten()
        .filter(|r| r.kind == ArtifactKind::Secret)
        .map(|r| r.artifact)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Read every referenced secret from `namespace`. Secrets that do not exist
/// yet are skipped; their annotations will be omitted.
pub async fn collect_artifacts(seed: &dyn SeedClient, namespace: &str) -> Result<Artifacts> {
    let mut artifacts = Artifacts::default();
    for name in referenced_secrets() {
        match seed.get_secret(namespace, name).await {
            Ok(data) => {
                artifacts.checksums.insert(name, secret_checksum(&data));
            }
            Err(e) if e.is_not_found() => debug!(secret = %name, "secret missing, checksum skipped"),
            Err(e) => return Err(e),
        }
    }

    match seed.get_secret(namespace, names::KUBECFG_SECRET).await {
        Ok(data) => {
            let field = |k: &str| data.get(k).map(|v| String::from_utf8_lossy(v).into_owned()).unwrap_or_default();
            artifacts.basic_auth = Some(BasicAuth { username: field("username"), password: field("password") });
        }
        Err(e) if e.is_not_found() => debug!(secret = names::KUBECFG_SECRET, "no kubecfg secret"),
        Err(e) => return Err(e),
    }
    debug!(ns = %namespace, checksums = artifacts.checksums.len(), "artifacts collected");
    Ok(artifacts)
}
