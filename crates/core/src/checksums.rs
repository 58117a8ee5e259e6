//! Artifact checksums and the pod-template annotations derived from them.
//!
//! A changed annotation value is what rolls a workload; the map is read-only
//! to the synthesizers and written only by the stages that generate artifacts.

use std::collections::BTreeMap;

use base64::Engine;
use sha2::{Digest, Sha256};

/// Kind segment of a `checksum/<kind>-<artifact>` annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Secret,
    ConfigMap,
}

impl ArtifactKind {
    fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Secret => "secret",
            ArtifactKind::ConfigMap => "configmap",
        }
    }
}

/// Binds an annotation suffix to the checksum map key it is read from.
/// The two differ, e.g. `checksum/secret-etcd-ca` is read from `ca-etcd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumRef {
    pub kind: ArtifactKind,
    pub annotation: &'static str,
    pub artifact: &'static str,
}

impl ChecksumRef {
    pub const fn secret(annotation: &'static str, artifact: &'static str) -> Self {
        Self { kind: ArtifactKind::Secret, annotation, artifact }
    }

    pub const fn config_map(annotation: &'static str, artifact: &'static str) -> Self {
        Self { kind: ArtifactKind::ConfigMap, annotation, artifact }
    }

    pub fn annotation_key(&self) -> String {
        format!("checksum/{}-{}", self.kind.as_str(), self.annotation)
    }
}

/// Artifact name -> hex digest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumMap {
    entries: BTreeMap<String, String>,
}

impl ChecksumMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, artifact: &str) -> Option<&str> {
        self.entries.get(artifact).map(String::as_str)
    }

    pub fn insert(&mut self, artifact: impl Into<String>, checksum: impl Into<String>) -> Option<String> {
        self.entries.insert(artifact.into(), checksum.into())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Build the annotation map for `refs`. Artifacts without a checksum are omitted.
    pub fn annotations(&self, refs: &[ChecksumRef]) -> BTreeMap<String, String> {
        refs.iter()
            .filter_map(|r| self.get(r.artifact).map(|sum| (r.annotation_key(), sum.to_string())))
            .collect()
    }
}

impl FromIterator<(String, String)> for ChecksumMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Checksum of a secret's data: digest of its canonical JSON form (sorted keys,
/// base64-encoded values), so equal data always yields the same checksum.
pub fn secret_checksum(data: &BTreeMap<String, Vec<u8>>) -> String {
    let encoded: BTreeMap<&str, String> = data
        .iter()
        .map(|(k, v)| (k.as_str(), base64::engine::general_purpose::STANDARD.encode(v)))
        .collect();
    // a map of strings always serializes
    let json = serde_json::to_vec(&encoded).unwrap_or_default();
    sha256_hex(&json)
}

/// Checksum of the cloud provider config text; surrounding whitespace is ignored.
pub fn cloud_provider_config_checksum(config: &str) -> String {
    sha256_hex(config.trim().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFS: [ChecksumRef; 3] = [
        ChecksumRef::secret("etcd-ca", "ca-etcd"),
        ChecksumRef::secret("etcd-server-tls", "etcd-server-tls"),
        ChecksumRef::config_map("cloud-provider-config", "cloud-provider-config"),
    ];

    fn map(pairs: &[(&str, &str)]) -> ChecksumMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn annotation_keys_follow_kind_prefix() {
        assert_eq!(REFS[0].annotation_key(), "checksum/secret-etcd-ca");
        assert_eq!(REFS[2].annotation_key(), "checksum/configmap-cloud-provider-config");
    }

    #[test]
    fn missing_checksums_are_omitted() {
        let sums = map(&[("ca-etcd", "aa")]);
        let ann = sums.annotations(&REFS);
        assert_eq!(ann.len(), 1);
        assert_eq!(ann.get("checksum/secret-etcd-ca").map(String::as_str), Some("aa"));
    }

    #[test]
    fn changing_one_entry_changes_only_its_annotation() {
        let before = map(&[("ca-etcd", "aa"), ("etcd-server-tls", "bb"), ("cloud-provider-config", "cc")]);
        let mut after = before.clone();
        after.insert("ca-etcd", "zz");
        let a = before.annotations(&REFS);
        let b = after.annotations(&REFS);
        let changed: Vec<_> = a.keys().filter(|k| a.get(*k) != b.get(*k)).collect();
        assert_eq!(changed, vec!["checksum/secret-etcd-ca"]);
    }

    #[test]
    fn annotation_set_ignores_ref_order() {
        let sums = map(&[("ca-etcd", "aa"), ("etcd-server-tls", "bb")]);
        let mut reversed = REFS;
        reversed.reverse();
        assert_eq!(sums.annotations(&REFS), sums.annotations(&reversed));
    }

    #[test]
    fn secret_checksum_is_stable_and_content_sensitive() {
        let mut d1 = BTreeMap::new();
        d1.insert("tls.crt".to_string(), b"cert".to_vec());
        d1.insert("tls.key".to_string(), b"key".to_vec());
        let d2 = d1.clone();
        assert_eq!(secret_checksum(&d1), secret_checksum(&d2));
        let mut d3 = d1.clone();
        d3.insert("tls.key".to_string(), b"other".to_vec());
        assert_ne!(secret_checksum(&d1), secret_checksum(&d3));
        assert_eq!(secret_checksum(&d1).len(), 64);
    }

    #[test]
    fn cloud_config_checksum_trims_whitespace() {
        assert_eq!(cloud_provider_config_checksum("[Global]\nzone=a\n\n"), cloud_provider_config_checksum("  [Global]\nzone=a"));
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
