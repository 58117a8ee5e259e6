//! Parsing and comparing rendered manifests.

use anyhow::{anyhow, Context, Result};
use kube::core::GroupVersionKind;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

pub(crate) fn max_manifest_bytes() -> usize {
    std::env::var("TRELLIS_MAX_MANIFEST_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1_000_000) // 1 MiB default
}

/// Split a multi-document YAML stream into documents that declare a `kind`.
pub fn split_manifests(yaml: &str) -> Vec<String> {
    yaml.split("\n---")
        .map(|doc| doc.trim().trim_start_matches("---").trim())
        .filter(|doc| !doc.is_empty() && doc.lines().any(|l| l.starts_with("kind:")))
        .map(|doc| doc.to_string())
        .collect()
}

/// A rendered object ready to be applied.
#[derive(Debug, Clone)]
pub struct Target {
    pub json: Json,
    pub gvk: GroupVersionKind,
    pub name: String,
    pub namespace: Option<String>,
}

/// Parse one document; `ns_default` fills in a missing `metadata.namespace`.
pub fn parse_target(yaml: &str, ns_default: Option<&str>) -> Result<Target> {
    if yaml.len() > max_manifest_bytes() {
        return Err(anyhow!("manifest too large (>{} bytes)", max_manifest_bytes()));
    }
    let val: serde_yaml::Value = serde_yaml::from_str(yaml).context("parsing YAML")?;
    let json = serde_json::to_value(val).context("converting YAML to JSON")?;
    let api_version = json.get("apiVersion").and_then(|v| v.as_str()).ok_or_else(|| anyhow!("manifest missing apiVersion"))?.to_string();
    let kind = json.get("kind").and_then(|v| v.as_str()).ok_or_else(|| anyhow!("manifest missing kind"))?.to_string();
    let (group, version) = match api_version.split_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), api_version),
    };
    let name = json
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest missing metadata.name"))?
        .to_string();
    let namespace = json
        .get("metadata")
        .and_then(|m| m.get("namespace"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .or_else(|| ns_default.map(|s| s.to_string()));
    Ok(Target { json, gvk: GroupVersionKind { group, version, kind }, name, namespace })
}

/// Drop server-populated fields that would otherwise show up in every diff.
pub fn strip_noisy(mut v: Json) -> Json {
    if let Some(meta) = v.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        meta.remove("managedFields");
        meta.remove("resourceVersion");
        meta.remove("generation");
        meta.remove("creationTimestamp");
        meta.remove("uid");
    }
    if let Some(obj) = v.as_object_mut() {
        obj.remove("status");
    }
    v
}

pub fn ensure_metadata(v: &mut Json, name: &str, ns: Option<&str>) {
    let Some(root) = v.as_object_mut() else { return };
    let meta = root.entry("metadata").or_insert_with(|| Json::Object(serde_json::Map::new()));
    if let Some(obj) = meta.as_object_mut() {
        obj.insert("name".into(), Json::String(name.to_string()));
        if let Some(ns) = ns {
            obj.insert("namespace".into(), Json::String(ns.to_string()));
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub adds: usize,
    pub updates: usize,
    pub removes: usize,
}

impl DiffSummary {
    pub fn is_empty(&self) -> bool {
        self.adds == 0 && self.updates == 0 && self.removes == 0
    }
}

/// Count added, updated and removed leaves of `target` relative to `base`.
pub fn diff_summary(target: &Json, base: &Json) -> DiffSummary {
    fn walk(a: &Json, b: &Json, s: &mut DiffSummary) {
        match (a, b) {
            (Json::Object(ao), Json::Object(bo)) => {
                for (k, av) in ao.iter() {
                    match bo.get(k) {
                        Some(bv) if av == bv => {}
                        Some(bv) => walk(av, bv, s),
                        None => s.adds += 1,
                    }
                }
                s.removes += bo.keys().filter(|k| !ao.contains_key(*k)).count();
            }
            (Json::Array(aa), Json::Array(bb)) => {
                s.updates += aa.iter().zip(bb.iter()).filter(|(x, y)| x != y).count();
                s.adds += aa.len().saturating_sub(bb.len());
                s.removes += bb.len().saturating_sub(aa.len());
            }
            (av, bv) => {
                if av != bv {
                    s.updates += 1;
                }
            }
        }
    }
    let mut s = DiffSummary::default();
    walk(target, base, &mut s);
    s
}

/// Diff `desired` against the result of reading its live object. A failed read
/// or a missing object yields no diff.
pub fn diff_against_live<E>(desired: &Json, live: std::result::Result<Option<Json>, E>) -> Option<DiffSummary> {
    let live = live.ok().flatten()?;
    Some(diff_summary(&strip_noisy(desired.clone()), &strip_noisy(live)))
}
