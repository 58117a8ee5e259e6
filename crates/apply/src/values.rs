//! Preview of layered chart values.
//!
//! Chart application itself never merges the layers; they are handed to the
//! renderer as separate files. This mirrors the renderer's precedence so the
//! effective values can be inspected.

use serde_json::Value;
use trellis_core::Values;

/// Deep-merge `overrides` onto `defaults`: objects merge key by key, any other
/// value in `overrides` replaces the default.
pub fn merge_layers(defaults: &Values, overrides: &Values) -> Values {
    let mut out = defaults.clone();
    for (k, ov) in overrides {
        if let (Some(Value::Object(dv)), Value::Object(ov)) = (out.get_mut(k), ov) {
            let merged = merge_layers(dv, ov);
            *dv = merged;
            continue;
        }
        out.insert(k.clone(), ov.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Values {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn overrides_win_on_conflicts_and_objects_merge() {
        let defaults = obj(json!({"replicas": 1, "images": {"hyperkube": "a"}, "featureGates": {"X": true}}));
        let overrides = obj(json!({"replicas": 3, "images": {"vpn": "b"}, "featureGates": null}));
        let merged = merge_layers(&defaults, &overrides);
        assert_eq!(merged["replicas"], 3);
        assert_eq!(merged["images"], json!({"hyperkube": "a", "vpn": "b"}));
        assert_eq!(merged["featureGates"], Value::Null);
    }

    #[test]
    fn layers_are_not_mutated() {
        let defaults = obj(json!({"a": {"b": 1}}));
        let overrides = obj(json!({"a": {"b": 2}}));
        let _ = merge_layers(&defaults, &overrides);
        assert_eq!(defaults["a"]["b"], 1);
    }
}
