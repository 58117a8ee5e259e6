//! Node-count driven compute sizing for the API server.

use serde::Serialize;
use serde_json::json;

/// Request/limit quadruple. Quantities are Kubernetes quantity strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceProfile {
    pub cpu_request: &'static str,
    pub memory_request: &'static str,
    pub cpu_limit: &'static str,
    pub memory_limit: &'static str,
}

impl ResourceProfile {
    /// `{limits: {cpu, memory}, requests: {cpu, memory}}` as consumed by the charts.
    pub fn to_value(&self) -> serde_json::Value {
        json!({
            "limits": { "cpu": self.cpu_limit, "memory": self.memory_limit },
            "requests": { "cpu": self.cpu_request, "memory": self.memory_request },
        })
    }
}

/// Limits-only sizing used when control-plane scaling is managed centrally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub cpu: &'static str,
    pub memory: &'static str,
}

impl ResourceLimits {
    pub const KUBE_APISERVER: ResourceLimits = ResourceLimits { cpu: "1500m", memory: "4000Mi" };
    pub const KUBE_CONTROLLER_MANAGER: ResourceLimits = ResourceLimits { cpu: "750m", memory: "1Gi" };
    pub const CLOUD_CONTROLLER_MANAGER: ResourceLimits = ResourceLimits { cpu: "500m", memory: "512Mi" };
    pub const KUBE_SCHEDULER: ResourceLimits = ResourceLimits { cpu: "300m", memory: "350Mi" };

    pub fn to_value(&self) -> serde_json::Value {
        json!({ "limits": { "cpu": self.cpu, "memory": self.memory } })
    }
}

const BANDS: [(i64, ResourceProfile); 4] = [
    (2, ResourceProfile { cpu_request: "800m", memory_request: "600Mi", cpu_limit: "1000m", memory_limit: "900Mi" }),
    (10, ResourceProfile { cpu_request: "1000m", memory_request: "800Mi", cpu_limit: "1200m", memory_limit: "1400Mi" }),
    (50, ResourceProfile { cpu_request: "1200m", memory_request: "1200Mi", cpu_limit: "1500m", memory_limit: "3000Mi" }),
    (100, ResourceProfile { cpu_request: "2500m", memory_request: "4000Mi", cpu_limit: "3000m", memory_limit: "4500Mi" }),
];

const LARGEST: ResourceProfile =
    ResourceProfile { cpu_request: "3000m", memory_request: "4000Mi", cpu_limit: "4000m", memory_limit: "6000Mi" };

/// Map a node count onto its band. Upper bounds are inclusive; counts below the
/// first band (including negative ones) resolve to the first band.
pub fn size_for(node_count: i64) -> ResourceProfile {
    BANDS
        .iter()
        .find(|(upper, _)| node_count <= *upper)
        .map(|(_, p)| p.clone())
        .unwrap_or(LARGEST)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(p: &ResourceProfile) -> (&str, &str, &str, &str) {
        (p.cpu_request, p.memory_request, p.cpu_limit, p.memory_limit)
    }

    #[test]
    fn band_boundaries_are_inclusive() {
        let cases: &[(i64, (&str, &str, &str, &str))] = &[
            (0, ("800m", "600Mi", "1000m", "900Mi")),
            (1, ("800m", "600Mi", "1000m", "900Mi")),
            (2, ("800m", "600Mi", "1000m", "900Mi")),
            (3, ("1000m", "800Mi", "1200m", "1400Mi")),
            (9, ("1000m", "800Mi", "1200m", "1400Mi")),
            (10, ("1000m", "800Mi", "1200m", "1400Mi")),
            (11, ("1200m", "1200Mi", "1500m", "3000Mi")),
            (49, ("1200m", "1200Mi", "1500m", "3000Mi")),
            (50, ("1200m", "1200Mi", "1500m", "3000Mi")),
            (51, ("2500m", "4000Mi", "3000m", "4500Mi")),
            (99, ("2500m", "4000Mi", "3000m", "4500Mi")),
            (100, ("2500m", "4000Mi", "3000m", "4500Mi")),
            (101, ("3000m", "4000Mi", "4000m", "6000Mi")),
            (10_000, ("3000m", "4000Mi", "4000m", "6000Mi")),
        ];
        for (nodes, want) in cases {
            assert_eq!(quad(&size_for(*nodes)), *want, "nodes={}", nodes);
        }
    }

    #[test]
    fn total_over_extremes() {
        assert_eq!(size_for(-5), size_for(0));
        assert_eq!(size_for(i64::MIN), size_for(0));
        assert_eq!(size_for(i64::MAX), size_for(101));
    }

    #[test]
    fn profile_renders_limits_and_requests() {
        let v = size_for(5).to_value();
        assert_eq!(v["requests"]["cpu"], "1000m");
        assert_eq!(v["requests"]["memory"], "800Mi");
        assert_eq!(v["limits"]["cpu"], "1200m");
        assert_eq!(v["limits"]["memory"], "1400Mi");
    }

    #[test]
    fn centralized_limits_have_no_requests() {
        let v = ResourceLimits::KUBE_SCHEDULER.to_value();
        assert_eq!(v["limits"]["memory"], "350Mi");
        assert!(v.get("requests").is_none());
    }
}
