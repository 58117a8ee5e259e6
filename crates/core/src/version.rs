use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// `major.minor[.patch]` Kubernetes version. A leading `v` is accepted on input
/// and never rendered. Pre-release and build suffixes (`-gke.100`, `+k3s1`) are
/// kept verbatim and rendered back.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KubernetesVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: Option<u32>,
    pub suffix: Option<String>,
}

impl FromStr for KubernetesVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let raw = raw.strip_prefix('v').unwrap_or(raw);
        let (core, suffix) = match raw.find(|c: char| c == '-' || c == '+') {
            Some(i) => (&raw[..i], Some(raw[i..].to_string())),
            None => (raw, None),
        };
        if suffix.as_deref().map_or(false, |x| x.len() < 2) {
            return Err(Error::Config(format!("invalid kubernetes version: {:?} (empty suffix)", s)));
        }
        let parts: Vec<&str> = core.split('.').collect();
        let num = |p: &str| p.parse::<u32>().map_err(|_| Error::Config(format!("invalid kubernetes version: {:?}", s)));
        let (major, minor, patch) = match parts.as_slice() {
            [major, minor] => (num(*major)?, num(*minor)?, None),
            [major, minor, patch] => (num(*major)?, num(*minor)?, Some(num(*patch)?)),
            _ => return Err(Error::Config(format!("invalid kubernetes version: {:?} (expect major.minor[.patch])", s))),
        };
        Ok(Self { major, minor, patch, suffix })
    }
}

impl TryFrom<String> for KubernetesVersion {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<KubernetesVersion> for String {
    fn from(v: KubernetesVersion) -> Self {
        v.to_string()
    }
}

impl fmt::Display for KubernetesVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if let Some(p) = self.patch {
            write!(f, ".{}", p)?;
        }
        f.write_str(self.suffix.as_deref().unwrap_or_default())
    }
}

impl KubernetesVersion {
    /// `major.minor`, used to match image vector entries.
    pub fn major_minor(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }
}
