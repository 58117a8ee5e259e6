//! Error taxonomy shared by every Trellis crate.
//!
//! `NotFound` is the only variant callers are expected to recover from; every
//! other variant aborts the current reconciliation pass.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Expected absence of a cluster object.
    #[error("not found: {kind} {name}")]
    NotFound { kind: &'static str, name: String },

    /// Any other failure reported by the Kubernetes API.
    #[error("kubernetes: {0}")]
    Kube(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Rendering or applying a chart failed.
    #[error("chart {release}: {message}")]
    Chart { release: String, message: String },

    /// An image reference could not be resolved for the target version.
    #[error("image {name}: {message}")]
    Image { name: String, message: String },

    /// The cloud provider failed to produce a configuration fragment.
    #[error("provider [{provider}]: {message}")]
    Provider { provider: String, message: String },

    #[error("dns {host}: {message}")]
    Dns { host: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("serialization: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound { kind, name: name.into() }
    }

    pub fn chart(release: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Chart { release: release.into(), message: message.to_string() }
    }

    pub fn provider(provider: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Provider { provider: provider.into(), message: message.to_string() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
