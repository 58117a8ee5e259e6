//! Trellis kubehub: typed access to the seed cluster and DNS waits.
//!
//! Every kube-rs error passes through [`kube_error`], which turns HTTP 404 into
//! [`Error::NotFound`] so callers can tell expected absence from real failures.

#![forbid(unsafe_code)]

mod client;
mod dns;

pub use client::{KubeSeedClient, SeedClient};
pub use dns::{HostResolver, PollingResolver};

#[cfg(any(test, feature = "mock"))]
pub use client::MockSeedClient;
#[cfg(any(test, feature = "mock"))]
pub use dns::MockHostResolver;

use kube::Client;
use tokio::sync::OnceCell;
use trellis_core::{Error, Result};

static CLIENT: OnceCell<Client> = OnceCell::const_new();

/// Shared client built from the ambient kubeconfig / in-cluster config.
pub async fn get_kube_client() -> Result<Client> {
    CLIENT
        .get_or_try_init(|| async { Client::try_default().await.map_err(|e| kube_error("Client", "default", e)) })
        .await
        .cloned()
}

/// Map a kube-rs error for object `kind`/`name`: 404 becomes `NotFound`, anything else `Kube`.
pub fn kube_error(kind: &'static str, name: &str, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => Error::not_found(kind, name),
        other => Error::Kube(Box::new(other)),
    }
}
