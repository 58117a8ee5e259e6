use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::{
    api::{
        apps::v1::Deployment,
        core::v1::{ConfigMap, Secret, Service},
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
    ByteString,
};
use kube::{
    api::{Api, DeleteParams, Patch, PatchParams, PostParams},
    Client,
};
use tracing::{debug, info};
use trellis_core::{KubernetesVersion, Result};

use crate::kube_error;

/// Reads and writes against the seed cluster. Missing objects surface as
/// `Error::NotFound`; every other error is fatal for the pass.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait SeedClient: Send + Sync {
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>>;

    /// Replace the data of an existing config map.
    async fn update_config_map(&self, namespace: &str, name: &str, data: BTreeMap<String, String>) -> Result<()>;

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, Vec<u8>>>;

    /// Create or update a secret of type `secret_type` with exactly `data`.
    async fn apply_secret(&self, namespace: &str, name: &str, secret_type: &str, data: BTreeMap<String, Vec<u8>>) -> Result<()>;

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()>;

    /// Version of the seed's API server.
    async fn server_version(&self) -> Result<KubernetesVersion>;
}

/// kube-rs backed [`SeedClient`].
#[derive(Clone)]
pub struct KubeSeedClient {
    client: Client,
    field_manager: String,
}

impl KubeSeedClient {
    pub fn new(client: Client) -> Self {
        Self { client, field_manager: "trellis".to_string() }
    }
}

#[async_trait]
impl SeedClient for KubeSeedClient {
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let cm = api.get(name).await.map_err(|e| kube_error("ConfigMap", name, e))?;
        Ok(cm.data.unwrap_or_default())
    }

    async fn update_config_map(&self, namespace: &str, name: &str, data: BTreeMap<String, String>) -> Result<()> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let mut cm = api.get(name).await.map_err(|e| kube_error("ConfigMap", name, e))?;
        cm.data = Some(data);
        api.replace(name, &PostParams::default(), &cm).await.map_err(|e| kube_error("ConfigMap", name, e))?;
        info!(ns = %namespace, name = %name, "config map updated");
        Ok(())
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.get(name).await.map_err(|e| kube_error("Deployment", name, e))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api.get(name).await.map_err(|e| kube_error("Secret", name, e))?;
        Ok(secret.data.unwrap_or_default().into_iter().map(|(k, v)| (k, v.0)).collect())
    }

    async fn apply_secret(&self, namespace: &str, name: &str, secret_type: &str, data: BTreeMap<String, Vec<u8>>) -> Result<()> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = Secret {
            metadata: ObjectMeta { name: Some(name.to_string()), namespace: Some(namespace.to_string()), ..Default::default() },
            type_: Some(secret_type.to_string()),
            data: Some(data.into_iter().map(|(k, v)| (k, ByteString(v))).collect()),
            ..Default::default()
        };
        // force: take over fields previously owned by other managers
        let pp = PatchParams::apply(&self.field_manager).force();
        api.patch(name, &pp, &Patch::Apply(&secret)).await.map_err(|e| kube_error("Secret", name, e))?;
        info!(ns = %namespace, name = %name, "secret applied");
        Ok(())
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default()).await.map_err(|e| kube_error("Service", name, e))?;
        debug!(ns = %namespace, name = %name, "service deleted");
        Ok(())
    }

    async fn server_version(&self) -> Result<KubernetesVersion> {
        let info = self.client.apiserver_version().await.map_err(|e| kube_error("Version", "apiserver", e))?;
        debug!(git_version = %info.git_version, "seed server version");
        info.git_version.parse()
    }
}
