use async_trait::async_trait;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::List;
use kube::{
    api::{Api, DeleteParams, ListParams, PostParams},
    core::response::Status,
    Client,
};
use serde::Serialize;
use thiserror::Error;
use tracing::*;

use crate::resource::is_tailscale;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Failed to list ingresses: {0}")]
    List(#[source] kube::Error),
    #[error("Failed to create ingress {0}: {1}")]
    Create(String, #[source] kube::Error),
    #[error("Failed to replace ingress {0}: {1}")]
    Update(String, #[source] kube::Error),
    #[error("Failed to delete ingress {0}: {1}")]
    Delete(String, #[source] kube::Error),
    #[error("MissingObjectKey: {0}")]
    MissingObjectKey(&'static str),
}

/// What the API server answered to a delete.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Deleted {
    /// The object is still terminating (finalizers pending).
    Terminating(Box<Ingress>),
    Finished(Status),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IngressGateway: Send + Sync {
    /// All Tailscale ingresses across namespaces.
    async fn list(&self) -> Result<List<Ingress>, GatewayError>;

    async fn create(&self, ingress: Ingress) -> Result<Ingress, GatewayError>;

    async fn update(&self, ingress: Ingress) -> Result<Ingress, GatewayError>;

    async fn delete(&self, name: String, namespace: String) -> Result<Deleted, GatewayError>;
}

pub struct KubeGateway {
    client: Client,
}

impl KubeGateway {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced(&self, ingress: &Ingress) -> Api<Ingress> {
        let namespace = ingress.metadata.namespace.as_deref().unwrap_or("default");
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn key(ingress: &Ingress) -> String {
    format!(
        "{}/{}",
        ingress.metadata.namespace.as_deref().unwrap_or("default"),
        ingress.metadata.name.as_deref().unwrap_or_default()
    )
}

#[async_trait]
impl IngressGateway for KubeGateway {
    async fn list(&self) -> Result<List<Ingress>, GatewayError> {
        let ingresses = Api::<Ingress>::all(self.client.clone())
            .list(&ListParams::default())
            .await
            .map_err(GatewayError::List)?;

        let total = ingresses.items.len();
        let items: Vec<Ingress> = ingresses.items.into_iter().filter(is_tailscale).collect();
        debug!("Listed {} tailscale ingresses out of {}", items.len(), total);

        Ok(List {
            items,
            metadata: ingresses.metadata,
        })
    }

    async fn create(&self, ingress: Ingress) -> Result<Ingress, GatewayError> {
        self.namespaced(&ingress)
            .create(&PostParams::default(), &ingress)
            .await
            .map_err(|e| GatewayError::Create(key(&ingress), e))
    }

    async fn update(&self, ingress: Ingress) -> Result<Ingress, GatewayError> {
        let name = ingress
            .metadata
            .name
            .as_ref()
            .ok_or(GatewayError::MissingObjectKey(".metadata.name"))?;

        self.namespaced(&ingress)
            .replace(name, &PostParams::default(), &ingress)
            .await
            .map_err(|e| GatewayError::Update(key(&ingress), e))
    }

    async fn delete(&self, name: String, namespace: String) -> Result<Deleted, GatewayError> {
        Api::<Ingress>::namespaced(self.client.clone(), &namespace)
            .delete(&name, &DeleteParams::default())
            .await
            .map(|result| {
                result.either(|ingress| Deleted::Terminating(Box::new(ingress)), Deleted::Finished)
            })
            .map_err(|e| GatewayError::Delete(format!("{namespace}/{name}"), e))
    }
}
