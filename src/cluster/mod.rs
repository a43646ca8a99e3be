//! # Cluster Capabilities
//!
//! Narrow async interfaces over the Kubernetes API, grouped by what the
//! registration workflow needs:
//!
//! - [`NamespaceStore`] - namespace lifecycle
//! - [`IdentityStore`] - service accounts, role bindings, ClusterRole reads
//! - [`CdResourceStore`] - ArgoCD AppProject/Application lifecycle
//!
//! Two implementations exist: [`KubeCluster`] against a live API server and
//! [`MemoryCluster`] for tests and local runs. [`ClusterClients`] bundles one
//! of each capability and is what the registration service is built from.

mod live;
mod memory;

pub use live::KubeCluster;
pub use memory::{FailPoint, MemoryCluster};

use crate::argocd::{AppProject, Application};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, RoleBinding};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by cluster capabilities
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),
    #[error("{0}")]
    Other(String),
}

impl ClusterError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Classify a kube error by HTTP status (409 -> exists, 404 -> missing)
    pub fn from_kube(kind: &'static str, name: &str, err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(status) if status.code == 409 => Self::AlreadyExists {
                kind,
                name: name.to_string(),
            },
            kube::Error::Api(status) if status.code == 404 => Self::NotFound {
                kind,
                name: name.to_string(),
            },
            _ => Self::Api(err),
        }
    }
}

#[async_trait]
pub trait NamespaceStore: Send + Sync {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, ClusterError>;

    async fn create_namespace(&self, namespace: Namespace) -> Result<Namespace, ClusterError>;

    /// Merge labels and annotations into an existing namespace
    async fn merge_namespace_metadata(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
        annotations: BTreeMap<String, String>,
    ) -> Result<Namespace, ClusterError>;

    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError>;
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Create a service account; when `metadata.generateName` is set the
    /// returned object carries the server-assigned name
    async fn create_service_account(
        &self,
        namespace: &str,
        service_account: ServiceAccount,
    ) -> Result<ServiceAccount, ClusterError>;

    async fn create_role_binding(
        &self,
        namespace: &str,
        role_binding: RoleBinding,
    ) -> Result<RoleBinding, ClusterError>;

    async fn get_cluster_role(&self, name: &str) -> Result<Option<ClusterRole>, ClusterError>;
}

#[async_trait]
pub trait CdResourceStore: Send + Sync {
    async fn list_app_projects(&self, label_selector: &str)
        -> Result<Vec<AppProject>, ClusterError>;

    async fn get_app_project(&self, name: &str) -> Result<Option<AppProject>, ClusterError>;

    async fn create_app_project(&self, project: AppProject) -> Result<AppProject, ClusterError>;

    async fn delete_app_project(&self, name: &str) -> Result<(), ClusterError>;

    async fn get_application(&self, name: &str) -> Result<Option<Application>, ClusterError>;

    async fn create_application(
        &self,
        application: Application,
    ) -> Result<Application, ClusterError>;
}

/// The capability set the registration service is constructed from
#[derive(Clone)]
pub struct ClusterClients {
    pub namespaces: Arc<dyn NamespaceStore>,
    pub identities: Arc<dyn IdentityStore>,
    pub cd_resources: Arc<dyn CdResourceStore>,
}

impl std::fmt::Debug for ClusterClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClients").finish_non_exhaustive()
    }
}

impl ClusterClients {
    /// Clients backed by a live API server; ArgoCD objects live in `cd_namespace`
    pub fn kube(client: kube::Client, cd_namespace: &str) -> Self {
        let cluster = Arc::new(KubeCluster::new(client, cd_namespace));
        Self {
            namespaces: Arc::clone(&cluster) as Arc<dyn NamespaceStore>,
            identities: Arc::clone(&cluster) as Arc<dyn IdentityStore>,
            cd_resources: cluster,
        }
    }

    pub fn memory(cluster: Arc<MemoryCluster>) -> Self {
        Self {
            namespaces: Arc::clone(&cluster) as Arc<dyn NamespaceStore>,
            identities: Arc::clone(&cluster) as Arc<dyn IdentityStore>,
            cd_resources: cluster,
        }
    }
}

/// Parse an equality-based label selector (`a=b,c=d`)
pub fn parse_label_selector(selector: &str) -> Vec<(String, String)> {
    selector
        .split(',')
        .filter_map(|term| {
            let term = term.trim();
            let (key, value) = term.split_once("==").or_else(|| term.split_once('='))?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Whether `labels` satisfy every term of an equality-based selector
pub fn labels_match(labels: Option<&BTreeMap<String, String>>, selector: &str) -> bool {
    parse_label_selector(selector)
        .iter()
        .all(|(key, value)| labels.and_then(|l| l.get(key)) == Some(value))
}
