//! # Kubernetes-backed Cluster
//!
//! Production implementation of the cluster capabilities using `kube::Api`.
//! Namespaces and ClusterRoles are cluster-scoped; ArgoCD objects are read
//! and written in the configured CD namespace.

use super::{CdResourceStore, ClusterError, IdentityStore, NamespaceStore};
use crate::argocd::{AppProject, Application};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, RoleBinding};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    cd_namespace: String,
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster")
            .field("cd_namespace", &self.cd_namespace)
            .finish_non_exhaustive()
    }
}

impl KubeCluster {
    pub fn new(client: Client, cd_namespace: &str) -> Self {
        Self {
            client,
            cd_namespace: cd_namespace.to_string(),
        }
    }

    fn projects(&self) -> Api<AppProject> {
        Api::namespaced(self.client.clone(), &self.cd_namespace)
    }

    fn applications(&self) -> Api<Application> {
        Api::namespaced(self.client.clone(), &self.cd_namespace)
    }
}

#[async_trait]
impl NamespaceStore for KubeCluster {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.get_opt(name)
            .await
            .map_err(|e| ClusterError::from_kube("Namespace", name, e))
    }

    async fn create_namespace(&self, namespace: Namespace) -> Result<Namespace, ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let name = namespace.metadata.name.clone().unwrap_or_default();
        api.create(&PostParams::default(), &namespace)
            .await
            .map_err(|e| ClusterError::from_kube("Namespace", &name, e))
    }

    async fn merge_namespace_metadata(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
        annotations: BTreeMap<String, String>,
    ) -> Result<Namespace, ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        // JSON merge patch: keys not mentioned are left untouched
        let patch = serde_json::json!({
            "metadata": {
                "labels": labels,
                "annotations": annotations,
            }
        });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| ClusterError::from_kube("Namespace", name, e))
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::background())
            .await
            .map_err(|e| ClusterError::from_kube("Namespace", name, e))?;
        debug!("Deletion of namespace {} accepted", name);
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for KubeCluster {
    async fn create_service_account(
        &self,
        namespace: &str,
        service_account: ServiceAccount,
    ) -> Result<ServiceAccount, ClusterError> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        let name = service_account
            .metadata
            .name
            .clone()
            .or_else(|| service_account.metadata.generate_name.clone())
            .unwrap_or_default();
        api.create(&PostParams::default(), &service_account)
            .await
            .map_err(|e| ClusterError::from_kube("ServiceAccount", &name, e))
    }

    async fn create_role_binding(
        &self,
        namespace: &str,
        role_binding: RoleBinding,
    ) -> Result<RoleBinding, ClusterError> {
        let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);
        let name = role_binding.metadata.name.clone().unwrap_or_default();
        api.create(&PostParams::default(), &role_binding)
            .await
            .map_err(|e| ClusterError::from_kube("RoleBinding", &name, e))
    }

    async fn get_cluster_role(&self, name: &str) -> Result<Option<ClusterRole>, ClusterError> {
        let api: Api<ClusterRole> = Api::all(self.client.clone());
        api.get_opt(name)
            .await
            .map_err(|e| ClusterError::from_kube("ClusterRole", name, e))
    }
}

#[async_trait]
impl CdResourceStore for KubeCluster {
    async fn list_app_projects(
        &self,
        label_selector: &str,
    ) -> Result<Vec<AppProject>, ClusterError> {
        let list = self
            .projects()
            .list(&ListParams::default().labels(label_selector))
            .await
            .map_err(|e| ClusterError::from_kube("AppProject", label_selector, e))?;
        Ok(list.items)
    }

    async fn get_app_project(&self, name: &str) -> Result<Option<AppProject>, ClusterError> {
        self.projects()
            .get_opt(name)
            .await
            .map_err(|e| ClusterError::from_kube("AppProject", name, e))
    }

    async fn create_app_project(&self, project: AppProject) -> Result<AppProject, ClusterError> {
        let name = project.metadata.name.clone().unwrap_or_default();
        self.projects()
            .create(&PostParams::default(), &project)
            .await
            .map_err(|e| ClusterError::from_kube("AppProject", &name, e))
    }

    async fn delete_app_project(&self, name: &str) -> Result<(), ClusterError> {
        self.projects()
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| ClusterError::from_kube("AppProject", name, e))?;
        Ok(())
    }

    async fn get_application(&self, name: &str) -> Result<Option<Application>, ClusterError> {
        self.applications()
            .get_opt(name)
            .await
            .map_err(|e| ClusterError::from_kube("Application", name, e))
    }

    async fn create_application(
        &self,
        application: Application,
    ) -> Result<Application, ClusterError> {
        let name = application.metadata.name.clone().unwrap_or_default();
        self.applications()
            .create(&PostParams::default(), &application)
            .await
            .map_err(|e| ClusterError::from_kube("Application", &name, e))
    }
}
