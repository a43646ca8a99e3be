//! # In-memory Cluster
//!
//! A test double for the cluster capabilities. It mirrors the API server
//! behaviour the registration workflow relies on:
//!
//! - create returns `AlreadyExists` for a taken name
//! - `generateName` gets a random 5-character suffix
//! - deleting a namespace removes the service accounts and role bindings in it
//! - label selectors support equality terms
//!
//! Individual operations can be made to fail with [`MemoryCluster::fail_on`].

use super::{labels_match, CdResourceStore, ClusterError, IdentityStore, NamespaceStore};
use crate::argocd::{AppProject, Application};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, RoleBinding};
use kube::api::ObjectMeta;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Operations that can be forced to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    GetNamespace,
    CreateNamespace,
    /// Another writer creates the namespace between check and create
    CreateNamespaceRace,
    UpdateNamespace,
    DeleteNamespace,
    CreateServiceAccount,
    CreateRoleBinding,
    GetClusterRole,
    ListAppProjects,
    CreateAppProject,
    DeleteAppProject,
    CreateApplication,
}

#[derive(Debug, Default)]
struct State {
    namespaces: BTreeMap<String, Namespace>,
    service_accounts: BTreeMap<(String, String), ServiceAccount>,
    role_bindings: BTreeMap<(String, String), RoleBinding>,
    cluster_roles: BTreeMap<String, ClusterRole>,
    app_projects: BTreeMap<String, AppProject>,
    applications: BTreeMap<String, Application>,
    fail_points: HashSet<FailPoint>,
}

#[derive(Debug, Default)]
pub struct MemoryCluster {
    state: Mutex<State>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, ClusterError> {
        self.state
            .lock()
            .map_err(|e| ClusterError::Other(format!("memory cluster lock poisoned: {e}")))
    }

    fn check(state: &State, point: FailPoint) -> Result<(), ClusterError> {
        if state.fail_points.contains(&point) {
            return Err(ClusterError::Other(format!("injected failure: {point:?}")));
        }
        Ok(())
    }

    /// Make every subsequent call of `point` fail
    pub fn fail_on(&self, point: FailPoint) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_points.insert(point);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_points.clear();
        }
    }

    /// Seed a namespace, as if created by someone else
    pub fn insert_namespace(&self, name: &str, labels: BTreeMap<String, String>) {
        if let Ok(mut state) = self.state.lock() {
            let namespace = Namespace {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    labels: Some(labels),
                    uid: Some(Uuid::new_v4().to_string()),
                    ..ObjectMeta::default()
                },
                ..Namespace::default()
            };
            state.namespaces.insert(name.to_string(), namespace);
        }
    }

    pub fn insert_cluster_role(&self, role: ClusterRole) {
        if let Ok(mut state) = self.state.lock() {
            let name = role.metadata.name.clone().unwrap_or_default();
            state.cluster_roles.insert(name, role);
        }
    }

    pub fn namespace(&self, name: &str) -> Option<Namespace> {
        self.state.lock().ok()?.namespaces.get(name).cloned()
    }

    pub fn service_accounts(&self, namespace: &str) -> Vec<ServiceAccount> {
        self.state
            .lock()
            .map(|state| {
                state
                    .service_accounts
                    .iter()
                    .filter(|((ns, _), _)| ns == namespace)
                    .map(|(_, sa)| sa.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn role_bindings(&self, namespace: &str) -> Vec<RoleBinding> {
        self.state
            .lock()
            .map(|state| {
                state
                    .role_bindings
                    .iter()
                    .filter(|((ns, _), _)| ns == namespace)
                    .map(|(_, rb)| rb.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn app_project(&self, name: &str) -> Option<AppProject> {
        self.state.lock().ok()?.app_projects.get(name).cloned()
    }

    pub fn application(&self, name: &str) -> Option<Application> {
        self.state.lock().ok()?.applications.get(name).cloned()
    }

    pub fn app_project_count(&self) -> usize {
        self.state.lock().map(|s| s.app_projects.len()).unwrap_or_default()
    }

    fn generated_name(prefix: &str) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{prefix}{}", &suffix[..5])
    }
}

fn with_uid(mut metadata: ObjectMeta) -> ObjectMeta {
    metadata.uid = Some(Uuid::new_v4().to_string());
    metadata
}

#[async_trait]
impl NamespaceStore for MemoryCluster {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, ClusterError> {
        let state = self.state()?;
        Self::check(&state, FailPoint::GetNamespace)?;
        Ok(state.namespaces.get(name).cloned())
    }

    async fn create_namespace(&self, mut namespace: Namespace) -> Result<Namespace, ClusterError> {
        let mut state = self.state()?;
        Self::check(&state, FailPoint::CreateNamespace)?;
        let name = namespace.metadata.name.clone().unwrap_or_default();

        if state.fail_points.contains(&FailPoint::CreateNamespaceRace) {
            let racer = Namespace {
                metadata: with_uid(ObjectMeta {
                    name: Some(name.clone()),
                    ..ObjectMeta::default()
                }),
                ..Namespace::default()
            };
            state.namespaces.entry(name.clone()).or_insert(racer);
        }

        if state.namespaces.contains_key(&name) {
            return Err(ClusterError::AlreadyExists {
                kind: "Namespace",
                name,
            });
        }
        namespace.metadata = with_uid(namespace.metadata);
        state.namespaces.insert(name, namespace.clone());
        Ok(namespace)
    }

    async fn merge_namespace_metadata(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
        annotations: BTreeMap<String, String>,
    ) -> Result<Namespace, ClusterError> {
        let mut state = self.state()?;
        Self::check(&state, FailPoint::UpdateNamespace)?;
        let namespace = state
            .namespaces
            .get_mut(name)
            .ok_or_else(|| ClusterError::NotFound {
                kind: "Namespace",
                name: name.to_string(),
            })?;
        namespace
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels);
        namespace
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(annotations);
        Ok(namespace.clone())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        let mut state = self.state()?;
        Self::check(&state, FailPoint::DeleteNamespace)?;
        if state.namespaces.remove(name).is_none() {
            return Err(ClusterError::NotFound {
                kind: "Namespace",
                name: name.to_string(),
            });
        }
        // Namespaced objects go with the namespace
        state.service_accounts.retain(|(ns, _), _| ns != name);
        state.role_bindings.retain(|(ns, _), _| ns != name);
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryCluster {
    async fn create_service_account(
        &self,
        namespace: &str,
        mut service_account: ServiceAccount,
    ) -> Result<ServiceAccount, ClusterError> {
        let mut state = self.state()?;
        Self::check(&state, FailPoint::CreateServiceAccount)?;
        if !state.namespaces.contains_key(namespace) {
            return Err(ClusterError::NotFound {
                kind: "Namespace",
                name: namespace.to_string(),
            });
        }

        let name = match (
            service_account.metadata.name.clone(),
            service_account.metadata.generate_name.clone(),
        ) {
            (Some(name), _) => name,
            (None, Some(prefix)) => loop {
                let candidate = Self::generated_name(&prefix);
                if !state
                    .service_accounts
                    .contains_key(&(namespace.to_string(), candidate.clone()))
                {
                    break candidate;
                }
            },
            (None, None) => {
                return Err(ClusterError::Other(
                    "service account needs a name or generateName".to_string(),
                ))
            }
        };

        let key = (namespace.to_string(), name.clone());
        if state.service_accounts.contains_key(&key) {
            return Err(ClusterError::AlreadyExists {
                kind: "ServiceAccount",
                name,
            });
        }
        service_account.metadata.name = Some(name);
        service_account.metadata.namespace = Some(namespace.to_string());
        service_account.metadata = with_uid(service_account.metadata);
        state.service_accounts.insert(key, service_account.clone());
        Ok(service_account)
    }

    async fn create_role_binding(
        &self,
        namespace: &str,
        mut role_binding: RoleBinding,
    ) -> Result<RoleBinding, ClusterError> {
        let mut state = self.state()?;
        Self::check(&state, FailPoint::CreateRoleBinding)?;
        if !state.namespaces.contains_key(namespace) {
            return Err(ClusterError::NotFound {
                kind: "Namespace",
                name: namespace.to_string(),
            });
        }
        let name = role_binding.metadata.name.clone().unwrap_or_default();
        let key = (namespace.to_string(), name.clone());
        if state.role_bindings.contains_key(&key) {
            return Err(ClusterError::AlreadyExists {
                kind: "RoleBinding",
                name,
            });
        }
        role_binding.metadata.namespace = Some(namespace.to_string());
        role_binding.metadata = with_uid(role_binding.metadata);
        state.role_bindings.insert(key, role_binding.clone());
        Ok(role_binding)
    }

    async fn get_cluster_role(&self, name: &str) -> Result<Option<ClusterRole>, ClusterError> {
        let state = self.state()?;
        Self::check(&state, FailPoint::GetClusterRole)?;
        Ok(state.cluster_roles.get(name).cloned())
    }
}

#[async_trait]
impl CdResourceStore for MemoryCluster {
    async fn list_app_projects(
        &self,
        label_selector: &str,
    ) -> Result<Vec<AppProject>, ClusterError> {
        let state = self.state()?;
        Self::check(&state, FailPoint::ListAppProjects)?;
        Ok(state
            .app_projects
            .values()
            .filter(|p| labels_match(p.metadata.labels.as_ref(), label_selector))
            .cloned()
            .collect())
    }

    async fn get_app_project(&self, name: &str) -> Result<Option<AppProject>, ClusterError> {
        Ok(self.state()?.app_projects.get(name).cloned())
    }

    async fn create_app_project(&self, mut project: AppProject) -> Result<AppProject, ClusterError> {
        let mut state = self.state()?;
        Self::check(&state, FailPoint::CreateAppProject)?;
        let name = project.metadata.name.clone().unwrap_or_default();
        if state.app_projects.contains_key(&name) {
            return Err(ClusterError::AlreadyExists {
                kind: "AppProject",
                name,
            });
        }
        project.metadata = with_uid(project.metadata);
        state.app_projects.insert(name, project.clone());
        Ok(project)
    }

    async fn delete_app_project(&self, name: &str) -> Result<(), ClusterError> {
        let mut state = self.state()?;
        Self::check(&state, FailPoint::DeleteAppProject)?;
        state
            .app_projects
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ClusterError::NotFound {
                kind: "AppProject",
                name: name.to_string(),
            })
    }

    async fn get_application(&self, name: &str) -> Result<Option<Application>, ClusterError> {
        Ok(self.state()?.applications.get(name).cloned())
    }

    async fn create_application(
        &self,
        mut application: Application,
    ) -> Result<Application, ClusterError> {
        let mut state = self.state()?;
        Self::check(&state, FailPoint::CreateApplication)?;
        let name = application.metadata.name.clone().unwrap_or_default();
        if state.applications.contains_key(&name) {
            return Err(ClusterError::AlreadyExists {
                kind: "Application",
                name,
            });
        }
        application.metadata = with_uid(application.metadata);
        state.applications.insert(name, application.clone());
        Ok(application)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named_namespace(name: &str) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        }
    }

    #[tokio::test]
    async fn test_create_namespace_twice_conflicts() {
        let cluster = MemoryCluster::new();
        cluster.create_namespace(named_namespace("a")).await.unwrap();
        let err = cluster.create_namespace(named_namespace("a")).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_generate_name_service_account() {
        let cluster = MemoryCluster::new();
        cluster.insert_namespace("a", BTreeMap::new());
        let sa = ServiceAccount {
            metadata: ObjectMeta {
                generate_name: Some("gitops-sa-".to_string()),
                ..ObjectMeta::default()
            },
            ..ServiceAccount::default()
        };

        let first = cluster.create_service_account("a", sa.clone()).await.unwrap();
        let second = cluster.create_service_account("a", sa).await.unwrap();
        let first_name = first.metadata.name.unwrap();
        assert!(first_name.starts_with("gitops-sa-"));
        assert_eq!(first_name.len(), "gitops-sa-".len() + 5);
        assert_ne!(Some(first_name), second.metadata.name);
    }

    #[tokio::test]
    async fn test_delete_namespace_collects_namespaced_objects() {
        let cluster = MemoryCluster::new();
        cluster.insert_namespace("a", BTreeMap::new());
        let sa = ServiceAccount {
            metadata: ObjectMeta {
                name: Some("gitops".to_string()),
                ..ObjectMeta::default()
            },
            ..ServiceAccount::default()
        };
        cluster.create_service_account("a", sa).await.unwrap();
        assert_eq!(cluster.service_accounts("a").len(), 1);

        cluster.delete_namespace("a").await.unwrap();
        assert!(cluster.namespace("a").is_none());
        assert!(cluster.service_accounts("a").is_empty());
    }

    #[tokio::test]
    async fn test_fail_points() {
        let cluster = MemoryCluster::new();
        cluster.fail_on(FailPoint::GetNamespace);
        assert!(cluster.get_namespace("a").await.is_err());
        cluster.clear_failures();
        assert!(cluster.get_namespace("a").await.unwrap().is_none());
    }
}
