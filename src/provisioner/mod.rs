//! # Cluster Resource Provisioner
//!
//! Idempotent create/update primitives for tenant namespaces and identities.
//! "Already exists" is success: callers retry whole registrations on
//! transient failures and must not trip over their own earlier work.
//!
//! RoleBindings are always namespaced. Whatever the bound ClusterRole grants,
//! the tenant identity can only exercise it inside its own namespace.

mod cluster_role;

pub use cluster_role::{
    analyze_cluster_role, analyze_rules, ClusterRoleValidation, CLUSTER_SCOPED_RESOURCES,
};

use crate::cluster::{ClusterClients, ClusterError};
use crate::constants::{LABEL_K8S_MANAGED_BY, LABEL_MANAGED_BY, MANAGED_BY_VALUE};
use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Whether a create call made a new object or found one already there
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExisted,
}

impl CreateOutcome {
    fn from_result<T>(result: Result<T, ClusterError>) -> Result<Self, ClusterError> {
        match result {
            Ok(_) => Ok(Self::Created),
            Err(e) if e.is_already_exists() => Ok(Self::AlreadyExisted),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClusterProvisioner {
    clients: ClusterClients,
}

impl ClusterProvisioner {
    pub fn new(clients: ClusterClients) -> Self {
        Self { clients }
    }

    pub async fn namespace_exists(&self, name: &str) -> Result<bool, ClusterError> {
        Ok(self.clients.namespaces.get_namespace(name).await?.is_some())
    }

    pub async fn create_namespace(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
    ) -> Result<CreateOutcome, ClusterError> {
        self.create_namespace_with_metadata(name, labels, BTreeMap::new())
            .await
    }

    /// Create a namespace carrying the managed-by labels plus `labels`/`annotations`
    pub async fn create_namespace_with_metadata(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
        annotations: BTreeMap<String, String>,
    ) -> Result<CreateOutcome, ClusterError> {
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(with_managed_by(labels)),
                annotations: (!annotations.is_empty()).then_some(annotations),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };

        let outcome =
            CreateOutcome::from_result(self.clients.namespaces.create_namespace(namespace).await)?;
        match outcome {
            CreateOutcome::Created => info!("Created namespace {}", name),
            CreateOutcome::AlreadyExisted => debug!("Namespace {} already exists", name),
        }
        Ok(outcome)
    }

    /// Merge labels into an existing namespace
    pub async fn update_namespace_labels(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
    ) -> Result<(), ClusterError> {
        self.update_namespace_metadata(name, labels, BTreeMap::new())
            .await
    }

    /// Merge labels and annotations into an existing namespace; keys not
    /// mentioned keep their current values
    pub async fn update_namespace_metadata(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
        annotations: BTreeMap<String, String>,
    ) -> Result<(), ClusterError> {
        self.clients
            .namespaces
            .merge_namespace_metadata(name, with_managed_by(labels), annotations)
            .await?;
        info!("Updated metadata on namespace {}", name);
        Ok(())
    }

    /// Delete a namespace; a namespace that is already gone counts as deleted
    pub async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        match self.clients.namespaces.delete_namespace(name).await {
            Ok(()) => {
                info!("Deleted namespace {}", name);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("Namespace {} not found, assuming already deleted", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn create_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<CreateOutcome, ClusterError> {
        let service_account = ServiceAccount {
            metadata: managed_metadata(ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            }),
            ..ServiceAccount::default()
        };
        let outcome = CreateOutcome::from_result(
            self.clients
                .identities
                .create_service_account(namespace, service_account)
                .await,
        )?;
        debug!("Service account {}/{}: {:?}", namespace, name, outcome);
        Ok(outcome)
    }

    /// Create a service account named `<base_name><random suffix>`
    ///
    /// The name is assigned by the API server, so it is only known after
    /// creation; the returned value must be threaded into the role binding
    /// and AppProject that reference it.
    pub async fn create_service_account_with_generate_name(
        &self,
        namespace: &str,
        base_name: &str,
    ) -> Result<String, ClusterError> {
        let service_account = ServiceAccount {
            metadata: managed_metadata(ObjectMeta {
                generate_name: Some(base_name.to_string()),
                ..ObjectMeta::default()
            }),
            ..ServiceAccount::default()
        };
        let created = self
            .clients
            .identities
            .create_service_account(namespace, service_account)
            .await?;
        let name = created.metadata.name.ok_or_else(|| {
            ClusterError::Other(format!(
                "API server returned no name for service account generated from '{base_name}'"
            ))
        })?;
        info!("Created service account {}/{}", namespace, name);
        Ok(name)
    }

    /// Bind `cluster_role` to a service account, scoped to `namespace`
    pub async fn create_role_binding(
        &self,
        namespace: &str,
        binding_name: &str,
        cluster_role: &str,
        service_account: &str,
    ) -> Result<CreateOutcome, ClusterError> {
        let role_binding = RoleBinding {
            metadata: managed_metadata(ObjectMeta {
                name: Some(binding_name.to_string()),
                namespace: Some(namespace.to_string()),
                ..ObjectMeta::default()
            }),
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "ClusterRole".to_string(),
                name: cluster_role.to_string(),
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: service_account.to_string(),
                namespace: Some(namespace.to_string()),
                ..Subject::default()
            }]),
        };
        let outcome = CreateOutcome::from_result(
            self.clients
                .identities
                .create_role_binding(namespace, role_binding)
                .await,
        )?;
        info!(
            "RoleBinding {}/{} ({} -> {}): {:?}",
            namespace, binding_name, cluster_role, service_account, outcome
        );
        Ok(outcome)
    }

    /// Bind `cluster_role` to a (generated) service account; returns the binding name
    pub async fn create_role_binding_for_service_account(
        &self,
        namespace: &str,
        service_account: &str,
        cluster_role: &str,
    ) -> Result<String, ClusterError> {
        let binding_name = format!("{service_account}-binding");
        self.create_role_binding(namespace, &binding_name, cluster_role, service_account)
            .await?;
        Ok(binding_name)
    }

    /// Read a ClusterRole and analyze its rules for risky grants
    pub async fn validate_cluster_role(
        &self,
        name: &str,
    ) -> Result<ClusterRoleValidation, ClusterError> {
        match self.clients.identities.get_cluster_role(name).await? {
            Some(role) => Ok(analyze_cluster_role(&role)),
            None => Ok(ClusterRoleValidation::missing(name)),
        }
    }
}

fn with_managed_by(mut labels: BTreeMap<String, String>) -> BTreeMap<String, String> {
    labels.insert(LABEL_MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string());
    labels.insert(LABEL_K8S_MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string());
    labels
}

fn managed_metadata(mut metadata: ObjectMeta) -> ObjectMeta {
    metadata.labels = Some(with_managed_by(metadata.labels.unwrap_or_default()));
    metadata
}
