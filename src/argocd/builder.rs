//! # CD Resource Builder
//!
//! Pure construction of the `AppProject` and `Application` objects for a
//! tenant. Nothing here performs I/O; submission goes through
//! [`crate::cluster::CdResourceStore`].

use super::types::{
    AppProject, AppProjectSpec, Application, ApplicationDestination, ApplicationSource,
    ApplicationSpec, AutomatedSync, DestinationServiceAccount, ProjectRole, SyncPolicy,
};
use crate::config::{ResourceKind, ServiceConfig};
use crate::constants::{
    APPLICATION_SOURCE_PATH, LABEL_K8S_MANAGED_BY, LABEL_MANAGED_BY, LABEL_REPOSITORY_HASH,
    LABEL_TENANT, MANAGED_BY_VALUE,
};
use crate::repository::repository_hash;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

/// Actions granted to the per-project role
const PROJECT_ROLE_ACTIONS: [&str; 3] = ["sync", "get", "update"];

const PROJECT_ROLE_NAME: &str = "tenant";

pub const SYNC_OPTION_NO_CREATE_NAMESPACE: &str = "CreateNamespace=false";
pub const SYNC_OPTION_PRUNE_BACKGROUND: &str = "PrunePropagationPolicy=background";
pub const SYNC_OPTION_PRUNE_LAST: &str = "PruneLast=true";

/// Resource restriction applied to every project
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResourcePolicy {
    /// Everything permitted
    #[default]
    Unrestricted,
    Allow(Vec<ResourceKind>),
    Deny(Vec<ResourceKind>),
}

impl ResourcePolicy {
    /// Allow list wins over deny list; empty lists count as absent
    pub fn from_lists(
        allow: Option<&Vec<ResourceKind>>,
        deny: Option<&Vec<ResourceKind>>,
    ) -> Self {
        match (allow, deny) {
            (Some(allow), _) if !allow.is_empty() => Self::Allow(allow.clone()),
            (_, Some(deny)) if !deny.is_empty() => Self::Deny(deny.clone()),
            _ => Self::Unrestricted,
        }
    }
}

/// Service-wide settings the builders need
#[derive(Debug, Clone)]
pub struct CdResourceBuilder {
    cd_namespace: String,
    destination_server: String,
    impersonation_enabled: bool,
    resource_policy: ResourcePolicy,
}

impl CdResourceBuilder {
    pub fn new(
        cd_namespace: impl Into<String>,
        destination_server: impl Into<String>,
        impersonation_enabled: bool,
        resource_policy: ResourcePolicy,
    ) -> Self {
        Self {
            cd_namespace: cd_namespace.into(),
            destination_server: destination_server.into(),
            impersonation_enabled,
            resource_policy,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            config.argocd.namespace.clone(),
            config.argocd.destination_server.clone(),
            config.impersonation.enabled,
            ResourcePolicy::from_lists(
                config.resource_allow_list.as_ref(),
                config.resource_deny_list.as_ref(),
            ),
        )
    }

    pub fn cd_namespace(&self) -> &str {
        &self.cd_namespace
    }

    /// Build the tenant's AppProject
    ///
    /// `service_account_name` is only used when impersonation is enabled, in
    /// which case it becomes the destination's default service account.
    pub fn build_app_project(
        &self,
        name: &str,
        namespace: &str,
        repo_url: &str,
        service_account_name: &str,
    ) -> AppProject {
        let mut labels = self.base_labels(namespace);
        labels.insert(LABEL_REPOSITORY_HASH.to_string(), repository_hash(repo_url));

        let policies = PROJECT_ROLE_ACTIONS
            .iter()
            .map(|action| {
                format!("p, proj:{name}:{PROJECT_ROLE_NAME}, applications, {action}, {name}/*, allow")
            })
            .collect();

        let mut spec = AppProjectSpec {
            description: Some(format!("GitOps tenant project for namespace {namespace}")),
            source_repos: vec![repo_url.to_string()],
            destinations: vec![ApplicationDestination {
                server: self.destination_server.clone(),
                namespace: namespace.to_string(),
            }],
            roles: vec![ProjectRole {
                name: PROJECT_ROLE_NAME.to_string(),
                description: Some(format!("Sync access to applications in project {name}")),
                policies,
            }],
            ..AppProjectSpec::default()
        };

        match &self.resource_policy {
            ResourcePolicy::Allow(kinds) => {
                spec.cluster_resource_whitelist = kinds.clone();
                spec.namespace_resource_whitelist = kinds.clone();
            }
            ResourcePolicy::Deny(kinds) => {
                spec.cluster_resource_blacklist = kinds.clone();
                spec.namespace_resource_blacklist = kinds.clone();
            }
            ResourcePolicy::Unrestricted => {}
        }

        if self.impersonation_enabled {
            spec.destination_service_accounts = vec![DestinationServiceAccount {
                server: self.destination_server.clone(),
                namespace: namespace.to_string(),
                default_service_account: service_account_name.to_string(),
            }];
        }

        let mut project = AppProject::new(name, spec);
        project.metadata.namespace = Some(self.cd_namespace.clone());
        project.metadata.labels = Some(labels);
        project
    }

    /// Build the tenant's Application
    pub fn build_application(
        &self,
        name: &str,
        project: &str,
        repo_url: &str,
        branch: &str,
        namespace: &str,
    ) -> Application {
        let spec = ApplicationSpec {
            project: project.to_string(),
            source: ApplicationSource {
                repo_url: repo_url.to_string(),
                target_revision: branch.to_string(),
                path: APPLICATION_SOURCE_PATH.to_string(),
            },
            destination: ApplicationDestination {
                server: self.destination_server.clone(),
                namespace: namespace.to_string(),
            },
            sync_policy: Some(SyncPolicy {
                automated: Some(AutomatedSync {
                    prune: true,
                    self_heal: true,
                }),
                sync_options: vec![
                    SYNC_OPTION_NO_CREATE_NAMESPACE.to_string(),
                    SYNC_OPTION_PRUNE_BACKGROUND.to_string(),
                    SYNC_OPTION_PRUNE_LAST.to_string(),
                ],
            }),
        };

        let mut application = Application::new(name, spec);
        application.metadata = ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(self.cd_namespace.clone()),
            labels: Some(self.base_labels(namespace)),
            ..ObjectMeta::default()
        };
        application
    }

    fn base_labels(&self, namespace: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_TENANT.to_string(), namespace.to_string()),
            (LABEL_MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string()),
            (LABEL_K8S_MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string()),
        ])
    }
}
