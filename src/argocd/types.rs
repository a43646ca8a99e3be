//! # ArgoCD Resource Types
//!
//! Typed views of the two ArgoCD custom resources this service writes:
//! `AppProject` (the tenant trust boundary) and `Application` (the sync unit).
//!
//! Only the fields the service sets or reads are modelled; unknown fields on
//! objects read back from the cluster are ignored.

use crate::config::ResourceKind;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const ARGOCD_GROUP: &str = "argoproj.io";
pub const ARGOCD_VERSION: &str = "v1alpha1";

/// AppProject spec
///
/// ```yaml
/// apiVersion: argoproj.io/v1alpha1
/// kind: AppProject
/// metadata:
///   name: team-prod
///   namespace: argocd
///   labels:
///     gitops.io/repository-hash: 4668ee5f
/// spec:
///   sourceRepos: ["https://github.com/team/config"]
///   destinations:
///     - server: https://kubernetes.default.svc
///       namespace: team-prod
/// ```
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "argoproj.io",
    version = "v1alpha1",
    kind = "AppProject",
    plural = "appprojects",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AppProjectSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Repositories applications in this project may source from
    #[serde(default)]
    pub source_repos: Vec<String>,
    /// Cluster/namespace pairs applications may deploy to
    #[serde(default)]
    pub destinations: Vec<ApplicationDestination>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<ProjectRole>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_resource_whitelist: Vec<ResourceKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespace_resource_whitelist: Vec<ResourceKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_resource_blacklist: Vec<ResourceKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespace_resource_blacklist: Vec<ResourceKind>,
    /// Service accounts ArgoCD impersonates when syncing to a destination
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destination_service_accounts: Vec<DestinationServiceAccount>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDestination {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRole {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Casbin-style policy lines, e.g. `p, proj:x:role, applications, sync, x/*, allow`
    #[serde(default)]
    pub policies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DestinationServiceAccount {
    pub server: String,
    pub namespace: String,
    pub default_service_account: String,
}

/// Application spec
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "argoproj.io",
    version = "v1alpha1",
    kind = "Application",
    plural = "applications",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    pub project: String,
    pub source: ApplicationSource,
    pub destination: ApplicationDestination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_policy: Option<SyncPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSource {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    #[serde(default)]
    pub target_revision: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automated: Option<AutomatedSync>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sync_options: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutomatedSync {
    #[serde(default)]
    pub prune: bool,
    #[serde(default)]
    pub self_heal: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn test_api_coordinates() {
        assert_eq!(AppProject::group(&()), ARGOCD_GROUP);
        assert_eq!(AppProject::version(&()), ARGOCD_VERSION);
        assert_eq!(AppProject::plural(&()), "appprojects");
        assert_eq!(Application::kind(&()), "Application");
        assert_eq!(Application::plural(&()), "applications");
    }

    #[test]
    fn test_application_source_uses_argocd_field_names() {
        let source = ApplicationSource {
            repo_url: "https://github.com/team/config".to_string(),
            target_revision: "main".to_string(),
            path: "manifests/".to_string(),
        };
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["repoURL"], "https://github.com/team/config");
        assert_eq!(json["targetRevision"], "main");
    }

    #[test]
    fn test_app_project_reads_unknown_fields() {
        let json = serde_json::json!({
            "apiVersion": "argoproj.io/v1alpha1",
            "kind": "AppProject",
            "metadata": { "name": "team-prod", "namespace": "argocd" },
            "spec": {
                "sourceRepos": ["https://github.com/team/config"],
                "orphanedResources": { "warn": true }
            },
            "status": {}
        });
        let project: AppProject = serde_json::from_value(json).unwrap();
        assert_eq!(project.spec.source_repos.len(), 1);
        assert!(project.spec.destination_service_accounts.is_empty());
    }
}
