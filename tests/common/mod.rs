//! Shared fixtures for integration tests.

#![allow(dead_code, reason = "Each test binary uses a different subset")]

use gitops_registration::auth::{StaticAuthorizer, UserIdentity};
use gitops_registration::cluster::{ClusterClients, MemoryCluster};
use gitops_registration::config::{ResourceKind, ServiceConfig};
use gitops_registration::{ExistingNamespaceRequest, RegistrationRequest, RegistrationService, Repository};
use k8s_openapi::api::rbac::v1::{ClusterRole, PolicyRule};
use kube::api::ObjectMeta;
use std::sync::Arc;

pub const TENANT_ROLE: &str = "tenant-deployer";
pub const ALICE_TOKEN: &str = "alice-token";

pub fn legacy_config() -> ServiceConfig {
    ServiceConfig::default()
}

pub fn impersonation_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.impersonation.enabled = true;
    config.impersonation.cluster_role = TENANT_ROLE.to_string();
    config
}

pub fn deny_list_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.resource_deny_list = Some(vec![
        ResourceKind::new("", "ResourceQuota"),
        ResourceKind::new("networking.k8s.io", "NetworkPolicy"),
    ]);
    config
}

pub fn service(cluster: &Arc<MemoryCluster>, config: ServiceConfig) -> RegistrationService {
    RegistrationService::new(ClusterClients::memory(Arc::clone(cluster)), Arc::new(config))
}

/// Service with a static authorizer granting alice access to `legacy-ns`
pub fn service_with_authorizer(
    cluster: &Arc<MemoryCluster>,
    config: ServiceConfig,
) -> RegistrationService {
    let authorizer = StaticAuthorizer::new()
        .with_token(ALICE_TOKEN, alice())
        .grant("alice", "legacy-ns");
    service(cluster, config).with_authorizer(Arc::new(authorizer))
}

pub fn alice() -> UserIdentity {
    UserIdentity {
        username: "alice".to_string(),
        uid: Some("1000".to_string()),
        groups: vec!["developers".to_string()],
    }
}

pub fn request(namespace: &str, url: &str) -> RegistrationRequest {
    RegistrationRequest {
        namespace: namespace.to_string(),
        repository: Repository::new(url),
    }
}

pub fn existing_request(namespace: &str, url: &str) -> ExistingNamespaceRequest {
    ExistingNamespaceRequest {
        existing_namespace: namespace.to_string(),
        repository: Repository::new(url),
    }
}

pub fn cluster_role(name: &str, rules: Vec<PolicyRule>) -> ClusterRole {
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..ObjectMeta::default()
        },
        rules: Some(rules),
        ..ClusterRole::default()
    }
}

pub fn rule(verbs: &[&str], api_groups: &[&str], resources: &[&str]) -> PolicyRule {
    PolicyRule {
        verbs: verbs.iter().map(ToString::to_string).collect(),
        api_groups: Some(api_groups.iter().map(ToString::to_string).collect()),
        resources: Some(resources.iter().map(ToString::to_string).collect()),
        ..PolicyRule::default()
    }
}
