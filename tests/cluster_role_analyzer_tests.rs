//! # ClusterRole Analyzer Tests
//!
//! Risk detection over realistic tenant roles, read through the provisioner.

mod common;

use common::{cluster_role, rule};
use gitops_registration::cluster::{ClusterClients, MemoryCluster};
use gitops_registration::provisioner::{analyze_cluster_role, ClusterProvisioner};
use std::sync::Arc;

#[test]
fn test_wildcard_role_is_cluster_admin() {
    let result = analyze_cluster_role(&cluster_role("everything", vec![rule(&["*"], &["*"], &["*"])]));
    assert!(result.has_cluster_admin);
    assert!(!result.warnings.is_empty());
}

#[test]
fn test_read_only_pods_has_no_risk() {
    let result = analyze_cluster_role(&cluster_role(
        "pod-reader",
        vec![rule(&["get", "list"], &[""], &["pods"])],
    ));
    assert!(result.exists);
    assert!(!result.has_cluster_admin);
    assert!(!result.has_namespace_list);
    assert!(!result.has_cluster_scoped_mutation);
    assert!(result.warnings.is_empty());
    assert!(!result.is_risky());
}

#[test]
fn test_namespace_watch_is_flagged() {
    let result = analyze_cluster_role(&cluster_role(
        "ns-watcher",
        vec![rule(&["watch"], &[""], &["namespaces"])],
    ));
    assert!(result.has_namespace_list);
    assert!(!result.has_cluster_scoped_mutation);
    assert_eq!(result.warnings.len(), 1);
}

#[test]
fn test_cluster_scoped_mutation_warns_per_kind() {
    let result = analyze_cluster_role(&cluster_role(
        "node-admin",
        vec![rule(
            &["patch"],
            &["", "rbac.authorization.k8s.io"],
            &["nodes", "clusterrolebindings"],
        )],
    ));
    assert!(result.has_cluster_scoped_mutation);
    assert!(!result.has_cluster_admin);
    assert_eq!(result.warnings.len(), 2);
}

#[test]
fn test_typical_tenant_role() {
    let result = analyze_cluster_role(&cluster_role(
        "tenant-deployer",
        vec![
            rule(
                &["get", "list", "watch", "create", "update", "patch", "delete"],
                &["", "apps"],
                &["pods", "services", "configmaps", "deployments"],
            ),
            rule(&["get", "list"], &["networking.k8s.io"], &["ingresses", "services"]),
        ],
    ));
    assert!(!result.is_risky());
    assert_eq!(
        result.resources,
        vec!["pods", "services", "configmaps", "deployments", "ingresses"]
    );
}

#[tokio::test]
async fn test_missing_role_through_provisioner() {
    let cluster = Arc::new(MemoryCluster::new());
    let provisioner = ClusterProvisioner::new(ClusterClients::memory(Arc::clone(&cluster)));

    let result = provisioner.validate_cluster_role("absent").await.unwrap();
    assert!(!result.exists);
    assert!(!result.is_risky());
    assert_eq!(result.warnings.len(), 1);
}
