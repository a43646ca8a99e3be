//! # ClusterRole Security Analyzer
//!
//! Static inspection of a ClusterRole's rules before it is used as the
//! impersonation identity for tenants. The result is advisory: warnings are
//! surfaced to operators, nothing is blocked.
//!
//! Each rule is checked independently against three risks:
//!
//! 1. Cluster-admin equivalence (`*` verbs on `*` resources)
//! 2. Namespace enumeration (`list`/`watch` on `namespaces`), which lets a
//!    tenant discover other tenants
//! 3. Mutation of inherently cluster-scoped kinds

use k8s_openapi::api::rbac::v1::{ClusterRole, PolicyRule};
use serde::Serialize;

/// Kinds that exist outside any namespace
pub const CLUSTER_SCOPED_RESOURCES: [&str; 5] = [
    "nodes",
    "namespaces",
    "clusterroles",
    "clusterrolebindings",
    "persistentvolumes",
];

const MUTATING_VERBS: [&str; 4] = ["create", "update", "patch", "delete"];

const WILDCARD: &str = "*";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRoleValidation {
    pub exists: bool,
    pub has_cluster_admin: bool,
    pub has_namespace_list: bool,
    pub has_cluster_scoped_mutation: bool,
    pub warnings: Vec<String>,
    /// Union of `resources` across all rules, in first-seen order
    pub resources: Vec<String>,
}

impl ClusterRoleValidation {
    /// Result for a ClusterRole that could not be found
    pub fn missing(name: &str) -> Self {
        Self {
            exists: false,
            warnings: vec![format!("ClusterRole '{name}' does not exist")],
            ..Self::default()
        }
    }

    pub fn is_risky(&self) -> bool {
        self.has_cluster_admin || self.has_namespace_list || self.has_cluster_scoped_mutation
    }
}

fn grants(values: &[String], wanted: &str) -> bool {
    values.iter().any(|v| v == wanted || v == WILDCARD)
}

/// Analyze an existing ClusterRole
pub fn analyze_cluster_role(role: &ClusterRole) -> ClusterRoleValidation {
    let rules = role.rules.as_deref().unwrap_or_default();
    analyze_rules(rules)
}

/// Analyze a set of policy rules
pub fn analyze_rules(rules: &[PolicyRule]) -> ClusterRoleValidation {
    let mut result = ClusterRoleValidation {
        exists: true,
        ..ClusterRoleValidation::default()
    };

    for (index, rule) in rules.iter().enumerate() {
        let verbs = &rule.verbs;
        let resources = rule.resources.as_deref().unwrap_or_default();

        for resource in resources {
            if !result.resources.contains(resource) {
                result.resources.push(resource.clone());
            }
        }

        if verbs.iter().any(|v| v == WILDCARD) && resources.iter().any(|r| r == WILDCARD) {
            result.has_cluster_admin = true;
            result.warnings.push(format!(
                "rule {index}: grants all verbs on all resources (cluster-admin equivalent)"
            ));
        }

        if (grants(verbs, "list") || grants(verbs, "watch")) && grants(resources, "namespaces") {
            result.has_namespace_list = true;
            result.warnings.push(format!(
                "rule {index}: can list/watch namespaces, exposing other tenants"
            ));
        }

        if MUTATING_VERBS.iter().any(|verb| grants(verbs, verb)) {
            for kind in CLUSTER_SCOPED_RESOURCES {
                if grants(resources, kind) {
                    result.has_cluster_scoped_mutation = true;
                    result.warnings.push(format!(
                        "rule {index}: can modify cluster-scoped resource '{kind}'"
                    ));
                }
            }
        }
    }

    result
}
