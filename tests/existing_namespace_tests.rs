//! # Existing Namespace Conversion Tests
//!
//! These tests verify:
//! - Converted namespaces keep their labels and gain tenant metadata
//! - Missing namespaces are rejected
//! - Metadata update failures do not abort the conversion
//! - Rollback honours `registration.rollback_existing_namespace` for both
//!   identity and CD resource failures
//! - Token-based authorization in front of the conversion

mod common;

use common::{
    alice, existing_request, impersonation_config, legacy_config, service,
    service_with_authorizer, ALICE_TOKEN,
};
use gitops_registration::cluster::{FailPoint, MemoryCluster};
use gitops_registration::constants::{ANNOTATION_REGISTERED_BY, LABEL_REPOSITORY_HASH};
use gitops_registration::{RegistrationError, RegistrationPhase, RegistrationStep};
use std::collections::BTreeMap;
use std::sync::Arc;

fn seeded_cluster() -> Arc<MemoryCluster> {
    let cluster = Arc::new(MemoryCluster::new());
    cluster.insert_namespace(
        "legacy-ns",
        BTreeMap::from([("owner".to_string(), "payments".to_string())]),
    );
    cluster
}

#[tokio::test]
async fn test_convert_legacy_namespace() {
    let cluster = seeded_cluster();
    let registration = service(&cluster, legacy_config())
        .register_existing_namespace(
            &existing_request("legacy-ns", "https://github.com/user/repo"),
            &alice(),
        )
        .await
        .unwrap();

    assert_eq!(registration.status.phase, RegistrationPhase::Active);
    assert!(!registration.status.namespace_created);
    assert_eq!(registration.created_by.as_deref(), Some("alice"));
    assert_eq!(
        registration.status.argocd_application.as_deref(),
        Some("legacy-ns-app")
    );

    let namespace = cluster.namespace("legacy-ns").unwrap();
    let labels = namespace.metadata.labels.unwrap();
    assert_eq!(labels[LABEL_REPOSITORY_HASH], "b719fba9");
    assert_eq!(labels["owner"], "payments");
    assert_eq!(
        namespace.metadata.annotations.unwrap()[ANNOTATION_REGISTERED_BY],
        "alice"
    );
}

#[tokio::test]
async fn test_conversion_always_uses_legacy_identity() {
    let cluster = seeded_cluster();
    let registration = service(&cluster, impersonation_config())
        .register_existing_namespace(
            &existing_request("legacy-ns", "https://github.com/user/repo"),
            &alice(),
        )
        .await
        .unwrap();

    assert_eq!(registration.status.service_account.as_deref(), Some("gitops"));
    assert_eq!(cluster.role_bindings("legacy-ns")[0].role_ref.name, "gitops-role");

    // The project maps the legacy account, so the controller impersonates it
    let project = cluster.app_project("legacy-ns").unwrap();
    let mapped = &project.spec.destination_service_accounts;
    assert_eq!(mapped.len(), 1);
    assert_eq!(mapped[0].default_service_account, "gitops");
    assert!(registration.status.impersonation_used);
}

#[tokio::test]
async fn test_legacy_conversion_reports_no_impersonation() {
    let cluster = seeded_cluster();
    let registration = service(&cluster, legacy_config())
        .register_existing_namespace(
            &existing_request("legacy-ns", "https://github.com/user/repo"),
            &alice(),
        )
        .await
        .unwrap();

    assert!(!registration.status.impersonation_used);
    let project = cluster.app_project("legacy-ns").unwrap();
    assert!(project.spec.destination_service_accounts.is_empty());
}

#[tokio::test]
async fn test_missing_namespace_is_rejected() {
    let cluster = Arc::new(MemoryCluster::new());
    let err = service(&cluster, legacy_config())
        .register_existing_namespace(
            &existing_request("ghost", "https://github.com/user/repo"),
            &alice(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::NamespaceNotFound(_)));
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_metadata_failure_is_not_fatal() {
    let cluster = seeded_cluster();
    cluster.fail_on(FailPoint::UpdateNamespace);

    let registration = service(&cluster, legacy_config())
        .register_existing_namespace(
            &existing_request("legacy-ns", "https://github.com/user/repo"),
            &alice(),
        )
        .await
        .unwrap();
    assert_eq!(registration.status.phase, RegistrationPhase::Active);

    let labels = cluster.namespace("legacy-ns").unwrap().metadata.labels.unwrap();
    assert!(!labels.contains_key(LABEL_REPOSITORY_HASH));
}

#[tokio::test]
async fn test_cd_failure_deletes_existing_namespace_by_default() {
    let cluster = seeded_cluster();
    cluster.fail_on(FailPoint::CreateApplication);

    let err = service(&cluster, legacy_config())
        .register_existing_namespace(
            &existing_request("legacy-ns", "https://github.com/user/repo"),
            &alice(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::Dependency {
            step: RegistrationStep::Application,
            ..
        }
    ));
    assert!(cluster.namespace("legacy-ns").is_none());
    assert!(cluster.app_project("legacy-ns").is_none());
}

#[tokio::test]
async fn test_cd_failure_keeps_existing_namespace_when_configured() {
    let cluster = seeded_cluster();
    cluster.fail_on(FailPoint::CreateApplication);
    let mut config = legacy_config();
    config.registration.rollback_existing_namespace = false;

    let err = service(&cluster, config)
        .register_existing_namespace(
            &existing_request("legacy-ns", "https://github.com/user/repo"),
            &alice(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 500);
    assert!(cluster.namespace("legacy-ns").is_some());
    // The project created by the failed attempt is still removed
    assert!(cluster.app_project("legacy-ns").is_none());
}

#[tokio::test]
async fn test_identity_failure_deletes_existing_namespace_by_default() {
    let cluster = seeded_cluster();
    cluster.fail_on(FailPoint::CreateRoleBinding);

    let err = service(&cluster, legacy_config())
        .register_existing_namespace(
            &existing_request("legacy-ns", "https://github.com/user/repo"),
            &alice(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::Dependency {
            step: RegistrationStep::Identity,
            ..
        }
    ));
    assert!(cluster.namespace("legacy-ns").is_none());
    assert!(cluster.app_project("legacy-ns").is_none());
}

#[tokio::test]
async fn test_identity_failure_keeps_existing_namespace_when_configured() {
    let cluster = seeded_cluster();
    cluster.fail_on(FailPoint::CreateRoleBinding);
    let mut config = legacy_config();
    config.registration.rollback_existing_namespace = false;

    let err = service(&cluster, config)
        .register_existing_namespace(
            &existing_request("legacy-ns", "https://github.com/user/repo"),
            &alice(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::Dependency {
            step: RegistrationStep::Identity,
            ..
        }
    ));

    let namespace = cluster.namespace("legacy-ns").unwrap();
    assert_eq!(namespace.metadata.labels.unwrap()["owner"], "payments");
    assert!(cluster.app_project("legacy-ns").is_none());
}

#[tokio::test]
async fn test_failed_project_cleanup_still_returns_application_error() {
    let cluster = seeded_cluster();
    cluster.fail_on(FailPoint::CreateApplication);
    cluster.fail_on(FailPoint::DeleteAppProject);
    let mut config = legacy_config();
    config.registration.rollback_existing_namespace = false;

    let err = service(&cluster, config)
        .register_existing_namespace(
            &existing_request("legacy-ns", "https://github.com/user/repo"),
            &alice(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::Dependency {
            step: RegistrationStep::Application,
            ..
        }
    ));
    // Cleanup failed, so the project is left behind
    assert!(cluster.app_project("legacy-ns").is_some());
    assert!(cluster.namespace("legacy-ns").is_some());
}

#[tokio::test]
async fn test_token_path_converts_trimmed_namespace() {
    let cluster = seeded_cluster();
    cluster.insert_namespace("payments", BTreeMap::new());
    let service = service_with_authorizer(&cluster, legacy_config());

    let registration = service
        .register_existing_namespace_with_token(
            &existing_request(" legacy-ns ", "https://github.com/user/repo"),
            Some(ALICE_TOKEN),
        )
        .await
        .unwrap();
    assert_eq!(registration.namespace, "legacy-ns");
    assert!(cluster.app_project("legacy-ns").is_some());

    let err = service
        .register_existing_namespace_with_token(
            &existing_request(" payments ", "https://github.com/user/repo"),
            Some(ALICE_TOKEN),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::Forbidden(_)));
    assert!(err.to_string().contains("'payments'"));
    assert!(cluster.app_project("payments").is_none());
}

#[tokio::test]
async fn test_authorized_conversion_with_token() {
    let cluster = seeded_cluster();
    let service = service_with_authorizer(&cluster, legacy_config());

    let registration = service
        .register_existing_namespace_with_token(
            &existing_request("legacy-ns", "https://github.com/user/repo"),
            Some(ALICE_TOKEN),
        )
        .await
        .unwrap();
    assert_eq!(registration.created_by.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_token_failures() {
    let cluster = seeded_cluster();
    cluster.insert_namespace("payments", BTreeMap::new());
    let service = service_with_authorizer(&cluster, legacy_config());
    let request = existing_request("legacy-ns", "https://github.com/user/repo");

    let err = service
        .register_existing_namespace_with_token(&request, None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 401);

    let err = service
        .register_existing_namespace_with_token(&request, Some("stolen"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 401);

    let err = service
        .register_existing_namespace_with_token(
            &existing_request("payments", "https://github.com/user/repo"),
            Some(ALICE_TOKEN),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::Forbidden(_)));

    // Nothing was touched
    assert!(cluster.app_project("legacy-ns").is_none());
    assert!(cluster.app_project("payments").is_none());
}

#[tokio::test]
async fn test_validation_precedes_authorization() {
    let cluster = seeded_cluster();
    let err = service_with_authorizer(&cluster, legacy_config())
        .register_existing_namespace_with_token(
            &existing_request("", "https://github.com/user/repo"),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::Validation(_)));
}
