//! GitOps Registration Service Library
//!
//! Onboards Git repositories as isolated Kubernetes tenants: one namespace,
//! one restricted identity and one ArgoCD project/application per repository.
//! Tests are included in the module files and under `tests/`.

pub mod argocd;
pub mod auth;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod error;
pub mod observability;
pub mod provisioner;
pub mod registration;
pub mod repository;
pub mod server;

pub use error::{RegistrationError, RegistrationStep};
pub use registration::{
    ExistingNamespaceRequest, Registration, RegistrationPhase, RegistrationRequest,
    RegistrationService, RegistrationStatus, Repository,
};
