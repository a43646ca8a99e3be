//! # Registration
//!
//! Tenant onboarding workflows: registering a repository into a new
//! namespace, and converting an existing namespace.

mod orchestrator;
mod types;

pub use orchestrator::RegistrationService;
pub use types::{
    ExistingNamespaceRequest, Registration, RegistrationPhase, RegistrationRequest,
    RegistrationStatus, Repository,
};
