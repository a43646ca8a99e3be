//! # ArgoCD Integration
//!
//! Resource types, pure builders and the repository conflict detector.

mod builder;
mod conflict;
mod types;

pub use builder::{
    CdResourceBuilder, ResourcePolicy, SYNC_OPTION_NO_CREATE_NAMESPACE,
    SYNC_OPTION_PRUNE_BACKGROUND, SYNC_OPTION_PRUNE_LAST,
};
pub use conflict::{ConflictDetector, RepositoryConflict};
pub use types::{
    AppProject, AppProjectSpec, Application, ApplicationDestination, ApplicationSource,
    ApplicationSpec, AutomatedSync, DestinationServiceAccount, ProjectRole, SyncPolicy,
    ARGOCD_GROUP, ARGOCD_VERSION,
};
