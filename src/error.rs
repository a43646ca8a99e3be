//! # Registration Errors
//!
//! The error taxonomy surfaced by the registration workflow and its HTTP
//! mapping.

use crate::auth::AuthError;
use crate::cluster::ClusterError;
use std::fmt;
use thiserror::Error;

/// The workflow step a dependency failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStep {
    Authorization,
    ConflictCheck,
    NamespaceLookup,
    NamespaceCreate,
    Identity,
    AppProject,
    Application,
}

impl RegistrationStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authorization => "authorization",
            Self::ConflictCheck => "repository conflict check",
            Self::NamespaceLookup => "namespace lookup",
            Self::NamespaceCreate => "namespace creation",
            Self::Identity => "tenant identity setup",
            Self::AppProject => "AppProject creation",
            Self::Application => "Application creation",
        }
    }
}

impl fmt::Display for RegistrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Namespace '{0}' already exists")]
    NamespaceConflict(String),
    #[error("Repository '{repository_url}' is already registered to AppProject '{app_project}'")]
    RepositoryConflict {
        repository_url: String,
        app_project: String,
    },
    #[error("Namespace '{0}' does not exist")]
    NamespaceNotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Failed during {step}: {source}")]
    Dependency {
        step: RegistrationStep,
        #[source]
        source: ClusterError,
    },
}

impl RegistrationError {
    pub fn dependency(step: RegistrationStep, source: ClusterError) -> Self {
        Self::Dependency { step, source }
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NamespaceNotFound(_) => 404,
            Self::NamespaceConflict(_) | Self::RepositoryConflict { .. } => 409,
            Self::Dependency { .. } => 500,
        }
    }

    /// Short machine-readable code for response bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NamespaceConflict(_) => "NAMESPACE_CONFLICT",
            Self::RepositoryConflict { .. } => "REPOSITORY_CONFLICT",
            Self::NamespaceNotFound(_) => "NAMESPACE_NOT_FOUND",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Dependency { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::NamespaceConflict(_) | Self::RepositoryConflict { .. }
        )
    }

    /// Message safe to return to callers; dependency failures are opaque
    pub fn public_message(&self) -> String {
        match self {
            Self::Dependency { .. } => "Registration failed due to an internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<AuthError> for RegistrationError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken | AuthError::InvalidToken(_) => {
                Self::Unauthorized(err.to_string())
            }
            AuthError::Forbidden { .. } => Self::Forbidden(err.to_string()),
            AuthError::Backend(message) => Self::Dependency {
                step: RegistrationStep::Authorization,
                source: ClusterError::Other(message),
            },
        }
    }
}
