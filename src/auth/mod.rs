//! # Authorization
//!
//! Caller identity and namespace access checks used before an existing
//! namespace is converted into a tenant.
//!
//! - [`KubeAuthorizer`] asks the API server (TokenReview + SubjectAccessReview)
//! - [`StaticAuthorizer`] uses fixed token/grant tables, for tests and local runs

mod review;
mod static_table;

pub use review::KubeAuthorizer;
pub use static_table::StaticAuthorizer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An authenticated caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub username: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl UserIdentity {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,
    #[error("Token rejected: {0}")]
    InvalidToken(String),
    #[error("User '{user}' may not manage namespace '{namespace}'{}", reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Forbidden {
        user: String,
        namespace: String,
        reason: Option<String>,
    },
    #[error("Authorization backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Resolve a bearer token to the user it belongs to
    async fn extract_user_info(&self, token: &str) -> Result<UserIdentity, AuthError>;

    /// Succeed only if `user` may manage `namespace`
    async fn validate_namespace_access(
        &self,
        user: &UserIdentity,
        namespace: &str,
    ) -> Result<(), AuthError>;
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
