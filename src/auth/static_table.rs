//! # Static Authorizer
//!
//! Token and namespace grants from fixed tables.

use super::{AuthError, Authorizer, UserIdentity};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct StaticAuthorizer {
    tokens: HashMap<String, UserIdentity>,
    grants: HashMap<String, HashSet<String>>,
}

impl StaticAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(mut self, token: &str, user: UserIdentity) -> Self {
        self.tokens.insert(token.to_string(), user);
        self
    }

    /// Allow `username` to manage `namespace`
    #[must_use]
    pub fn grant(mut self, username: &str, namespace: &str) -> Self {
        self.grants
            .entry(username.to_string())
            .or_default()
            .insert(namespace.to_string());
        self
    }
}

#[async_trait]
impl Authorizer for StaticAuthorizer {
    async fn extract_user_info(&self, token: &str) -> Result<UserIdentity, AuthError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| AuthError::InvalidToken("unknown token".to_string()))
    }

    async fn validate_namespace_access(
        &self,
        user: &UserIdentity,
        namespace: &str,
    ) -> Result<(), AuthError> {
        let allowed = self
            .grants
            .get(&user.username)
            .is_some_and(|namespaces| namespaces.contains(namespace));
        if allowed {
            Ok(())
        } else {
            Err(AuthError::Forbidden {
                user: user.username.clone(),
                namespace: namespace.to_string(),
                reason: None,
            })
        }
    }
}
