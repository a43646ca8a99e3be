//! # API Server Authorizer
//!
//! Delegates authentication to a `TokenReview` and authorization to a
//! `SubjectAccessReview` asking whether the user may `update` the target
//! namespace object.

use super::{AuthError, Authorizer, UserIdentity};
use async_trait::async_trait;
use k8s_openapi::api::authentication::v1::{TokenReview, TokenReviewSpec};
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SubjectAccessReview, SubjectAccessReviewSpec,
};
use kube::api::{Api, ObjectMeta, PostParams};
use kube::Client;
use tracing::debug;

#[derive(Clone)]
pub struct KubeAuthorizer {
    client: Client,
}

impl std::fmt::Debug for KubeAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeAuthorizer").finish_non_exhaustive()
    }
}

impl KubeAuthorizer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Authorizer for KubeAuthorizer {
    async fn extract_user_info(&self, token: &str) -> Result<UserIdentity, AuthError> {
        let api: Api<TokenReview> = Api::all(self.client.clone());
        let review = TokenReview {
            metadata: ObjectMeta::default(),
            spec: TokenReviewSpec {
                token: Some(token.to_string()),
                ..TokenReviewSpec::default()
            },
            status: None,
        };

        let result = api
            .create(&PostParams::default(), &review)
            .await
            .map_err(|e| AuthError::Backend(format!("TokenReview failed: {e}")))?;
        let status = result
            .status
            .ok_or_else(|| AuthError::Backend("TokenReview returned no status".to_string()))?;

        if status.authenticated != Some(true) {
            return Err(AuthError::InvalidToken(
                status.error.unwrap_or_else(|| "not authenticated".to_string()),
            ));
        }
        let user = status
            .user
            .ok_or_else(|| AuthError::InvalidToken("no user in TokenReview".to_string()))?;
        let username = user
            .username
            .ok_or_else(|| AuthError::InvalidToken("no username in TokenReview".to_string()))?;

        debug!("Token authenticated as {}", username);
        Ok(UserIdentity {
            username,
            uid: user.uid,
            groups: user.groups.unwrap_or_default(),
        })
    }

    async fn validate_namespace_access(
        &self,
        user: &UserIdentity,
        namespace: &str,
    ) -> Result<(), AuthError> {
        let api: Api<SubjectAccessReview> = Api::all(self.client.clone());
        let review = SubjectAccessReview {
            metadata: ObjectMeta::default(),
            spec: SubjectAccessReviewSpec {
                user: Some(user.username.clone()),
                uid: user.uid.clone(),
                groups: (!user.groups.is_empty()).then(|| user.groups.clone()),
                resource_attributes: Some(ResourceAttributes {
                    group: Some(String::new()),
                    resource: Some("namespaces".to_string()),
                    verb: Some("update".to_string()),
                    name: Some(namespace.to_string()),
                    namespace: Some(namespace.to_string()),
                    ..ResourceAttributes::default()
                }),
                ..SubjectAccessReviewSpec::default()
            },
            status: None,
        };

        let result = api
            .create(&PostParams::default(), &review)
            .await
            .map_err(|e| AuthError::Backend(format!("SubjectAccessReview failed: {e}")))?;
        let status = result.status.ok_or_else(|| {
            AuthError::Backend("SubjectAccessReview returned no status".to_string())
        })?;

        if status.allowed {
            debug!("User {} may manage namespace {}", user.username, namespace);
            Ok(())
        } else {
            Err(AuthError::Forbidden {
                user: user.username.clone(),
                namespace: namespace.to_string(),
                reason: status.reason,
            })
        }
    }
}
