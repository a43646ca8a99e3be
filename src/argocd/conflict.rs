//! # Conflict Detector
//!
//! A repository may back at most one tenant. Every AppProject is labelled
//! with the repository hash, so finding an existing binding is a single
//! label-selector list.

use crate::cluster::{CdResourceStore, ClusterError};
use crate::constants::{LABEL_REPOSITORY_HASH, LABEL_TENANT};
use std::sync::Arc;
use tracing::debug;

/// An existing tenant already bound to the repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConflict {
    pub repository_hash: String,
    pub app_project: String,
    pub tenant_namespace: Option<String>,
}

#[derive(Clone)]
pub struct ConflictDetector {
    cd_resources: Arc<dyn CdResourceStore>,
}

impl std::fmt::Debug for ConflictDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictDetector").finish_non_exhaustive()
    }
}

impl ConflictDetector {
    pub fn new(cd_resources: Arc<dyn CdResourceStore>) -> Self {
        Self { cd_resources }
    }

    /// Find an AppProject already labelled with `repository_hash`
    pub async fn find_repository_conflict(
        &self,
        repository_hash: &str,
    ) -> Result<Option<RepositoryConflict>, ClusterError> {
        let selector = format!("{LABEL_REPOSITORY_HASH}={repository_hash}");
        let projects = self.cd_resources.list_app_projects(&selector).await?;
        debug!(
            "Found {} AppProject(s) matching {}",
            projects.len(),
            selector
        );

        Ok(projects.into_iter().next().map(|project| RepositoryConflict {
            repository_hash: repository_hash.to_string(),
            app_project: project.metadata.name.clone().unwrap_or_default(),
            tenant_namespace: project
                .metadata
                .labels
                .as_ref()
                .and_then(|labels| labels.get(LABEL_TENANT))
                .cloned(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argocd::{CdResourceBuilder, ResourcePolicy};
    use crate::cluster::{FailPoint, MemoryCluster};
    use crate::repository::repository_hash;

    #[tokio::test]
    async fn test_detects_existing_binding() {
        let cluster = Arc::new(MemoryCluster::new());
        let detector = ConflictDetector::new(Arc::clone(&cluster) as Arc<dyn CdResourceStore>);
        let repo = "https://github.com/user/repo";

        assert!(detector
            .find_repository_conflict(&repository_hash(repo))
            .await
            .unwrap()
            .is_none());

        let builder = CdResourceBuilder::new(
            "argocd",
            "https://kubernetes.default.svc",
            true,
            ResourcePolicy::Unrestricted,
        );
        let project = builder.build_app_project("team-a", "team-a", repo, "gitops-sa-abcde");
        cluster.create_app_project(project).await.unwrap();

        let conflict = detector
            .find_repository_conflict("b719fba9")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conflict.app_project, "team-a");
        assert_eq!(conflict.tenant_namespace.as_deref(), Some("team-a"));

        assert!(detector
            .find_repository_conflict(&repository_hash("https://github.com/user/other"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_failure_propagates() {
        let cluster = Arc::new(MemoryCluster::new());
        cluster.fail_on(FailPoint::ListAppProjects);
        let detector = ConflictDetector::new(cluster);
        assert!(detector.find_repository_conflict("b719fba9").await.is_err());
    }
}
