//! # Constants
//!
//! Label keys, fixed resource names and defaults shared across the service.
//!
//! The label and annotation keys are an interoperability contract: other
//! tooling selects tenants by them, so they must not change.

/// Value written to both managed-by labels
pub const MANAGED_BY_VALUE: &str = "gitops-registration-service";

/// Service-specific managed-by label
pub const LABEL_MANAGED_BY: &str = "gitops.io/managed-by";

/// Kubernetes recommended managed-by label
pub const LABEL_K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Short registration ID (label and annotation)
pub const LABEL_REGISTRATION_ID: &str = "gitops.io/registration-id";

/// First 8 hex chars of SHA-256(repository URL)
pub const LABEL_REPOSITORY_HASH: &str = "gitops.io/repository-hash";

/// Host portion of the repository URL
pub const LABEL_REPOSITORY_DOMAIN: &str = "gitops.io/repository-domain";

/// Destination namespace, set on CD objects
pub const LABEL_TENANT: &str = "gitops.io/tenant";

pub const ANNOTATION_REPOSITORY_URL: &str = "gitops.io/repository-url";
pub const ANNOTATION_REPOSITORY_BRANCH: &str = "gitops.io/repository-branch";
pub const ANNOTATION_REGISTRATION_ID: &str = "gitops.io/registration-id";

/// User that converted an existing namespace
pub const ANNOTATION_REGISTERED_BY: &str = "gitops.io/registered-by";

/// Service account used in legacy (non-impersonation) mode
pub const LEGACY_SERVICE_ACCOUNT: &str = "gitops";

/// ClusterRole bound in legacy mode
pub const LEGACY_CLUSTER_ROLE: &str = "gitops-role";

/// RoleBinding created in legacy mode
pub const LEGACY_ROLE_BINDING: &str = "gitops-role-binding";

/// Path inside the tenant repository the Application syncs from
pub const APPLICATION_SOURCE_PATH: &str = "manifests/";

/// Suffix appended to the namespace to name the Application
pub const APPLICATION_NAME_SUFFIX: &str = "-app";

/// Branch used when a request omits one
pub const DEFAULT_BRANCH: &str = "main";

/// In-cluster API server address used as the CD destination
pub const DEFAULT_DESTINATION_SERVER: &str = "https://kubernetes.default.svc";

/// Namespace the CD controller (and its custom resources) live in
pub const DEFAULT_CD_NAMESPACE: &str = "argocd";

/// Default prefix for generated impersonation service accounts
pub const DEFAULT_IMPERSONATION_SA_PREFIX: &str = "gitops-sa-";

/// Default HTTP server port for the API, metrics and health probes
pub const DEFAULT_PORT: u16 = 8080;

/// Length registration IDs are truncated to for label values
pub const REGISTRATION_ID_LABEL_LEN: usize = 8;

/// Length of the repository hash label value
pub const REPOSITORY_HASH_LEN: usize = 8;

/// Kubernetes label value length limit
pub const MAX_LABEL_VALUE_LEN: usize = 63;

/// Maximum accepted request body size (bytes)
pub const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;
