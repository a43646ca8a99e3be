//! # Repository Fingerprinting
//!
//! Deterministic, label-safe identifiers derived from a repository URL.
//!
//! - [`repository_hash`] - first 8 hex chars of SHA-256(URL), the conflict key
//! - [`repository_domain`] - host (and port) of the URL for grouping/audit
//! - [`short_registration_id`] - registration ID truncated for label values

use crate::constants::{MAX_LABEL_VALUE_LEN, REGISTRATION_ID_LABEL_LEN, REPOSITORY_HASH_LEN};
use sha2::{Digest, Sha256};
use url::Url;

/// Compute the repository hash used as the `gitops.io/repository-hash` label
///
/// The URL is hashed exactly as given (no normalization), so
/// `https://github.com/org/repo` and `https://github.com/org/repo.git` are
/// distinct repositories.
pub fn repository_hash(repo_url: &str) -> String {
    let digest = Sha256::digest(repo_url.as_bytes());
    let mut hex = format!("{digest:x}");
    hex.truncate(REPOSITORY_HASH_LEN);
    hex
}

/// Extract the repository domain for the `gitops.io/repository-domain` label
///
/// Returns the authority host including any explicit port, with `:` replaced
/// by `-` and truncated to the label length limit. Returns `unknown` for
/// anything that does not parse as an absolute URL with a host (including
/// scp-style `git@host:path` references).
pub fn repository_domain(repo_url: &str) -> String {
    let Ok(parsed) = Url::parse(repo_url) else {
        return "unknown".to_string();
    };
    if parsed.host_str().is_none_or(str::is_empty) {
        return "unknown".to_string();
    }

    // Url normalizes the host (lowercase, default port stripped); the label
    // carries the authority as written.
    let host = raw_authority_host(repo_url)
        .map_or_else(|| parsed.host_str().unwrap_or_default().to_string(), str::to_string);
    if host.is_empty() {
        return "unknown".to_string();
    }

    let domain = host.replace(':', "-");
    truncate_label_value(&domain).to_string()
}

/// Longest prefix of `value` that fits the label value byte limit
fn truncate_label_value(value: &str) -> &str {
    if value.len() <= MAX_LABEL_VALUE_LEN {
        return value;
    }
    let mut end = MAX_LABEL_VALUE_LEN;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Authority section of `scheme://[userinfo@]host[:port]/...` without userinfo
fn raw_authority_host(repo_url: &str) -> Option<&str> {
    let (_, rest) = repo_url.split_once("://")?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..end];
    let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    Some(host)
}

/// Truncate a registration ID for use as a label value
pub fn short_registration_id(id: &str) -> String {
    id.chars().take(REGISTRATION_ID_LABEL_LEN).collect()
}
