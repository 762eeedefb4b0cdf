// quilt-mcp-core/src/package.rs
// ============================================================================
// Module: Package Model
// Description: Package references, manifests, copy modes, and top-hashes.
// Purpose: Provide the canonical revision shapes shared by both backends.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A package revision is a canonical manifest: a sorted sequence of
//! `(logical_path, physical_uri, size, hash)` records plus a user metadata
//! blob. The revision identifier (`top_hash`) is the SHA-256 of the
//! RFC 8785 canonical JSON encoding of that manifest, so identical inputs
//! always produce identical revisions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ErrorKind;
use crate::error::OpsError;
use crate::error::OpsResult;
use crate::hashing::hash_canonical_json;
use crate::hashing::HashDigest;
use crate::hashing::DEFAULT_HASH_ALGORITHM;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a package name including the namespace segment.
const MAX_PACKAGE_NAME_LENGTH: usize = 255;
/// Maximum length of a logical path inside a manifest.
const MAX_LOGICAL_PATH_LENGTH: usize = 1024;

// ============================================================================
// SECTION: Package Reference
// ============================================================================

/// Reference to a named package within a registry bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRef {
    /// Registry bucket name (no scheme).
    pub registry: String,
    /// Package name in `namespace/name` form.
    pub name: String,
}

impl PackageRef {
    /// Builds a validated package reference.
    ///
    /// # Errors
    ///
    /// Returns `VALIDATION_FAILED` when the registry or name is malformed.
    pub fn new(registry: impl Into<String>, name: impl Into<String>) -> OpsResult<Self> {
        let registry = registry.into();
        let name = name.into();
        if registry.is_empty() {
            return Err(OpsError::validation("registry must not be empty"));
        }
        validate_package_name(&name)?;
        Ok(Self {
            registry,
            name,
        })
    }
}

impl std::fmt::Display for PackageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.registry, self.name)
    }
}

/// Validates a `namespace/name` package name.
///
/// # Errors
///
/// Returns `VALIDATION_FAILED` when the name is malformed.
pub fn validate_package_name(name: &str) -> OpsResult<()> {
    if name.is_empty() || name.len() > MAX_PACKAGE_NAME_LENGTH {
        return Err(OpsError::validation("package name length out of range"));
    }
    let mut parts = name.split('/');
    let (Some(namespace), Some(leaf), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(OpsError::validation("package name must be `namespace/name`")
            .with_fix_hint("use a two-segment name such as `team/dataset`"));
    };
    for segment in [namespace, leaf] {
        if segment.is_empty()
            || !segment.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(OpsError::validation("package name segments must be alphanumeric"));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: S3 Location
// ============================================================================

/// Parsed `s3://bucket/key` location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Location {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
}

impl S3Location {
    /// Parses an `s3://bucket/key` URI.
    ///
    /// # Errors
    ///
    /// Returns `VALIDATION_FAILED` when the URI is not a well-formed S3 URI.
    pub fn parse(uri: &str) -> OpsResult<Self> {
        let rest = uri
            .strip_prefix("s3://")
            .ok_or_else(|| OpsError::validation(format!("not an s3 uri: {uri}")))?;
        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| OpsError::validation(format!("s3 uri missing key: {uri}")))?;
        if bucket.is_empty() || key.is_empty() {
            return Err(OpsError::validation(format!("s3 uri missing bucket or key: {uri}")));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Returns the `s3://bucket/key` form.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

// ============================================================================
// SECTION: Copy Mode
// ============================================================================

/// Governs whether referenced objects are copied into the registry bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyMode {
    /// No copies; the manifest references original physical locations.
    #[default]
    None,
    /// Copy only entries whose physical key is not already in-registry.
    New,
    /// Copy every entry into the registry bucket.
    All,
}

// ============================================================================
// SECTION: Entry Sources
// ============================================================================

/// Source for a requested package entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageEntrySource {
    /// Reference to an existing S3 object.
    S3Uri(String),
    /// Inline content to be staged into the registry bucket.
    Inline(Vec<u8>),
}

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// A single manifest record mapping a logical path to a physical object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Logical path inside the package.
    pub logical_path: String,
    /// Physical S3 URI of the object.
    pub physical_uri: String,
    /// Object size in bytes.
    pub size: u64,
    /// Content hash of the object.
    pub hash: HashDigest,
}

/// Canonical package manifest: sorted entries plus a metadata blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Entries sorted by logical path.
    pub entries: Vec<ManifestEntry>,
    /// User metadata blob.
    pub metadata: serde_json::Value,
}

impl Manifest {
    /// Builds a canonical manifest: entries sorted, duplicate paths rejected.
    ///
    /// # Errors
    ///
    /// Returns `VALIDATION_FAILED` on duplicate or malformed logical paths.
    pub fn new(mut entries: Vec<ManifestEntry>, metadata: serde_json::Value) -> OpsResult<Self> {
        for entry in &entries {
            validate_logical_path(&entry.logical_path)?;
        }
        entries.sort_by(|a, b| a.logical_path.cmp(&b.logical_path));
        for pair in entries.windows(2) {
            if pair[0].logical_path == pair[1].logical_path {
                return Err(OpsError::validation(format!(
                    "duplicate logical path: {}",
                    pair[0].logical_path
                )));
            }
        }
        Ok(Self {
            entries,
            metadata,
        })
    }

    /// Computes the revision identifier over the canonical manifest bytes.
    ///
    /// # Errors
    ///
    /// Returns `INTERNAL` when canonicalization fails.
    pub fn top_hash(&self) -> OpsResult<HashDigest> {
        hash_canonical_json(DEFAULT_HASH_ALGORITHM, self)
            .map_err(|err| OpsError::internal("manifest canonicalization failed").with_cause(err.to_string()))
    }

    /// Returns the entry at the given logical path, if present.
    #[must_use]
    pub fn entry(&self, logical_path: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|entry| entry.logical_path == logical_path)
    }
}

/// Validates a logical path inside a manifest.
fn validate_logical_path(path: &str) -> OpsResult<()> {
    if path.is_empty() || path.len() > MAX_LOGICAL_PATH_LENGTH {
        return Err(OpsError::validation("logical path length out of range"));
    }
    if path.starts_with('/') || path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(OpsError::validation(format!("logical path must be relative: {path}")));
    }
    Ok(())
}

// ============================================================================
// SECTION: Revision Metadata
// ============================================================================

/// Summary of a stored package revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionInfo {
    /// Revision identifier.
    pub top_hash: HashDigest,
    /// Commit timestamp.
    pub timestamp: DateTime<Utc>,
    /// Commit message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Tags pointing at this revision.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Mutable tag map for a package: each tag points at exactly one revision.
pub type TagMap = BTreeMap<String, HashDigest>;

/// Maps an invalid-tag condition into the uniform envelope.
#[must_use]
pub fn tag_not_found(package: &PackageRef, tag: &str) -> OpsError {
    OpsError::new(ErrorKind::NotFound, format!("tag `{tag}` not found on {package}"))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::CopyMode;
    use super::Manifest;
    use super::ManifestEntry;
    use super::PackageRef;
    use super::S3Location;
    use crate::hashing::hash_bytes;
    use crate::hashing::HashAlgorithm;

    fn entry(path: &str, uri: &str) -> ManifestEntry {
        ManifestEntry {
            logical_path: path.to_string(),
            physical_uri: uri.to_string(),
            size: 4,
            hash: hash_bytes(HashAlgorithm::Sha256, uri.as_bytes()),
        }
    }

    #[test]
    fn package_name_requires_two_segments() {
        assert!(PackageRef::new("bucket", "team/dataset").is_ok());
        assert!(PackageRef::new("bucket", "dataset").is_err());
        assert!(PackageRef::new("bucket", "a/b/c").is_err());
        assert!(PackageRef::new("", "team/dataset").is_err());
    }

    #[test]
    fn s3_uri_round_trips() {
        let location = S3Location::parse("s3://bucket/a/b.csv").expect("parse");
        assert_eq!(location.bucket, "bucket");
        assert_eq!(location.key, "a/b.csv");
        assert_eq!(location.uri(), "s3://bucket/a/b.csv");
        assert!(S3Location::parse("http://bucket/key").is_err());
        assert!(S3Location::parse("s3://bucket").is_err());
    }

    #[test]
    fn manifest_sorts_entries_and_rejects_duplicates() {
        let manifest = Manifest::new(
            vec![entry("b.csv", "s3://b/b.csv"), entry("a.csv", "s3://b/a.csv")],
            json!({}),
        )
        .expect("manifest");
        assert_eq!(manifest.entries[0].logical_path, "a.csv");
        let duplicate = Manifest::new(
            vec![entry("a.csv", "s3://b/a.csv"), entry("a.csv", "s3://b/a2.csv")],
            json!({}),
        );
        assert!(duplicate.is_err());
    }

    #[test]
    fn top_hash_is_entry_order_independent() {
        let forward = Manifest::new(
            vec![entry("a/x.csv", "s3://b/x.csv"), entry("a/y.csv", "s3://b/y.csv")],
            json!({"k": "v"}),
        )
        .expect("manifest");
        let reversed = Manifest::new(
            vec![entry("a/y.csv", "s3://b/y.csv"), entry("a/x.csv", "s3://b/x.csv")],
            json!({"k": "v"}),
        )
        .expect("manifest");
        assert_eq!(
            forward.top_hash().expect("hash"),
            reversed.top_hash().expect("hash")
        );
    }

    #[test]
    fn top_hash_changes_with_metadata() {
        let entries = vec![entry("a/x.csv", "s3://b/x.csv")];
        let one = Manifest::new(entries.clone(), json!({"k": "v"})).expect("manifest");
        let two = Manifest::new(entries, json!({"k": "w"})).expect("manifest");
        assert_ne!(one.top_hash().expect("hash"), two.top_hash().expect("hash"));
    }

    #[test]
    fn copy_mode_serializes_snake_case() {
        assert_eq!(serde_json::to_value(CopyMode::None).expect("json"), "none");
        assert_eq!(serde_json::to_value(CopyMode::New).expect("json"), "new");
        assert_eq!(serde_json::to_value(CopyMode::All).expect("json"), "all");
    }

    #[test]
    fn rejects_traversal_logical_paths() {
        let bad = Manifest::new(vec![entry("../etc/passwd", "s3://b/x")], json!({}));
        assert!(bad.is_err());
        let absolute = Manifest::new(vec![entry("/abs", "s3://b/x")], json!({}));
        assert!(absolute.is_err());
    }
}
