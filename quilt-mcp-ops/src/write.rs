// quilt-mcp-ops/src/write.rs
// ============================================================================
// Module: Package Write Protocol
// Description: Entry resolution, copy-mode planning, manifest assembly.
// Purpose: One deterministic write path shared by both backends.
// Dependencies: quilt-mcp-core, quilt-mcp-aws
// ============================================================================

//! ## Overview
//! A revision write resolves each requested entry to a physical location,
//! applies exactly one copy mode, assembles the sorted canonical manifest,
//! and hashes it into the `top_hash`. Planning is pure: the copy actions and
//! final manifest are computed before any S3 traffic, so identical inputs
//! always produce identical revisions.
//!
//! Entry hashes: inline content hashes over its bytes; S3-referenced entries
//! hash over `(uri, etag, size)`, which is stable while the object is
//! unchanged and avoids a full read of every referenced object.

// ============================================================================
// SECTION: Imports
// ============================================================================

use quilt_mcp_aws::S3Session;
use quilt_mcp_core::hashing::hash_bytes;
use quilt_mcp_core::CopyMode;
use quilt_mcp_core::HashDigest;
use quilt_mcp_core::Manifest;
use quilt_mcp_core::ManifestEntry;
use quilt_mcp_core::OpsError;
use quilt_mcp_core::OpsResult;
use quilt_mcp_core::PackageEntrySource;
use quilt_mcp_core::DEFAULT_HASH_ALGORITHM;
use quilt_mcp_core::package::S3Location;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Request Shapes
// ============================================================================

/// One requested package entry.
#[derive(Debug, Clone)]
pub struct PackageEntryRequest {
    /// Logical path inside the package.
    pub logical_path: String,
    /// Content source.
    pub source: PackageEntrySource,
}

/// An entry resolved to a physical location with size and hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEntry {
    /// Logical path inside the package.
    pub logical_path: String,
    /// Physical location of the content.
    pub location: S3Location,
    /// Content size in bytes.
    pub size: u64,
    /// Entry hash.
    pub hash: HashDigest,
}

/// A single planned server-side copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyAction {
    /// Source location.
    pub from: S3Location,
    /// Destination key inside the registry bucket.
    pub to_key: String,
}

// ============================================================================
// SECTION: Planning
// ============================================================================

/// Returns the content-addressed key for an entry hash.
#[must_use]
pub fn content_key(hash: &HashDigest) -> String {
    format!(".quilt/objects/{}", hash.value)
}

/// Applies a copy mode to resolved entries.
///
/// Returns the copies to perform and the final manifest entries. `None`
/// copies nothing and must not alter source buckets; `New` copies entries
/// whose physical key is outside the registry bucket; `All` copies every
/// entry. Copied entries point at content-addressed registry keys.
#[must_use]
pub fn plan_copies(
    entries: &[ResolvedEntry],
    registry: &str,
    mode: CopyMode,
) -> (Vec<CopyAction>, Vec<ManifestEntry>) {
    let mut copies = Vec::new();
    let mut manifest_entries = Vec::with_capacity(entries.len());
    for entry in entries {
        let copy_into_registry = match mode {
            CopyMode::None => false,
            CopyMode::New => entry.location.bucket != registry,
            CopyMode::All => true,
        };
        let physical_uri = if copy_into_registry {
            let to_key = content_key(&entry.hash);
            // Identical content copies to the same key; one action suffices.
            if !copies.iter().any(|action: &CopyAction| action.to_key == to_key) {
                copies.push(CopyAction {
                    from: entry.location.clone(),
                    to_key: to_key.clone(),
                });
            }
            format!("s3://{registry}/{to_key}")
        } else {
            entry.location.uri()
        };
        manifest_entries.push(ManifestEntry {
            logical_path: entry.logical_path.clone(),
            physical_uri,
            size: entry.size,
            hash: entry.hash.clone(),
        });
    }
    (copies, manifest_entries)
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Hashes an S3-referenced entry over its identity and metadata.
#[must_use]
pub fn reference_hash(uri: &str, etag: Option<&str>, size: u64) -> HashDigest {
    let seed = format!("{uri}|{}|{size}", etag.unwrap_or_default());
    hash_bytes(DEFAULT_HASH_ALGORITHM, seed.as_bytes())
}

/// Resolves requested entries to physical locations.
///
/// S3 sources are headed for size and etag; inline content is staged into
/// the registry's content-addressed area.
///
/// # Errors
///
/// Returns the mapped envelope when a source is missing or staging fails.
pub async fn resolve_entries(
    s3: &S3Session,
    registry: &str,
    requests: Vec<PackageEntryRequest>,
) -> OpsResult<Vec<ResolvedEntry>> {
    let mut resolved = Vec::with_capacity(requests.len());
    for request in requests {
        match request.source {
            PackageEntrySource::S3Uri(uri) => {
                let location = S3Location::parse(&uri)?;
                let info = s3.head(&location.bucket, &location.key, None).await.map_err(
                    |err| {
                        OpsError {
                            message: format!("source object unavailable: {uri}"),
                            ..err
                        }
                    },
                )?;
                let size = info.size.unwrap_or(0);
                let hash = reference_hash(&uri, info.etag.as_deref(), size);
                resolved.push(ResolvedEntry {
                    logical_path: request.logical_path,
                    location,
                    size,
                    hash,
                });
            }
            PackageEntrySource::Inline(bytes) => {
                let hash = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes);
                let key = content_key(&hash);
                let size = bytes.len() as u64;
                s3.put_bytes(registry, &key, bytes).await?;
                resolved.push(ResolvedEntry {
                    logical_path: request.logical_path,
                    location: S3Location {
                        bucket: registry.to_string(),
                        key,
                    },
                    size,
                    hash,
                });
            }
        }
    }
    Ok(resolved)
}

// ============================================================================
// SECTION: Merge
// ============================================================================

/// Merges prior entries with new ones; new entries replace matching paths.
///
/// The replaced physical objects stay reachable through the prior revision's
/// manifest; content addressing preserves history.
#[must_use]
pub fn merge_entries(prior: Vec<ManifestEntry>, new: Vec<ManifestEntry>) -> Vec<ManifestEntry> {
    let mut merged: std::collections::BTreeMap<String, ManifestEntry> =
        prior.into_iter().map(|entry| (entry.logical_path.clone(), entry)).collect();
    for entry in new {
        merged.insert(entry.logical_path.clone(), entry);
    }
    merged.into_values().collect()
}

// ============================================================================
// SECTION: Assembly
// ============================================================================

/// Assembles the canonical manifest and its revision identifier.
///
/// # Errors
///
/// Returns `VALIDATION_FAILED` on duplicate logical paths.
pub fn assemble_manifest(
    entries: Vec<ManifestEntry>,
    metadata: serde_json::Value,
) -> OpsResult<(Manifest, HashDigest)> {
    let manifest = Manifest::new(entries, metadata)?;
    let top_hash = manifest.top_hash()?;
    Ok((manifest, top_hash))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use quilt_mcp_core::hashing::hash_bytes;
    use quilt_mcp_core::CopyMode;
    use quilt_mcp_core::HashAlgorithm;
    use quilt_mcp_core::package::S3Location;
    use serde_json::json;

    use super::assemble_manifest;
    use super::content_key;
    use super::plan_copies;
    use super::reference_hash;
    use super::ResolvedEntry;

    fn entry(logical: &str, bucket: &str, key: &str) -> ResolvedEntry {
        let uri = format!("s3://{bucket}/{key}");
        ResolvedEntry {
            logical_path: logical.to_string(),
            location: S3Location {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            size: 10,
            hash: hash_bytes(HashAlgorithm::Sha256, uri.as_bytes()),
        }
    }

    #[test]
    fn copy_mode_none_references_originals_and_copies_nothing() {
        let entries = vec![entry("a/x.csv", "b", "x.csv"), entry("a/y.csv", "b", "y.csv")];
        let (copies, manifest) = plan_copies(&entries, "registry", CopyMode::None);
        assert!(copies.is_empty());
        assert_eq!(manifest[0].physical_uri, "s3://b/x.csv");
        assert_eq!(manifest[1].physical_uri, "s3://b/y.csv");
    }

    #[test]
    fn copy_mode_new_copies_only_foreign_entries() {
        let entries = vec![
            entry("a/in.csv", "registry", "already/here.csv"),
            entry("a/out.csv", "elsewhere", "key.csv"),
        ];
        let (copies, manifest) = plan_copies(&entries, "registry", CopyMode::New);
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].from.bucket, "elsewhere");
        assert_eq!(manifest[0].physical_uri, "s3://registry/already/here.csv");
        assert!(manifest[1].physical_uri.starts_with("s3://registry/.quilt/objects/"));
    }

    #[test]
    fn copy_mode_all_copies_everything_content_addressed() {
        let entries = vec![
            entry("a/x.csv", "registry", "x.csv"),
            entry("a/y.csv", "elsewhere", "y.csv"),
        ];
        let (copies, manifest) = plan_copies(&entries, "registry", CopyMode::All);
        assert_eq!(copies.len(), 2);
        for record in &manifest {
            assert!(record.physical_uri.contains("/.quilt/objects/"));
        }
        assert_eq!(copies[0].to_key, content_key(&entries[0].hash));
    }

    #[test]
    fn identical_inputs_assemble_identical_top_hashes() {
        let entries = vec![entry("a/x.csv", "b", "x.csv"), entry("a/y.csv", "b", "y.csv")];
        let (_, manifest_entries) = plan_copies(&entries, "registry", CopyMode::None);
        let (_, hash_one) =
            assemble_manifest(manifest_entries.clone(), json!({"k": "v"})).expect("manifest");
        let (_, hash_two) =
            assemble_manifest(manifest_entries, json!({"k": "v"})).expect("manifest");
        assert_eq!(hash_one, hash_two);
    }

    #[test]
    fn manifest_round_trip_recomputes_the_same_hash() {
        let entries = vec![entry("a/x.csv", "b", "x.csv")];
        let (_, manifest_entries) = plan_copies(&entries, "registry", CopyMode::None);
        let (manifest, top_hash) =
            assemble_manifest(manifest_entries, json!({"k": "v"})).expect("manifest");
        let serialized = serde_json::to_string(&manifest).expect("serialize");
        let read_back: quilt_mcp_core::Manifest =
            serde_json::from_str(&serialized).expect("deserialize");
        assert_eq!(read_back.top_hash().expect("hash"), top_hash);
    }

    fn manifest_entry(path: &str, uri: &str) -> quilt_mcp_core::ManifestEntry {
        quilt_mcp_core::ManifestEntry {
            logical_path: path.to_string(),
            physical_uri: uri.to_string(),
            size: 1,
            hash: hash_bytes(HashAlgorithm::Sha256, uri.as_bytes()),
        }
    }

    #[test]
    fn update_replace_keeps_unmatched_paths() {
        let prior = vec![
            manifest_entry("a/x.csv", "s3://b/x-v1.csv"),
            manifest_entry("a/y.csv", "s3://b/y.csv"),
        ];
        let new = vec![manifest_entry("a/x.csv", "s3://b/x-v2.csv")];
        let merged = super::merge_entries(prior, new);
        assert_eq!(merged.len(), 2);
        let x = merged.iter().find(|e| e.logical_path == "a/x.csv").expect("x entry");
        assert_eq!(x.physical_uri, "s3://b/x-v2.csv");
        assert!(merged.iter().any(|e| e.logical_path == "a/y.csv"));
    }

    #[test]
    fn reference_hash_is_stable_and_input_sensitive() {
        let a = reference_hash("s3://b/k", Some("etag1"), 10);
        let b = reference_hash("s3://b/k", Some("etag1"), 10);
        let c = reference_hash("s3://b/k", Some("etag2"), 10);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
