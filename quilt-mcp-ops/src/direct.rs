// quilt-mcp-ops/src/direct.rs
// ============================================================================
// Module: Direct Backend
// Description: S3-native QuiltOps implementation over the registry layout.
// Purpose: Serve packages without a catalog using content-addressed storage.
// Dependencies: quilt-mcp-aws, quilt-mcp-core, quilt-mcp-search
// ============================================================================

//! ## Overview
//! The registry bucket carries the quilt layout: revision records under
//! `.quilt/packages/<top_hash>` and tag pointers under
//! `.quilt/named_packages/<name>/<tag>`, with `latest` updated on every push.
//! Commits are idempotent: a revision record that already exists is left
//! untouched, so repeated pushes of the same manifest are no-ops.
//!
//! `package_delete` without a top-hash removes the package's tag map and
//! keeps content-addressed revisions reachable by hash; this matches the
//! tool-help text and the GraphQL backend.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use quilt_mcp_aws::S3Session;
use quilt_mcp_core::CopyMode;
use quilt_mcp_core::ErrorKind;
use quilt_mcp_core::HashAlgorithm;
use quilt_mcp_core::HashDigest;
use quilt_mcp_core::Manifest;
use quilt_mcp_core::OpsError;
use quilt_mcp_core::OpsResult;
use quilt_mcp_core::PackageRef;
use quilt_mcp_core::RequestContext;
use quilt_mcp_core::RevisionInfo;
use quilt_mcp_core::SearchQuery;
use quilt_mcp_core::package::TagMap;
use quilt_mcp_search::SearchEngine;
use quilt_mcp_search::SearchResponse;
use serde::Deserialize;
use serde::Serialize;

use crate::ops::AuthStatus;
use crate::ops::BucketSummary;
use crate::ops::PackagePage;
use crate::write::assemble_manifest;
use crate::write::merge_entries;
use crate::write::plan_copies;
use crate::write::resolve_entries;
use crate::write::PackageEntryRequest;

// ============================================================================
// SECTION: Registry Layout
// ============================================================================

/// Prefix holding revision records keyed by top-hash.
const PACKAGES_PREFIX: &str = ".quilt/packages/";
/// Prefix holding tag pointers keyed by package name and tag.
const POINTERS_PREFIX: &str = ".quilt/named_packages/";
/// Tag updated on every push.
const LATEST_TAG: &str = "latest";

/// Stored revision record: the hashed manifest plus unhashed commit info.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RevisionRecord {
    /// Canonical manifest; the top-hash covers exactly these bytes.
    manifest: Manifest,
    /// Commit message, not part of the hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    /// Commit timestamp, not part of the hash.
    timestamp: DateTime<Utc>,
}

fn revision_key(top_hash: &HashDigest) -> String {
    format!("{PACKAGES_PREFIX}{}", top_hash.value)
}

fn pointer_key(package: &PackageRef, tag: &str) -> String {
    format!("{POINTERS_PREFIX}{}/{tag}", package.name)
}

fn pointer_prefix(package: &PackageRef) -> String {
    format!("{POINTERS_PREFIX}{}/", package.name)
}

// ============================================================================
// SECTION: Backend
// ============================================================================

/// Direct S3-native backend bound to one registry bucket.
pub struct DirectBackend {
    /// Request-scoped S3 session.
    s3: S3Session,
    /// Registry bucket name.
    registry: String,
    /// Per-backend search timeout.
    search_timeout: Duration,
}

impl DirectBackend {
    /// Builds a direct backend.
    #[must_use]
    pub fn new(s3: S3Session, registry: String, search_timeout: Duration) -> Self {
        Self {
            s3,
            registry,
            search_timeout,
        }
    }

    /// Returns the session for data-plane tools sharing this backend.
    #[must_use]
    pub fn session(&self) -> &S3Session {
        &self.s3
    }

    pub(crate) fn auth_status(&self, ctx: &RequestContext) -> OpsResult<AuthStatus> {
        Ok(AuthStatus {
            logged_in: ctx.claims.is_some() || ctx.credentials.is_some(),
            subject: ctx.subject().map(str::to_string),
            catalog: ctx.catalog_url.clone(),
            registry: Some(self.registry.clone()),
        })
    }

    pub(crate) async fn bucket_list(&self, _ctx: &RequestContext) -> OpsResult<Vec<BucketSummary>> {
        let names = self.s3.list_buckets().await?;
        Ok(names
            .into_iter()
            .map(|name| BucketSummary {
                name,
                title: None,
                description: None,
                permission: None,
            })
            .collect())
    }

    pub(crate) async fn package_list(
        &self,
        _ctx: &RequestContext,
        registry: &str,
        filter: Option<&str>,
        limit: usize,
        continuation: Option<&str>,
    ) -> OpsResult<PackagePage> {
        let bucket = if registry.is_empty() { self.registry.as_str() } else { registry };
        let mut names: Vec<String> = Vec::new();
        let mut token = continuation.map(str::to_string);
        loop {
            let page = self
                .s3
                .list(bucket, Some(POINTERS_PREFIX), token.as_deref(), None)
                .await?;
            for object in &page.items {
                let Some(rest) = object.key.strip_prefix(POINTERS_PREFIX) else {
                    continue;
                };
                let segments: Vec<&str> = rest.split('/').collect();
                if segments.len() < 3 {
                    continue;
                }
                let name = format!("{}/{}", segments[0], segments[1]);
                if let Some(filter) = filter {
                    if !name.contains(filter) {
                        continue;
                    }
                }
                if !names.contains(&name) {
                    names.push(name);
                }
            }
            token = page.next_continuation;
            if names.len() >= limit || token.is_none() {
                break;
            }
        }
        names.truncate(limit);
        Ok(PackagePage {
            names,
            total: None,
            next: token,
        })
    }

    /// Resolves a revision hash from an explicit hash or the `latest` tag.
    async fn resolve_hash(
        &self,
        package: &PackageRef,
        top_hash: Option<&HashDigest>,
    ) -> OpsResult<HashDigest> {
        if let Some(hash) = top_hash {
            return Ok(hash.clone());
        }
        let pointer = pointer_key(package, LATEST_TAG);
        let value = self.s3.get_text(&self.registry, &pointer, None, None).await.map_err(
            |err| match err.kind {
                ErrorKind::NotFound => OpsError::not_found(format!("package {package} not found")),
                _ => err,
            },
        )?;
        Ok(HashDigest {
            algorithm: HashAlgorithm::Sha256,
            value: value.trim().to_string(),
        })
    }

    async fn read_record(&self, top_hash: &HashDigest) -> OpsResult<RevisionRecord> {
        let text = self
            .s3
            .get_text(&self.registry, &revision_key(top_hash), None, None)
            .await
            .map_err(|err| match err.kind {
                ErrorKind::NotFound => {
                    OpsError::not_found(format!("revision {top_hash} not found"))
                }
                _ => err,
            })?;
        serde_json::from_str(&text).map_err(|err| {
            OpsError::internal("stored revision record is malformed").with_cause(err.to_string())
        })
    }

    pub(crate) async fn package_manifest(
        &self,
        _ctx: &RequestContext,
        package: &PackageRef,
        top_hash: Option<&HashDigest>,
    ) -> OpsResult<(Manifest, HashDigest)> {
        let hash = self.resolve_hash(package, top_hash).await?;
        let record = self.read_record(&hash).await?;
        Ok((record.manifest, hash))
    }

    pub(crate) async fn package_versions_list(
        &self,
        ctx: &RequestContext,
        package: &PackageRef,
        limit: usize,
        with_tags: bool,
    ) -> OpsResult<Vec<RevisionInfo>> {
        let tags = self.tag_list(ctx, package).await?;
        let mut by_hash: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (tag, hash) in &tags {
            by_hash.entry(hash.value.clone()).or_default().push(tag.clone());
        }
        let mut revisions = Vec::new();
        for (value, tags) in by_hash {
            if revisions.len() >= limit {
                break;
            }
            let hash = HashDigest {
                algorithm: HashAlgorithm::Sha256,
                value,
            };
            let record = self.read_record(&hash).await?;
            revisions.push(RevisionInfo {
                top_hash: hash,
                timestamp: record.timestamp,
                message: record.message,
                tags: if with_tags { tags } else { Vec::new() },
            });
        }
        revisions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(revisions)
    }

    /// Commits a manifest: write-once record plus a `latest` pointer update.
    async fn commit(
        &self,
        package: &PackageRef,
        manifest: Manifest,
        top_hash: &HashDigest,
        message: Option<String>,
    ) -> OpsResult<()> {
        let key = revision_key(top_hash);
        // Repeated commits of the same top-hash are a no-op.
        let exists = self.s3.head(&self.registry, &key, None).await.is_ok();
        if !exists {
            let record = RevisionRecord {
                manifest,
                message,
                timestamp: Utc::now(),
            };
            let bytes = serde_json::to_vec(&record).map_err(|err| {
                OpsError::internal("revision record serialization failed")
                    .with_cause(err.to_string())
            })?;
            self.s3.put_bytes(&self.registry, &key, bytes).await?;
        }
        self.s3
            .put_bytes(
                &self.registry,
                &pointer_key(package, LATEST_TAG),
                top_hash.value.clone().into_bytes(),
            )
            .await?;
        Ok(())
    }

    pub(crate) async fn package_create_revision(
        &self,
        _ctx: &RequestContext,
        package: &PackageRef,
        entries: Vec<PackageEntryRequest>,
        metadata: serde_json::Value,
        copy_mode: CopyMode,
        message: Option<String>,
    ) -> OpsResult<HashDigest> {
        let resolved = resolve_entries(&self.s3, &self.registry, entries).await?;
        let (copies, manifest_entries) = plan_copies(&resolved, &self.registry, copy_mode);
        for copy in &copies {
            self.s3.copy(&copy.from.bucket, &copy.from.key, &self.registry, &copy.to_key).await?;
        }
        let (manifest, top_hash) = assemble_manifest(manifest_entries, metadata)?;
        self.commit(package, manifest, &top_hash, message).await?;
        Ok(top_hash)
    }

    pub(crate) async fn package_update_revision(
        &self,
        ctx: &RequestContext,
        package: &PackageRef,
        prior: Option<&HashDigest>,
        entries: Vec<PackageEntryRequest>,
        metadata: Option<serde_json::Value>,
        copy_mode: CopyMode,
        message: Option<String>,
    ) -> OpsResult<HashDigest> {
        let (prior_manifest, _) = self.package_manifest(ctx, package, prior).await?;
        let resolved = resolve_entries(&self.s3, &self.registry, entries).await?;
        let (copies, new_entries) = plan_copies(&resolved, &self.registry, copy_mode);
        for copy in &copies {
            self.s3.copy(&copy.from.bucket, &copy.from.key, &self.registry, &copy.to_key).await?;
        }
        let merged = merge_entries(prior_manifest.entries, new_entries);
        let metadata = metadata.unwrap_or(prior_manifest.metadata);
        let (manifest, top_hash) = assemble_manifest(merged, metadata)?;
        self.commit(package, manifest, &top_hash, message).await?;
        Ok(top_hash)
    }

    pub(crate) async fn package_delete(
        &self,
        ctx: &RequestContext,
        package: &PackageRef,
        top_hash: Option<&HashDigest>,
    ) -> OpsResult<()> {
        match top_hash {
            Some(hash) => {
                // Verify existence so a missing revision reports NOT_FOUND.
                let _ = self.read_record(hash).await?;
                self.s3.delete(&self.registry, &revision_key(hash)).await?;
                let tags = self.tag_list(ctx, package).await.unwrap_or_default();
                for (tag, pointed) in tags {
                    if pointed == *hash {
                        self.s3.delete(&self.registry, &pointer_key(package, &tag)).await?;
                    }
                }
                Ok(())
            }
            None => {
                let tags = self.tag_list(ctx, package).await?;
                if tags.is_empty() {
                    return Err(OpsError::not_found(format!("package {package} not found")));
                }
                for tag in tags.keys() {
                    self.s3.delete(&self.registry, &pointer_key(package, tag)).await?;
                }
                Ok(())
            }
        }
    }

    pub(crate) async fn tag_list(
        &self,
        _ctx: &RequestContext,
        package: &PackageRef,
    ) -> OpsResult<TagMap> {
        let prefix = pointer_prefix(package);
        let mut tags = TagMap::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .s3
                .list(&self.registry, Some(&prefix), token.as_deref(), None)
                .await?;
            for object in &page.items {
                let Some(tag) = object.key.strip_prefix(&prefix) else {
                    continue;
                };
                if tag.is_empty() || tag.contains('/') {
                    continue;
                }
                let value =
                    self.s3.get_text(&self.registry, &object.key, None, None).await?;
                tags.insert(
                    tag.to_string(),
                    HashDigest {
                        algorithm: HashAlgorithm::Sha256,
                        value: value.trim().to_string(),
                    },
                );
            }
            token = page.next_continuation;
            if token.is_none() {
                break;
            }
        }
        Ok(tags)
    }

    pub(crate) async fn tag_add(
        &self,
        _ctx: &RequestContext,
        package: &PackageRef,
        tag: &str,
        top_hash: &HashDigest,
    ) -> OpsResult<()> {
        // A tag may only point at a stored revision.
        let _ = self.read_record(top_hash).await?;
        self.s3
            .put_bytes(
                &self.registry,
                &pointer_key(package, tag),
                top_hash.value.clone().into_bytes(),
            )
            .await?;
        Ok(())
    }

    pub(crate) async fn tag_delete(
        &self,
        _ctx: &RequestContext,
        package: &PackageRef,
        tag: &str,
    ) -> OpsResult<()> {
        let key = pointer_key(package, tag);
        self.s3.head(&self.registry, &key, None).await.map_err(|err| match err.kind {
            ErrorKind::NotFound => quilt_mcp_core::package::tag_not_found(package, tag),
            _ => err,
        })?;
        self.s3.delete(&self.registry, &key).await
    }

    pub(crate) async fn search(
        &self,
        ctx: &RequestContext,
        query: &SearchQuery,
    ) -> OpsResult<SearchResponse> {
        let engine = SearchEngine::new(None, self.search_timeout);
        engine.search(ctx, Some(&self.s3), query).await
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use quilt_mcp_core::hashing::hash_bytes;
    use quilt_mcp_core::HashAlgorithm;
    use quilt_mcp_core::PackageRef;

    use super::pointer_key;
    use super::revision_key;

    #[test]
    fn layout_keys_follow_the_registry_convention() {
        let package = PackageRef::new("bucket", "team/data").expect("package");
        let hash = hash_bytes(HashAlgorithm::Sha256, b"manifest");
        assert_eq!(revision_key(&hash), format!(".quilt/packages/{}", hash.value));
        assert_eq!(pointer_key(&package, "latest"), ".quilt/named_packages/team/data/latest");
    }
}
