// quilt-mcp-ops/src/graphql.rs
// ============================================================================
// Module: GraphQL Backend
// Description: Catalog-backed QuiltOps implementation.
// Purpose: Serve packages, tags, and admin through the catalog API.
// Dependencies: quilt-mcp-catalog, quilt-mcp-aws, quilt-mcp-search
// ============================================================================

//! ## Overview
//! Reads go through the catalog's package queries; writes go through
//! `packageConstruct` with a locally assembled canonical manifest, so the
//! returned top-hash is identical to what the direct backend would produce
//! for the same inputs. Copy modes still stage objects through S3 before the
//! mutation references them. Admin operations live here exclusively.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use quilt_mcp_aws::S3Session;
use quilt_mcp_catalog::AdminClient;
use quilt_mcp_catalog::CatalogClient;
use quilt_mcp_core::CopyMode;
use quilt_mcp_core::ErrorKind;
use quilt_mcp_core::HashAlgorithm;
use quilt_mcp_core::HashDigest;
use quilt_mcp_core::Manifest;
use quilt_mcp_core::ManifestEntry;
use quilt_mcp_core::OpsError;
use quilt_mcp_core::OpsResult;
use quilt_mcp_core::PackageRef;
use quilt_mcp_core::RequestContext;
use quilt_mcp_core::RevisionInfo;
use quilt_mcp_core::SearchQuery;
use quilt_mcp_core::package::TagMap;
use quilt_mcp_search::SearchEngine;
use quilt_mcp_search::SearchResponse;
use serde_json::json;
use serde_json::Value;

use crate::ops::AuthStatus;
use crate::ops::BucketSummary;
use crate::ops::PackagePage;
use crate::write::assemble_manifest;
use crate::write::merge_entries;
use crate::write::plan_copies;
use crate::write::resolve_entries;
use crate::write::PackageEntryRequest;

// ============================================================================
// SECTION: GraphQL Documents
// ============================================================================

const PACKAGES_LIST_QUERY: &str = r"query PackagesList($bucket: String!, $filter: String, $page: Int!, $perPage: Int!) {
  packages(bucket: $bucket, filter: $filter) {
    total
    page(number: $page, perPage: $perPage) { name }
  }
}";

const PACKAGE_REVISION_QUERY: &str = r"query PackageRevisionContents($bucket: String!, $name: String!, $hashOrTag: String!) {
  package(bucket: $bucket, name: $name) {
    revision(hashOrTag: $hashOrTag) {
      hash
      userMeta
      contentsFlatMap { logicalKey physicalKey size hash }
    }
  }
}";

const PACKAGE_REVISIONS_QUERY: &str = r"query PackageRevisions($bucket: String!, $name: String!, $perPage: Int!) {
  package(bucket: $bucket, name: $name) {
    revisions { page(number: 1, perPage: $perPage) { hash modified message } }
  }
}";

const PACKAGE_POINTERS_QUERY: &str = r"query PackagePointers($bucket: String!, $name: String!) {
  package(bucket: $bucket, name: $name) { pointers { name hash } }
}";

const PACKAGE_CONSTRUCT_MUTATION: &str = r"mutation PackageConstruct($params: PackagePushParams!, $src: PackageConstructSource!) {
  packageConstruct(params: $params, src: $src) {
    __typename
    ... on PackagePushSuccess { revision { hash } }
    ... on InvalidInput { errors { path message } }
    ... on OperationError { message name }
  }
}";

const POINTER_SET_MUTATION: &str = r"mutation PackagePointerSet($bucket: String!, $name: String!, $pointer: String!, $hash: String!) {
  packagePointerSet(bucket: $bucket, name: $name, pointer: $pointer, hash: $hash) {
    __typename
    ... on Ok { _ }
    ... on InvalidInput { errors { path message } }
    ... on OperationError { message name }
  }
}";

const POINTER_DELETE_MUTATION: &str = r"mutation PackagePointerDelete($bucket: String!, $name: String!, $pointer: String!) {
  packagePointerDelete(bucket: $bucket, name: $name, pointer: $pointer) {
    __typename
    ... on Ok { _ }
    ... on InvalidInput { errors { path message } }
    ... on OperationError { message name }
  }
}";

const REVISION_DELETE_MUTATION: &str = r"mutation PackageRevisionDelete($bucket: String!, $name: String!, $hash: String!) {
  packageRevisionDelete(bucket: $bucket, name: $name, hash: $hash) {
    __typename
    ... on Ok { _ }
    ... on InvalidInput { errors { path message } }
    ... on OperationError { message name }
  }
}";

const PACKAGE_DELETE_MUTATION: &str = r"mutation PackageDelete($bucket: String!, $name: String!) {
  packageDelete(bucket: $bucket, name: $name) {
    __typename
    ... on Ok { _ }
    ... on InvalidInput { errors { path message } }
    ... on OperationError { message name }
  }
}";

// ============================================================================
// SECTION: Backend
// ============================================================================

/// Catalog GraphQL backend.
pub struct GraphqlBackend {
    /// Catalog client.
    catalog: CatalogClient,
    /// Admin wrapper over the same client.
    admin: AdminClient,
    /// S3 session for staging and copy modes, when credentials resolved.
    s3: Option<S3Session>,
    /// Per-backend search timeout.
    search_timeout: Duration,
}

impl GraphqlBackend {
    /// Builds a GraphQL backend.
    #[must_use]
    pub fn new(catalog: CatalogClient, s3: Option<S3Session>, search_timeout: Duration) -> Self {
        let admin = AdminClient::new(catalog.clone());
        Self {
            catalog,
            admin,
            s3,
            search_timeout,
        }
    }

    /// Returns the admin client.
    #[must_use]
    pub fn admin(&self) -> &AdminClient {
        &self.admin
    }

    /// Returns the staging session when one was resolved.
    #[must_use]
    pub fn session(&self) -> Option<&S3Session> {
        self.s3.as_ref()
    }

    fn staging(&self) -> OpsResult<&S3Session> {
        self.s3.as_ref().ok_or_else(|| {
            OpsError::new(
                ErrorKind::AuthNoCredentials,
                "package writes need AWS credentials for staging",
            )
            .with_fix_hint("present a bearer token so credentials can be exchanged")
        })
    }

    pub(crate) fn auth_status(&self, ctx: &RequestContext) -> OpsResult<AuthStatus> {
        Ok(AuthStatus {
            logged_in: ctx.claims.is_some(),
            subject: ctx.subject().map(str::to_string),
            catalog: Some(self.catalog.catalog_url().to_string()),
            registry: Some(self.catalog.registry_url().to_string()),
        })
    }

    pub(crate) async fn bucket_list(&self, ctx: &RequestContext) -> OpsResult<Vec<BucketSummary>> {
        let configs = self.catalog.bucket_configs(ctx.bearer.as_deref()).await?;
        // The catalog only returns buckets the caller can at least read; that
        // listing is the single source of truth for the permission flag.
        Ok(configs
            .into_iter()
            .map(|config| BucketSummary {
                name: config.name,
                title: config.title,
                description: config.description,
                permission: Some("read".to_string()),
            })
            .collect())
    }

    pub(crate) async fn package_list(
        &self,
        ctx: &RequestContext,
        registry: &str,
        filter: Option<&str>,
        limit: usize,
        continuation: Option<&str>,
    ) -> OpsResult<PackagePage> {
        let page_number: i64 =
            continuation.map_or(Ok(1), str::parse).map_err(|_| {
                OpsError::validation("continuation token must be a page number")
            })?;
        let variables = json!({
            "bucket": registry.trim_start_matches("s3://"),
            "filter": filter,
            "page": page_number,
            "perPage": i64::try_from(limit).unwrap_or(i64::MAX),
        });
        let data = self
            .catalog
            .graphql(ctx.bearer.as_deref(), PACKAGES_LIST_QUERY, variables)
            .await?;
        let names: Vec<String> = data
            .pointer("/packages/page")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| entry.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let total = data
            .pointer("/packages/total")
            .and_then(Value::as_u64)
            .and_then(|total| usize::try_from(total).ok());
        let next = match total {
            Some(total) if (page_number as usize) * limit < total => {
                Some((page_number + 1).to_string())
            }
            _ => None,
        };
        Ok(PackagePage {
            names,
            total,
            next,
        })
    }

    pub(crate) async fn package_manifest(
        &self,
        ctx: &RequestContext,
        package: &PackageRef,
        top_hash: Option<&HashDigest>,
    ) -> OpsResult<(Manifest, HashDigest)> {
        let hash_or_tag = top_hash.map_or_else(|| "latest".to_string(), |hash| hash.value.clone());
        let variables = json!({
            "bucket": package.registry,
            "name": package.name,
            "hashOrTag": hash_or_tag,
        });
        let data = self
            .catalog
            .graphql(ctx.bearer.as_deref(), PACKAGE_REVISION_QUERY, variables)
            .await?;
        let revision = data.pointer("/package/revision").cloned().unwrap_or(Value::Null);
        if revision.is_null() {
            return Err(OpsError::not_found(format!("package {package} revision not found")));
        }
        let hash = revision
            .get("hash")
            .and_then(Value::as_str)
            .map(|value| HashDigest {
                algorithm: HashAlgorithm::Sha256,
                value: value.to_string(),
            })
            .ok_or_else(|| OpsError::internal("catalog revision carries no hash"))?;
        let entries = revision
            .pointer("/contentsFlatMap")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        Some(ManifestEntry {
                            logical_path: entry.get("logicalKey")?.as_str()?.to_string(),
                            physical_uri: entry.get("physicalKey")?.as_str()?.to_string(),
                            size: entry.get("size").and_then(Value::as_u64).unwrap_or(0),
                            hash: HashDigest {
                                algorithm: HashAlgorithm::Sha256,
                                value: entry
                                    .get("hash")
                                    .and_then(Value::as_str)
                                    .unwrap_or_default()
                                    .to_string(),
                            },
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let metadata = revision.get("userMeta").cloned().unwrap_or(Value::Null);
        let manifest = Manifest::new(entries, metadata)?;
        Ok((manifest, hash))
    }

    pub(crate) async fn package_versions_list(
        &self,
        ctx: &RequestContext,
        package: &PackageRef,
        limit: usize,
        with_tags: bool,
    ) -> OpsResult<Vec<RevisionInfo>> {
        let variables = json!({
            "bucket": package.registry,
            "name": package.name,
            "perPage": i64::try_from(limit).unwrap_or(i64::MAX),
        });
        let data = self
            .catalog
            .graphql(ctx.bearer.as_deref(), PACKAGE_REVISIONS_QUERY, variables)
            .await?;
        let page = data.pointer("/package/revisions/page").cloned().unwrap_or(Value::Null);
        if page.is_null() {
            return Err(OpsError::not_found(format!("package {package} not found")));
        }
        let tags = if with_tags { self.tag_list(ctx, package).await? } else { TagMap::new() };
        let revisions = page
            .as_array()
            .map(|revisions| {
                revisions
                    .iter()
                    .filter_map(|revision| {
                        let hash = HashDigest {
                            algorithm: HashAlgorithm::Sha256,
                            value: revision.get("hash")?.as_str()?.to_string(),
                        };
                        let timestamp = revision
                            .get("modified")
                            .and_then(Value::as_str)
                            .and_then(|raw| raw.parse().ok())
                            .unwrap_or_else(chrono::Utc::now);
                        let revision_tags: Vec<String> = tags
                            .iter()
                            .filter(|(_, pointed)| **pointed == hash)
                            .map(|(tag, _)| tag.clone())
                            .collect();
                        Some(RevisionInfo {
                            top_hash: hash,
                            timestamp,
                            message: revision
                                .get("message")
                                .and_then(Value::as_str)
                                .map(str::to_string),
                            tags: revision_tags,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(revisions)
    }

    /// Issues `packageConstruct` with a locally assembled manifest.
    async fn construct(
        &self,
        ctx: &RequestContext,
        package: &PackageRef,
        manifest: &Manifest,
        top_hash: &HashDigest,
        message: Option<&str>,
    ) -> OpsResult<HashDigest> {
        let entries: Vec<Value> = manifest
            .entries
            .iter()
            .map(|entry| {
                json!({
                    "logicalKey": entry.logical_path,
                    "physicalKey": entry.physical_uri,
                    "size": entry.size,
                    "hash": entry.hash.value,
                })
            })
            .collect();
        let variables = json!({
            "params": {
                "bucket": package.registry,
                "name": package.name,
                "message": message,
                "userMeta": manifest.metadata,
            },
            "src": {"entries": entries},
        });
        let data = self
            .catalog
            .graphql(ctx.bearer.as_deref(), PACKAGE_CONSTRUCT_MUTATION, variables)
            .await?;
        let node = resolve_union(&data, "/packageConstruct")?;
        let committed = node
            .pointer("/revision/hash")
            .and_then(Value::as_str)
            .map(|value| HashDigest {
                algorithm: HashAlgorithm::Sha256,
                value: value.to_string(),
            });
        Ok(committed.unwrap_or_else(|| top_hash.clone()))
    }

    pub(crate) async fn package_create_revision(
        &self,
        ctx: &RequestContext,
        package: &PackageRef,
        entries: Vec<PackageEntryRequest>,
        metadata: serde_json::Value,
        copy_mode: CopyMode,
        message: Option<String>,
    ) -> OpsResult<HashDigest> {
        let s3 = self.staging()?;
        let resolved = resolve_entries(s3, &package.registry, entries).await?;
        let (copies, manifest_entries) = plan_copies(&resolved, &package.registry, copy_mode);
        for copy in &copies {
            s3.copy(&copy.from.bucket, &copy.from.key, &package.registry, &copy.to_key).await?;
        }
        let (manifest, top_hash) = assemble_manifest(manifest_entries, metadata)?;
        self.construct(ctx, package, &manifest, &top_hash, message.as_deref()).await
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
        let s3 = self.staging()?;
        let resolved = resolve_entries(s3, &package.registry, entries).await?;
        let (copies, new_entries) = plan_copies(&resolved, &package.registry, copy_mode);
        for copy in &copies {
            s3.copy(&copy.from.bucket, &copy.from.key, &package.registry, &copy.to_key).await?;
        }
        let merged = merge_entries(prior_manifest.entries, new_entries);
        let metadata = metadata.unwrap_or(prior_manifest.metadata);
        let (manifest, top_hash) = assemble_manifest(merged, metadata)?;
        self.construct(ctx, package, &manifest, &top_hash, message.as_deref()).await
    }

    pub(crate) async fn package_delete(
        &self,
        ctx: &RequestContext,
        package: &PackageRef,
        top_hash: Option<&HashDigest>,
    ) -> OpsResult<()> {
        let data = match top_hash {
            Some(hash) => {
                let variables = json!({
                    "bucket": package.registry,
                    "name": package.name,
                    "hash": hash.value,
                });
                self.catalog
                    .graphql(ctx.bearer.as_deref(), REVISION_DELETE_MUTATION, variables)
                    .await?
            }
            None => {
                let variables = json!({"bucket": package.registry, "name": package.name});
                self.catalog
                    .graphql(ctx.bearer.as_deref(), PACKAGE_DELETE_MUTATION, variables)
                    .await?
            }
        };
        let pointer =
            if top_hash.is_some() { "/packageRevisionDelete" } else { "/packageDelete" };
        resolve_union(&data, pointer).map(|_| ())
    }

    pub(crate) async fn tag_list(
        &self,
        ctx: &RequestContext,
        package: &PackageRef,
    ) -> OpsResult<TagMap> {
        let variables = json!({"bucket": package.registry, "name": package.name});
        let data = self
            .catalog
            .graphql(ctx.bearer.as_deref(), PACKAGE_POINTERS_QUERY, variables)
            .await?;
        let pointers = data.pointer("/package/pointers").cloned().unwrap_or(Value::Null);
        if pointers.is_null() {
            return Err(OpsError::not_found(format!("package {package} not found")));
        }
        let mut tags = TagMap::new();
        if let Some(pointers) = pointers.as_array() {
            for pointer in pointers {
                let (Some(name), Some(hash)) = (
                    pointer.get("name").and_then(Value::as_str),
                    pointer.get("hash").and_then(Value::as_str),
                ) else {
                    continue;
                };
                tags.insert(
                    name.to_string(),
                    HashDigest {
                        algorithm: HashAlgorithm::Sha256,
                        value: hash.to_string(),
                    },
                );
            }
        }
        Ok(tags)
    }

    pub(crate) async fn tag_add(
        &self,
        ctx: &RequestContext,
        package: &PackageRef,
        tag: &str,
        top_hash: &HashDigest,
    ) -> OpsResult<()> {
        let variables = json!({
            "bucket": package.registry,
            "name": package.name,
            "pointer": tag,
            "hash": top_hash.value,
        });
        let data = self
            .catalog
            .graphql(ctx.bearer.as_deref(), POINTER_SET_MUTATION, variables)
            .await?;
        resolve_union(&data, "/packagePointerSet").map(|_| ())
    }

    pub(crate) async fn tag_delete(
        &self,
        ctx: &RequestContext,
        package: &PackageRef,
        tag: &str,
    ) -> OpsResult<()> {
        let variables = json!({
            "bucket": package.registry,
            "name": package.name,
            "pointer": tag,
        });
        let data = self
            .catalog
            .graphql(ctx.bearer.as_deref(), POINTER_DELETE_MUTATION, variables)
            .await?;
        resolve_union(&data, "/packagePointerDelete").map(|_| ())
    }

    pub(crate) async fn search(
        &self,
        ctx: &RequestContext,
        query: &SearchQuery,
    ) -> OpsResult<SearchResponse> {
        let engine = SearchEngine::new(Some(self.catalog.clone()), self.search_timeout);
        engine.search(ctx, self.s3.as_ref(), query).await
    }
}

// ============================================================================
// SECTION: Union Handling
// ============================================================================

/// Resolves a package-mutation union, mapping failure variants.
fn resolve_union(data: &Value, pointer: &str) -> OpsResult<Value> {
    let node = data
        .pointer(pointer)
        .ok_or_else(|| {
            OpsError::new(ErrorKind::UpstreamUnavailable, "catalog returned no mutation result")
        })?
        .clone();
    match node.get("__typename").and_then(Value::as_str) {
        Some("InvalidInput") => {
            let detail = node
                .pointer("/errors")
                .and_then(Value::as_array)
                .map(|errors| {
                    errors
                        .iter()
                        .filter_map(|error| error.get("message").and_then(Value::as_str))
                        .collect::<Vec<_>>()
                        .join("; ")
                })
                .unwrap_or_default();
            Err(OpsError::validation(format!("catalog rejected the input: {detail}")))
        }
        Some("OperationError") => {
            let name = node.get("name").and_then(Value::as_str).unwrap_or_default();
            let message =
                node.get("message").and_then(Value::as_str).unwrap_or("operation failed");
            let kind = match name {
                "NotFound" => ErrorKind::NotFound,
                "Conflict" | "HashMismatch" => ErrorKind::Conflict,
                "Forbidden" => ErrorKind::PermissionDenied,
                _ => ErrorKind::UpstreamUnavailable,
            };
            Err(OpsError::new(kind, message.to_string()))
        }
        _ => Ok(node),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use quilt_mcp_core::ErrorKind;
    use serde_json::json;

    use super::resolve_union;

    #[test]
    fn construct_success_exposes_the_committed_hash() {
        let data = json!({"packageConstruct": {
            "__typename": "PackagePushSuccess",
            "revision": {"hash": "abc123"},
        }});
        let node = resolve_union(&data, "/packageConstruct").expect("success");
        assert_eq!(node.pointer("/revision/hash").and_then(|v| v.as_str()), Some("abc123"));
    }

    #[test]
    fn tag_race_maps_to_conflict() {
        let data = json!({"packagePointerSet": {
            "__typename": "OperationError",
            "name": "Conflict",
            "message": "pointer moved concurrently",
        }});
        let err = resolve_union(&data, "/packagePointerSet").expect_err("must fail");
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert!(err.retriable);
    }

    #[test]
    fn missing_result_is_upstream_unavailable() {
        let err = resolve_union(&json!({}), "/packageConstruct").expect_err("must fail");
        assert_eq!(err.kind, ErrorKind::UpstreamUnavailable);
    }
}
