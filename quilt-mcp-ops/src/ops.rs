// quilt-mcp-ops/src/ops.rs
// ============================================================================
// Module: QuiltOps Contract
// Description: The polymorphic backend capability set.
// Purpose: Dispatch every tool operation through one tagged enum.
// Dependencies: quilt-mcp-core, quilt-mcp-catalog, quilt-mcp-search
// ============================================================================

//! ## Overview
//! `QuiltOps` is the single seam between tool modules and the catalog: a
//! tagged enum over the direct S3-native backend and the GraphQL backend.
//! No operation throws past this interface; every failure is already the
//! uniform envelope when it crosses.

// ============================================================================
// SECTION: Imports
// ============================================================================

use quilt_mcp_catalog::AdminClient;
use quilt_mcp_core::CopyMode;
use quilt_mcp_core::ErrorKind;
use quilt_mcp_core::HashDigest;
use quilt_mcp_core::Manifest;
use quilt_mcp_core::OpsError;
use quilt_mcp_core::OpsResult;
use quilt_mcp_core::PackageRef;
use quilt_mcp_core::RequestContext;
use quilt_mcp_core::RevisionInfo;
use quilt_mcp_core::SearchQuery;
use quilt_mcp_core::package::TagMap;
use quilt_mcp_search::SearchResponse;
use serde::Deserialize;
use serde::Serialize;

use crate::direct::DirectBackend;
use crate::graphql::GraphqlBackend;
use crate::write::PackageEntryRequest;

// ============================================================================
// SECTION: Result Shapes
// ============================================================================

/// Authentication summary for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatus {
    /// True when a validated identity is attached to the request.
    pub logged_in: bool,
    /// Caller subject when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Catalog URL in effect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    /// Registry URL in effect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
}

/// One visible bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSummary {
    /// Bucket name.
    pub name: String,
    /// Display title when the catalog provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Description when the catalog provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Permission level reported by the backend edge, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
}

/// One page of a package listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagePage {
    /// Package names in this page.
    pub names: Vec<String>,
    /// Total matches when the backend reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    /// Restart token for the next page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

// ============================================================================
// SECTION: QuiltOps
// ============================================================================

/// Tagged backend union; the factory picks one per request.
pub enum QuiltOps {
    /// Direct S3-native backend.
    Direct(DirectBackend),
    /// Catalog GraphQL backend.
    Graphql(GraphqlBackend),
}

impl QuiltOps {
    /// Reports the caller's authentication status.
    ///
    /// # Errors
    ///
    /// Never fails today; kept fallible for interface stability.
    pub async fn auth_status(&self, ctx: &RequestContext) -> OpsResult<AuthStatus> {
        match self {
            Self::Direct(backend) => backend.auth_status(ctx),
            Self::Graphql(backend) => backend.auth_status(ctx),
        }
    }

    /// Lists buckets the caller may see.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when enumeration fails.
    pub async fn bucket_list(&self, ctx: &RequestContext) -> OpsResult<Vec<BucketSummary>> {
        match self {
            Self::Direct(backend) => backend.bucket_list(ctx).await,
            Self::Graphql(backend) => backend.bucket_list(ctx).await,
        }
    }

    /// Lists packages in a registry; an empty registry yields an empty page.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when listing fails.
    pub async fn package_list(
        &self,
        ctx: &RequestContext,
        registry: &str,
        filter: Option<&str>,
        limit: usize,
        continuation: Option<&str>,
    ) -> OpsResult<PackagePage> {
        match self {
            Self::Direct(backend) => {
                backend.package_list(ctx, registry, filter, limit, continuation).await
            }
            Self::Graphql(backend) => {
                backend.package_list(ctx, registry, filter, limit, continuation).await
            }
        }
    }

    /// Reads the manifest of a revision (tag-resolved when no hash given).
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` for missing packages or revisions.
    pub async fn package_manifest(
        &self,
        ctx: &RequestContext,
        package: &PackageRef,
        top_hash: Option<&HashDigest>,
    ) -> OpsResult<(Manifest, HashDigest)> {
        match self {
            Self::Direct(backend) => backend.package_manifest(ctx, package, top_hash).await,
            Self::Graphql(backend) => backend.package_manifest(ctx, package, top_hash).await,
        }
    }

    /// Lists stored revisions, newest first.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` when the package does not exist.
    pub async fn package_versions_list(
        &self,
        ctx: &RequestContext,
        package: &PackageRef,
        limit: usize,
        with_tags: bool,
    ) -> OpsResult<Vec<RevisionInfo>> {
        match self {
            Self::Direct(backend) => {
                backend.package_versions_list(ctx, package, limit, with_tags).await
            }
            Self::Graphql(backend) => {
                backend.package_versions_list(ctx, package, limit, with_tags).await
            }
        }
    }

    /// Creates a revision; identical inputs produce identical top-hashes.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the write protocol fails.
    pub async fn package_create_revision(
        &self,
        ctx: &RequestContext,
        package: &PackageRef,
        entries: Vec<PackageEntryRequest>,
        metadata: serde_json::Value,
        copy_mode: CopyMode,
        message: Option<String>,
    ) -> OpsResult<HashDigest> {
        match self {
            Self::Direct(backend) => {
                backend
                    .package_create_revision(ctx, package, entries, metadata, copy_mode, message)
                    .await
            }
            Self::Graphql(backend) => {
                backend
                    .package_create_revision(ctx, package, entries, metadata, copy_mode, message)
                    .await
            }
        }
    }

    /// Updates a revision with replace semantics for duplicated paths.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` when the prior revision is absent.
    pub async fn package_update_revision(
        &self,
        ctx: &RequestContext,
        package: &PackageRef,
        prior: Option<&HashDigest>,
        entries: Vec<PackageEntryRequest>,
        metadata: Option<serde_json::Value>,
        copy_mode: CopyMode,
        message: Option<String>,
    ) -> OpsResult<HashDigest> {
        match self {
            Self::Direct(backend) => {
                backend
                    .package_update_revision(
                        ctx, package, prior, entries, metadata, copy_mode, message,
                    )
                    .await
            }
            Self::Graphql(backend) => {
                backend
                    .package_update_revision(
                        ctx, package, prior, entries, metadata, copy_mode, message,
                    )
                    .await
            }
        }
    }

    /// Deletes a revision, or the package's tag map when no hash is given.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` for missing packages or revisions.
    pub async fn package_delete(
        &self,
        ctx: &RequestContext,
        package: &PackageRef,
        top_hash: Option<&HashDigest>,
    ) -> OpsResult<()> {
        match self {
            Self::Direct(backend) => backend.package_delete(ctx, package, top_hash).await,
            Self::Graphql(backend) => backend.package_delete(ctx, package, top_hash).await,
        }
    }

    /// Lists the package's tag map.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` when the package does not exist.
    pub async fn tag_list(&self, ctx: &RequestContext, package: &PackageRef) -> OpsResult<TagMap> {
        match self {
            Self::Direct(backend) => backend.tag_list(ctx, package).await,
            Self::Graphql(backend) => backend.tag_list(ctx, package).await,
        }
    }

    /// Points a tag at a revision.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` when the revision does not exist.
    pub async fn tag_add(
        &self,
        ctx: &RequestContext,
        package: &PackageRef,
        tag: &str,
        top_hash: &HashDigest,
    ) -> OpsResult<()> {
        match self {
            Self::Direct(backend) => backend.tag_add(ctx, package, tag, top_hash).await,
            Self::Graphql(backend) => backend.tag_add(ctx, package, tag, top_hash).await,
        }
    }

    /// Removes a tag.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` when the tag does not exist.
    pub async fn tag_delete(
        &self,
        ctx: &RequestContext,
        package: &PackageRef,
        tag: &str,
    ) -> OpsResult<()> {
        match self {
            Self::Direct(backend) => backend.tag_delete(ctx, package, tag).await,
            Self::Graphql(backend) => backend.tag_delete(ctx, package, tag).await,
        }
    }

    /// Runs a unified search through this backend's available paths.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when every backend path fails.
    pub async fn search(
        &self,
        ctx: &RequestContext,
        query: &SearchQuery,
    ) -> OpsResult<SearchResponse> {
        match self {
            Self::Direct(backend) => backend.search(ctx, query).await,
            Self::Graphql(backend) => backend.search(ctx, query).await,
        }
    }

    /// Returns the admin client; only the GraphQL backend carries one.
    ///
    /// # Errors
    ///
    /// Returns `VALIDATION_FAILED` on the direct backend.
    pub fn admin(&self) -> OpsResult<&AdminClient> {
        match self {
            Self::Direct(_) => Err(OpsError::new(
                ErrorKind::ValidationFailed,
                "admin operations require the graphql backend",
            )
            .with_fix_hint("run with --backend graphql against a catalog")),
            Self::Graphql(backend) => Ok(backend.admin()),
        }
    }
}
