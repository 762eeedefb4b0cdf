// quilt-mcp-core/src/lib.rs
// ============================================================================
// Module: Quilt MCP Core
// Description: Shared data model for the Quilt MCP server.
// Purpose: Provide canonical package, search, auth, and error shapes.
// Dependencies: serde, serde_jcs, sha2, chrono, tokio-util
// ============================================================================

//! ## Overview
//! Core types shared by every crate in the workspace: package manifests and
//! their canonical hashing, search queries and hits, JWT claims and AWS
//! credential bundles, the per-request context, and the uniform error
//! envelope returned by every tool operation.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod auth;
pub mod context;
pub mod error;
pub mod hashing;
pub mod package;
pub mod search;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use auth::AwsCredentialBundle;
pub use auth::JwtClaims;
pub use context::BackendKind;
pub use context::DeploymentMode;
pub use context::RequestContext;
pub use context::TransportKind;
pub use error::ErrorKind;
pub use error::OpsError;
pub use error::OpsResult;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use package::CopyMode;
pub use package::Manifest;
pub use package::ManifestEntry;
pub use package::PackageEntrySource;
pub use package::PackageRef;
pub use package::RevisionInfo;
pub use search::ObjectHit;
pub use search::PackageHit;
pub use search::ResultType;
pub use search::SearchBackend;
pub use search::SearchHit;
pub use search::SearchQuery;
pub use search::SearchScope;
