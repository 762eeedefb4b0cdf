// quilt-mcp-ops/src/lib.rs
// ============================================================================
// Module: Quilt MCP Backend Contract
// Description: The QuiltOps capability set and its two implementations.
// Purpose: Flat, tagged-variant backends selected per request.
// Dependencies: quilt-mcp-catalog, quilt-mcp-aws, quilt-mcp-search
// ============================================================================

//! ## Overview
//! `QuiltOps` is a capability set, not an inheritance tree: the two backends
//! are tagged variants of one enum and every tool routes through it. The
//! factory picks a variant at request time from the resolved deployment mode.
//! The package write protocol (entry resolution, copy-mode application,
//! canonical manifests) is shared by both variants.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod direct;
pub mod factory;
pub mod graphql;
pub mod ops;
pub mod write;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use direct::DirectBackend;
pub use factory::BackendFactory;
pub use graphql::GraphqlBackend;
pub use ops::AuthStatus;
pub use ops::BucketSummary;
pub use ops::PackagePage;
pub use ops::QuiltOps;
pub use write::content_key;
pub use write::plan_copies;
pub use write::CopyAction;
pub use write::PackageEntryRequest;
pub use write::ResolvedEntry;
