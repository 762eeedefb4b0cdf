// quilt-mcp-catalog/src/lib.rs
// ============================================================================
// Module: Quilt Catalog Client
// Description: HTTP/GraphQL client for the managed Quilt catalog.
// Purpose: Provide search, admin, credential-exchange, and config discovery.
// Dependencies: quilt-mcp-core, reqwest, serde_json
// ============================================================================

//! ## Overview
//! The catalog exposes a GraphQL endpoint for search and administration, a
//! REST credential-exchange endpoint, an Elasticsearch proxy, and a public
//! `config.json`. This crate wraps all four behind one pooled client and maps
//! every transport failure into the uniform error envelope at this edge.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod admin;
pub mod client;
pub mod search;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use admin::AdminClient;
pub use admin::BucketPermission;
pub use admin::ManagedPolicyInput;
pub use admin::PermissionLevel;
pub use admin::PolicyInfo;
pub use admin::RoleInfo;
pub use admin::SsoConfigInfo;
pub use admin::UserInfo;
pub use client::BucketInfo;
pub use client::CatalogClient;
pub use client::CatalogConfig;
pub use client::derive_registry_url;
