// quilt-mcp-aws/src/lib.rs
// ============================================================================
// Module: Quilt MCP AWS Data Plane
// Description: S3 and Athena helpers for the Quilt MCP server.
// Purpose: Request-scoped clients, bucket operations, query lifecycle.
// Dependencies: aws-config, aws-sdk-s3, aws-sdk-athena, aws-sdk-ssm
// ============================================================================

//! ## Overview
//! S3 clients are built per request following a fixed chain: JWT-exchanged
//! credentials, then ambient credentials (outside strict mode), with an
//! optional proxy endpoint override. Athena queries run a full lifecycle —
//! workgroup discovery, context-routed submission, backoff polling, typed
//! result pagination — honoring the request's cancellation token.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod athena;
pub mod s3;
pub mod secrets;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use athena::AthenaQuerySpec;
pub use athena::AthenaRunner;
pub use athena::ColumnInfo;
pub use athena::QueryResults;
pub use athena::QueryState;
pub use s3::ObjectInfo;
pub use s3::ObjectPage;
pub use s3::PresignMethod;
pub use s3::PutItem;
pub use s3::PutItemOutcome;
pub use s3::shared_config;
pub use s3::PutItemSource;
pub use s3::S3Options;
pub use s3::S3Session;
pub use secrets::fetch_parameter;
