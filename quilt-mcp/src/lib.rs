// quilt-mcp/src/lib.rs
// ============================================================================
// Module: Quilt MCP Server
// Description: MCP transports, auth plane, and tool modules.
// Purpose: Broker the Quilt data catalog to AI assistants over JSON-RPC.
// Dependencies: axum, tokio, jsonwebtoken, quilt-mcp-ops
// ============================================================================

//! ## Overview
//! The server accepts framed JSON-RPC over stdio or HTTP, validates bearer
//! tokens against a configured HS256 secret, exchanges claims for short-lived
//! AWS credentials with a single-flight cache, and dispatches `module_action`
//! tools through the `QuiltOps` backend selected by the deployment mode.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod credentials;
pub mod server;
pub mod telemetry;
pub mod tools;
pub mod workflow;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::McpAuditEvent;
pub use audit::McpAuditSink;
pub use audit::McpNoopAuditSink;
pub use audit::McpStderrAuditSink;
pub use auth::extract_bearer;
pub use auth::token_fingerprint;
pub use auth::JwtVerifier;
pub use credentials::CredentialCache;
pub use credentials::CredentialResolver;
pub use server::McpServer;
pub use telemetry::McpMethod;
pub use telemetry::McpMetricEvent;
pub use telemetry::McpMetrics;
pub use telemetry::McpOutcome;
pub use telemetry::NoopMetrics;
pub use tools::ToolDefinition;
pub use tools::ToolDescriptor;
pub use tools::ToolEffect;
pub use tools::ToolRouter;
pub use workflow::WorkflowRecord;
pub use workflow::WorkflowStatus;
pub use workflow::WorkflowStore;
