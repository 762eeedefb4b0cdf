// quilt-mcp/src/tools/auth_tools.rs
// ============================================================================
// Module: Auth Tools
// Description: Authentication status, catalog info, and logout actions.
// Purpose: Expose the auth plane to MCP clients.
// Dependencies: quilt-mcp-ops, quilt-mcp-catalog
// ============================================================================

//! ## Overview
//! Status and catalog-info are read-only; logout evicts the caller's cached
//! credentials. The diagnostics action exists for operators but ships on the
//! exclusion list.

// ============================================================================
// SECTION: Imports
// ============================================================================

use quilt_mcp_core::OpsError;
use quilt_mcp_core::OpsResult;
use quilt_mcp_core::RequestContext;
use serde::Deserialize;
use serde_json::json;
use serde_json::Value;

use crate::tools::decode_args;
use crate::tools::ToolDescriptor;
use crate::tools::ToolEffect;
use crate::tools::ToolRouter;

// ============================================================================
// SECTION: Descriptors
// ============================================================================

/// Returns the auth module descriptors.
#[must_use]
pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "auth_status",
            module: "auth",
            description: "Report whether the caller is authenticated and against which catalog",
            effect: ToolEffect::Read,
            input_schema: json!({"type": "object", "properties": {}}),
            requirements: &[],
        },
        ToolDescriptor {
            name: "auth_catalog_info",
            module: "auth",
            description: "Summarize the configured catalog, registry, and tabulator database",
            effect: ToolEffect::Read,
            input_schema: json!({"type": "object", "properties": {}}),
            requirements: &[],
        },
        ToolDescriptor {
            name: "auth_logout",
            module: "auth",
            description: "Evict the caller's cached AWS credentials",
            effect: ToolEffect::Remove,
            input_schema: json!({"type": "object", "properties": {}}),
            requirements: &["bearer"],
        },
        ToolDescriptor {
            name: "auth_jwt_diagnostics",
            module: "auth",
            description: "Inspect the redacted header of the presented bearer token",
            effect: ToolEffect::Read,
            input_schema: json!({"type": "object", "properties": {}}),
            requirements: &["bearer"],
        },
    ]
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Empty argument shape shared by the status actions.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

/// Handles one auth tool call.
///
/// # Errors
///
/// Returns the uniform envelope on any failure.
pub async fn handle(
    router: &ToolRouter,
    ctx: &RequestContext,
    name: &str,
    args: Value,
) -> OpsResult<Value> {
    let NoArgs {} = decode_args(args)?;
    match name {
        "auth_status" => {
            let backend = router.backend(ctx).await?;
            let status = backend.auth_status(ctx).await?;
            Ok(json!({"success": true, "result": status}))
        }
        "auth_catalog_info" => {
            let mut info = json!({
                "catalog_url": ctx.catalog_url,
                "registry_url": ctx.registry_url,
                "deployment": ctx.mode,
                "backend": ctx.backend,
            });
            if let Some(catalog) = router.catalog() {
                if let Ok(config) = catalog.public_config().await {
                    info["region"] = json!(config.region);
                    info["tabulator_database"] = json!(config.tabulator_database);
                    info["stack_prefix"] = json!(config.stack_prefix);
                }
            }
            Ok(json!({"success": true, "result": info}))
        }
        "auth_logout" => {
            let subject = ctx
                .subject()
                .ok_or_else(|| OpsError::validation("logout requires a validated bearer token"))?
                .to_string();
            router.resolver().logout(&subject).await;
            Ok(json!({"success": true, "result": {"logged_out": true, "subject": subject}}))
        }
        "auth_jwt_diagnostics" => {
            let redacted = ctx
                .bearer
                .as_deref()
                .map(quilt_mcp_core::context::redact_token);
            Ok(json!({"success": true, "result": {
                "token": redacted,
                "subject": ctx.subject(),
                "claims_present": ctx.claims.is_some(),
            }}))
        }
        other => Err(OpsError::internal(format!("unroutable auth action: {other}"))),
    }
}
