// quilt-mcp/src/tools/search_tools.rs
// ============================================================================
// Module: Search Tools
// Description: Unified search and package-name suggestion actions.
// Purpose: Expose the search layer to MCP clients.
// Dependencies: quilt-mcp-search, quilt-mcp-ops
// ============================================================================

//! ## Overview
//! `search_query` accepts either `bucket` (singular) or `buckets` (list) and
//! normalizes them into one backend filter, so both spellings reach the
//! backend identically. Suggestions are a cheap package-name prefix match.

// ============================================================================
// SECTION: Imports
// ============================================================================

use quilt_mcp_core::OpsError;
use quilt_mcp_core::OpsResult;
use quilt_mcp_core::RequestContext;
use quilt_mcp_core::ResultType;
use quilt_mcp_core::SearchQuery;
use quilt_mcp_core::SearchScope;
use quilt_mcp_search::normalize_buckets;
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

/// Returns the search module descriptors.
#[must_use]
pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "search_query",
            module: "search",
            description: "Unified search across Elasticsearch, GraphQL, and S3",
            effect: ToolEffect::Read,
            input_schema: json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {"type": "string", "description": "Free text; * matches all"},
                    "scope": {"type": "string", "enum": ["bucket", "package", "global"]},
                    "bucket": {"type": "string", "description": "Single bucket filter"},
                    "buckets": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Bucket filter list",
                    },
                    "type": {"type": "string", "enum": ["packages", "objects", "both"]},
                    "limit": {"type": "integer"},
                },
            }),
            requirements: &[],
        },
        ToolDescriptor {
            name: "search_suggest",
            module: "search",
            description: "Suggest package names matching a prefix",
            effect: ToolEffect::Read,
            input_schema: json!({
                "type": "object",
                "required": ["prefix"],
                "properties": {
                    "prefix": {"type": "string"},
                    "registry": {"type": "string"},
                    "limit": {"type": "integer"},
                },
            }),
            requirements: &[],
        },
    ]
}

// ============================================================================
// SECTION: Argument Shapes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QueryArgs {
    query: String,
    #[serde(default)]
    scope: Option<SearchScope>,
    #[serde(default)]
    bucket: Option<String>,
    #[serde(default)]
    buckets: Option<Vec<String>>,
    #[serde(default, rename = "type")]
    result_type: Option<ResultType>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SuggestArgs {
    prefix: String,
    #[serde(default)]
    registry: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Handles one search tool call.
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
    match name {
        "search_query" => {
            let request: QueryArgs = decode_args(args)?;
            let buckets =
                normalize_buckets(request.bucket.as_deref(), request.buckets.as_deref());
            let query = SearchQuery {
                text: request.query,
                scope: request.scope.unwrap_or_default(),
                buckets,
                result_type: request.result_type.unwrap_or_default(),
                limit: request.limit.unwrap_or(quilt_mcp_core::search::DEFAULT_SEARCH_LIMIT),
            };
            // Search works without AWS credentials outside strict mode; the
            // catalog paths only need the bearer token.
            let ctx = match router.aws_context(ctx).await {
                Ok(ctx) => ctx,
                Err(err) if router.config().require_jwt => return Err(err),
                Err(_) => ctx.clone(),
            };
            let backend = router.backend(&ctx).await?;
            let response = backend.search(&ctx, &query).await?;
            Ok(json!({"success": true, "result": response}))
        }
        "search_suggest" => {
            let request: SuggestArgs = decode_args(args)?;
            let registry = request
                .registry
                .or_else(|| router.config().registry_url.clone())
                .map(|raw| {
                    raw.trim_start_matches("s3://").split('/').next().unwrap_or_default().to_string()
                })
                .ok_or_else(|| {
                    OpsError::validation("no registry given and none configured")
                        .with_fix_hint("pass `registry` or set QUILT_REGISTRY_URL")
                })?;
            let backend = router.backend(ctx).await?;
            let page = backend
                .package_list(
                    ctx,
                    &registry,
                    Some(request.prefix.as_str()),
                    request.limit.unwrap_or(10),
                    None,
                )
                .await?;
            Ok(json!({"success": true, "result": {"suggestions": page.names}}))
        }
        other => Err(OpsError::internal(format!("unroutable search action: {other}"))),
    }
}
