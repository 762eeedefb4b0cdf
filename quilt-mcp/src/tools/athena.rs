// quilt-mcp/src/tools/athena.rs
// ============================================================================
// Module: Athena Tools
// Description: SQL execution, database and workgroup discovery, history.
// Purpose: Expose the Athena lifecycle to MCP clients.
// Dependencies: quilt-mcp-aws
// ============================================================================

//! ## Overview
//! The catalog and schema always travel through `QueryExecutionContext`;
//! submitted SQL is never rewritten, which keeps hyphenated database names
//! working on engines that refuse to quote-parse a `USE` prefix.

// ============================================================================
// SECTION: Imports
// ============================================================================

use quilt_mcp_aws::AthenaQuerySpec;
use quilt_mcp_aws::AthenaRunner;
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
// SECTION: Constants
// ============================================================================

/// Default row cap for query results.
const DEFAULT_MAX_ROWS: usize = 10_000;

// ============================================================================
// SECTION: Descriptors
// ============================================================================

/// Returns the athena module descriptors.
#[must_use]
pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "athena_query_execute",
            module: "athena",
            description: "Run a SQL query through the full Athena lifecycle",
            effect: ToolEffect::Read,
            input_schema: json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {"type": "string", "description": "SQL text, submitted verbatim"},
                    "workgroup": {"type": "string", "description": "Explicit workgroup"},
                    "catalog": {"type": "string", "description": "Data catalog name"},
                    "schema": {"type": "string", "description": "Database, hyphens allowed"},
                    "max_rows": {"type": "integer", "description": "Row cap, default 10000"},
                    "output_location": {
                        "type": "string",
                        "description": "[ADVANCED] result staging override",
                    },
                },
            }),
            requirements: &["aws"],
        },
        ToolDescriptor {
            name: "athena_databases_list",
            module: "athena",
            description: "List databases in a data catalog",
            effect: ToolEffect::Read,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "catalog": {"type": "string", "description": "Defaults to AwsDataCatalog"},
                },
            }),
            requirements: &["aws"],
        },
        ToolDescriptor {
            name: "athena_workgroups_list",
            module: "athena",
            description: "List visible workgroups with their states",
            effect: ToolEffect::Read,
            input_schema: json!({"type": "object", "properties": {}}),
            requirements: &["aws"],
        },
        ToolDescriptor {
            name: "athena_query_history",
            module: "athena",
            description: "List recent query execution ids in a workgroup",
            effect: ToolEffect::Read,
            input_schema: json!({
                "type": "object",
                "required": ["workgroup"],
                "properties": {
                    "workgroup": {"type": "string"},
                    "limit": {"type": "integer"},
                },
            }),
            requirements: &["aws"],
        },
    ]
}

// ============================================================================
// SECTION: Argument Shapes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExecuteArgs {
    query: String,
    #[serde(default)]
    workgroup: Option<String>,
    #[serde(default)]
    catalog: Option<String>,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    max_rows: Option<usize>,
    #[serde(default)]
    output_location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DatabasesArgs {
    #[serde(default)]
    catalog: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HistoryArgs {
    workgroup: String,
    #[serde(default)]
    limit: Option<usize>,
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Handles one athena tool call.
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
        "athena_query_execute" => {
            let request: ExecuteArgs = decode_args(args)?;
            if request.query.trim().is_empty() {
                return Err(OpsError::validation("query must not be empty"));
            }
            let spec = AthenaQuerySpec {
                sql: request.query,
                workgroup: request.workgroup,
                catalog: request.catalog,
                database: request.schema,
                output_location: request.output_location,
            };
            let runner = runner(router, ctx).await?;
            let results = runner
                .execute(&spec, &ctx.cancel, request.max_rows.unwrap_or(DEFAULT_MAX_ROWS))
                .await?;
            Ok(json!({"success": true, "result": results}))
        }
        "athena_databases_list" => {
            let request: DatabasesArgs = decode_args(args)?;
            let runner = runner(router, ctx).await?;
            let databases = runner
                .databases(request.catalog.as_deref().unwrap_or(quilt_mcp_aws::athena::DEFAULT_DATA_CATALOG))
                .await?;
            Ok(json!({"success": true, "result": {"databases": databases}}))
        }
        "athena_workgroups_list" => {
            let NoArgs {} = decode_args(args)?;
            let runner = runner(router, ctx).await?;
            let workgroups: Vec<Value> = runner
                .workgroups()
                .await?
                .into_iter()
                .map(|(name, state)| json!({"name": name, "state": state}))
                .collect();
            Ok(json!({"success": true, "result": {"workgroups": workgroups}}))
        }
        "athena_query_history" => {
            let request: HistoryArgs = decode_args(args)?;
            let runner = runner(router, ctx).await?;
            let executions =
                runner.history(&request.workgroup, request.limit.unwrap_or(50)).await?;
            Ok(json!({"success": true, "result": {"executions": executions}}))
        }
        other => Err(OpsError::internal(format!("unroutable athena action: {other}"))),
    }
}

/// Builds the request-scoped Athena runner after credential resolution.
async fn runner(router: &ToolRouter, ctx: &RequestContext) -> OpsResult<AthenaRunner> {
    let ctx = router.aws_context(ctx).await?;
    AthenaRunner::for_request(&ctx, router.s3_options(), None).await
}
