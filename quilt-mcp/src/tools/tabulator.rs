// quilt-mcp/src/tools/tabulator.rs
// ============================================================================
// Module: Tabulator Tools
// Description: SQL-over-packages queries against the tabulator catalog.
// Purpose: Route tabulator SQL through Athena with catalog discovery.
// Dependencies: quilt-mcp-aws, quilt-mcp-catalog
// ============================================================================

//! ## Overview
//! The tabulator data catalog name is discovered from the catalog's public
//! `config.json` as `quilt-<stack-prefix>-tabulator` (no auth required) and
//! queries then follow the normal Athena lifecycle. Table listings come from
//! the catalog's bucket configuration.

// ============================================================================
// SECTION: Imports
// ============================================================================

use quilt_mcp_aws::AthenaQuerySpec;
use quilt_mcp_aws::AthenaRunner;
use quilt_mcp_core::ErrorKind;
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

/// Default row cap for tabulator query results.
const DEFAULT_MAX_ROWS: usize = 10_000;

/// GraphQL query listing tabulator tables on a bucket.
const TABULATOR_TABLES_QUERY: &str = r"query TabulatorTables($bucket: String!) {
  admin { bucketConfig(name: $bucket) { tabulatorTables { name config } } }
}";

// ============================================================================
// SECTION: Descriptors
// ============================================================================

/// Returns the tabulator module descriptors.
#[must_use]
pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "tabulator_tables_list",
            module: "tabulator",
            description: "List tabulator tables configured on a bucket",
            effect: ToolEffect::Read,
            input_schema: json!({
                "type": "object",
                "required": ["bucket"],
                "properties": {"bucket": {"type": "string"}},
            }),
            requirements: &["catalog"],
        },
        ToolDescriptor {
            name: "tabulator_query_execute",
            module: "tabulator",
            description: "Run SQL against the catalog-derived tabulator database",
            effect: ToolEffect::Read,
            input_schema: json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {"type": "string", "description": "SQL text, submitted verbatim"},
                    "schema": {"type": "string", "description": "Tabulator database override"},
                    "workgroup": {"type": "string"},
                    "max_rows": {"type": "integer"},
                },
            }),
            requirements: &["aws", "catalog"],
        },
    ]
}

// ============================================================================
// SECTION: Argument Shapes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TablesArgs {
    bucket: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QueryArgs {
    query: String,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    workgroup: Option<String>,
    #[serde(default)]
    max_rows: Option<usize>,
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Handles one tabulator tool call.
///
/// # Errors
///
/// Returns the uniform envelope on any failure; deployments rejecting the
/// tabulator endpoint surface a distinguishable upstream error.
pub async fn handle(
    router: &ToolRouter,
    ctx: &RequestContext,
    name: &str,
    args: Value,
) -> OpsResult<Value> {
    match name {
        "tabulator_tables_list" => {
            let request: TablesArgs = decode_args(args)?;
            let catalog = router.catalog().ok_or_else(no_catalog)?;
            let data = catalog
                .graphql(
                    ctx.bearer.as_deref(),
                    TABULATOR_TABLES_QUERY,
                    json!({"bucket": request.bucket}),
                )
                .await?;
            let tables = data
                .pointer("/admin/bucketConfig/tabulatorTables")
                .cloned()
                .unwrap_or(Value::Array(Vec::new()));
            Ok(json!({"success": true, "result": {"tables": tables}}))
        }
        "tabulator_query_execute" => {
            let request: QueryArgs = decode_args(args)?;
            if request.query.trim().is_empty() {
                return Err(OpsError::validation("query must not be empty"));
            }
            let catalog = router.catalog().ok_or_else(no_catalog)?;
            let config = catalog.public_config().await?;
            let spec = AthenaQuerySpec {
                sql: request.query,
                workgroup: request.workgroup,
                catalog: Some(config.tabulator_database.clone()),
                database: request.schema,
                output_location: None,
            };
            let aws_ctx = router.aws_context(ctx).await?;
            let runner = AthenaRunner::for_request(&aws_ctx, router.s3_options(), None).await?;
            let results = runner
                .execute(&spec, &ctx.cancel, request.max_rows.unwrap_or(DEFAULT_MAX_ROWS))
                .await?;
            Ok(json!({"success": true, "result": {
                "tabulator_catalog": config.tabulator_database,
                "query": results,
            }}))
        }
        other => Err(OpsError::internal(format!("unroutable tabulator action: {other}"))),
    }
}

fn no_catalog() -> OpsError {
    OpsError::new(ErrorKind::ConfigInvalid, "tabulator requires a configured catalog")
        .with_fix_hint("set QUILT_CATALOG_URL")
}
