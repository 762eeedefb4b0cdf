// quilt-mcp/src/tools/workflow_tools.rs
// ============================================================================
// Module: Workflow Tools
// Description: Legacy-mode workflow bookkeeping actions.
// Purpose: Track named step lists in memory; no persistence, no scheduler.
// Dependencies: quilt-mcp-core
// ============================================================================

//! ## Overview
//! Registered only in legacy mode. Records live in memory and are lost on
//! restart; the tool descriptions say so to keep clients from relying on
//! durability that does not exist.

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

/// Returns the workflow module descriptors (legacy mode only).
#[must_use]
pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "workflow_create",
            module: "workflow",
            description: "Create an in-memory workflow record; lost on restart",
            effect: ToolEffect::Create,
            input_schema: json!({
                "type": "object",
                "required": ["name", "steps"],
                "properties": {
                    "name": {"type": "string"},
                    "steps": {"type": "array", "items": {"type": "string"}},
                },
            }),
            requirements: &["legacy"],
        },
        ToolDescriptor {
            name: "workflow_status",
            module: "workflow",
            description: "Read one workflow record",
            effect: ToolEffect::Read,
            input_schema: json!({
                "type": "object",
                "required": ["id"],
                "properties": {"id": {"type": "string"}},
            }),
            requirements: &["legacy"],
        },
        ToolDescriptor {
            name: "workflow_step_complete",
            module: "workflow",
            description: "Mark one workflow step done",
            effect: ToolEffect::Update,
            input_schema: json!({
                "type": "object",
                "required": ["id", "step"],
                "properties": {
                    "id": {"type": "string"},
                    "step": {"type": "string"},
                },
            }),
            requirements: &["legacy"],
        },
        ToolDescriptor {
            name: "workflow_list",
            module: "workflow",
            description: "List in-memory workflow records",
            effect: ToolEffect::Read,
            input_schema: json!({"type": "object", "properties": {}}),
            requirements: &["legacy"],
        },
    ]
}

// ============================================================================
// SECTION: Argument Shapes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateArgs {
    name: String,
    steps: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IdArgs {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StepArgs {
    id: String,
    step: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Handles one workflow tool call.
///
/// # Errors
///
/// Returns the uniform envelope on any failure.
pub async fn handle(
    router: &ToolRouter,
    _ctx: &RequestContext,
    name: &str,
    args: Value,
) -> OpsResult<Value> {
    let store = router.workflows();
    match name {
        "workflow_create" => {
            let request: CreateArgs = decode_args(args)?;
            let record = store.create(&request.name, request.steps)?;
            Ok(json!({"success": true, "result": record}))
        }
        "workflow_status" => {
            let request: IdArgs = decode_args(args)?;
            let record = store.get(&request.id)?;
            Ok(json!({"success": true, "result": record}))
        }
        "workflow_step_complete" => {
            let request: StepArgs = decode_args(args)?;
            let record = store.complete_step(&request.id, &request.step)?;
            Ok(json!({"success": true, "result": record}))
        }
        "workflow_list" => {
            let NoArgs {} = decode_args(args)?;
            Ok(json!({"success": true, "result": {"workflows": store.list()}}))
        }
        other => Err(OpsError::internal(format!("unroutable workflow action: {other}"))),
    }
}
