// quilt-mcp/src/tools/admin.rs
// ============================================================================
// Module: Admin Tools
// Description: User, role, policy, and SSO administration actions.
// Purpose: Expose the catalog admin protocol to MCP clients.
// Dependencies: quilt-mcp-catalog, quilt-mcp-ops
// ============================================================================

//! ## Overview
//! Admin actions exist only on the GraphQL backend; the direct backend
//! refuses them. Policy deletion is refused with `IN_USE` while the policy
//! is attached to any role.

// ============================================================================
// SECTION: Imports
// ============================================================================

use quilt_mcp_catalog::BucketPermission;
use quilt_mcp_catalog::ManagedPolicyInput;
use quilt_mcp_catalog::PermissionLevel;
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

/// Returns the admin module descriptors.
#[must_use]
pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "admin_users_list",
            module: "admin",
            description: "List catalog users",
            effect: ToolEffect::Admin,
            input_schema: json!({"type": "object", "properties": {}}),
            requirements: &["graphql"],
        },
        ToolDescriptor {
            name: "admin_user_create",
            module: "admin",
            description: "Create a catalog user with a role",
            effect: ToolEffect::Admin,
            input_schema: json!({
                "type": "object",
                "required": ["name", "email", "role"],
                "properties": {
                    "name": {"type": "string"},
                    "email": {"type": "string"},
                    "role": {"type": "string"},
                },
            }),
            requirements: &["graphql"],
        },
        ToolDescriptor {
            name: "admin_user_delete",
            module: "admin",
            description: "Delete a catalog user",
            effect: ToolEffect::Admin,
            input_schema: json!({
                "type": "object",
                "required": ["name"],
                "properties": {"name": {"type": "string"}},
            }),
            requirements: &["graphql"],
        },
        ToolDescriptor {
            name: "admin_roles_list",
            module: "admin",
            description: "List catalog roles, managed and unmanaged",
            effect: ToolEffect::Admin,
            input_schema: json!({"type": "object", "properties": {}}),
            requirements: &["graphql"],
        },
        ToolDescriptor {
            name: "admin_role_create",
            module: "admin",
            description: "Create a role from policies (managed) or an IAM ARN (unmanaged)",
            effect: ToolEffect::Admin,
            input_schema: json!({
                "type": "object",
                "required": ["name"],
                "properties": {
                    "name": {"type": "string"},
                    "policy_ids": {"type": "array", "items": {"type": "string"}},
                    "arn": {"type": "string", "description": "IAM role ARN for unmanaged roles"},
                },
            }),
            requirements: &["graphql"],
        },
        ToolDescriptor {
            name: "admin_role_delete",
            module: "admin",
            description: "Delete a role by id",
            effect: ToolEffect::Admin,
            input_schema: json!({
                "type": "object",
                "required": ["id"],
                "properties": {"id": {"type": "string"}},
            }),
            requirements: &["graphql"],
        },
        ToolDescriptor {
            name: "admin_policies_list",
            module: "admin",
            description: "List catalog policies with their role attachments",
            effect: ToolEffect::Admin,
            input_schema: json!({"type": "object", "properties": {}}),
            requirements: &["graphql"],
        },
        ToolDescriptor {
            name: "admin_policy_create",
            module: "admin",
            description: "Create a policy from bucket permissions (managed) or an IAM ARN",
            effect: ToolEffect::Admin,
            input_schema: json!({
                "type": "object",
                "required": ["title"],
                "properties": {
                    "title": {"type": "string"},
                    "permissions": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["bucket", "level"],
                            "properties": {
                                "bucket": {"type": "string"},
                                "level": {"type": "string", "enum": ["READ", "READ_WRITE"]},
                            },
                        },
                    },
                    "arn": {"type": "string", "description": "IAM policy ARN for unmanaged"},
                },
            }),
            requirements: &["graphql"],
        },
        ToolDescriptor {
            name: "admin_policy_delete",
            module: "admin",
            description: "Delete a policy; refused with IN_USE while attached to a role",
            effect: ToolEffect::Admin,
            input_schema: json!({
                "type": "object",
                "required": ["id"],
                "properties": {"id": {"type": "string"}},
            }),
            requirements: &["graphql"],
        },
        ToolDescriptor {
            name: "admin_sso_config_get",
            module: "admin",
            description: "Fetch the SSO configuration document",
            effect: ToolEffect::Admin,
            input_schema: json!({"type": "object", "properties": {}}),
            requirements: &["graphql"],
        },
        ToolDescriptor {
            name: "admin_sso_config_set",
            module: "admin",
            description: "Replace the SSO configuration document",
            effect: ToolEffect::Admin,
            input_schema: json!({
                "type": "object",
                "required": ["config"],
                "properties": {"config": {"type": "string"}},
            }),
            requirements: &["graphql"],
        },
    ]
}

// ============================================================================
// SECTION: Argument Shapes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UserCreateArgs {
    name: String,
    email: String,
    role: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NameArgs {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RoleCreateArgs {
    name: String,
    #[serde(default)]
    policy_ids: Option<Vec<String>>,
    #[serde(default)]
    arn: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IdArgs {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyCreateArgs {
    title: String,
    #[serde(default)]
    permissions: Option<Vec<PermissionArgs>>,
    #[serde(default)]
    arn: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PermissionArgs {
    bucket: String,
    level: PermissionLevel,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SsoSetArgs {
    config: String,
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Handles one admin tool call.
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
    let token = ctx.bearer.as_deref();
    match name {
        "admin_users_list" => {
            let NoArgs {} = decode_args(args)?;
            let admin = admin_of(router, ctx).await?;
            let users = admin.users_list(token).await?;
            Ok(json!({"success": true, "result": {"users": users}}))
        }
        "admin_user_create" => {
            let request: UserCreateArgs = decode_args(args)?;
            let admin = admin_of(router, ctx).await?;
            let created = admin
                .user_create(token, &request.name, &request.email, &request.role)
                .await?;
            Ok(json!({"success": true, "result": created}))
        }
        "admin_user_delete" => {
            let request: NameArgs = decode_args(args)?;
            let admin = admin_of(router, ctx).await?;
            admin.user_delete(token, &request.name).await?;
            Ok(json!({"success": true, "result": {"deleted": request.name}}))
        }
        "admin_roles_list" => {
            let NoArgs {} = decode_args(args)?;
            let admin = admin_of(router, ctx).await?;
            let roles = admin.roles_list(token).await?;
            Ok(json!({"success": true, "result": {"roles": roles}}))
        }
        "admin_role_create" => {
            let request: RoleCreateArgs = decode_args(args)?;
            let admin = admin_of(router, ctx).await?;
            let created = match (request.policy_ids, request.arn) {
                (Some(policy_ids), None) => {
                    admin.role_create_managed(token, &request.name, &policy_ids).await?
                }
                (None, Some(arn)) => {
                    admin.role_create_unmanaged(token, &request.name, &arn).await?
                }
                _ => {
                    return Err(OpsError::validation(
                        "set exactly one of policy_ids (managed) or arn (unmanaged)",
                    ));
                }
            };
            Ok(json!({"success": true, "result": created}))
        }
        "admin_role_delete" => {
            let request: IdArgs = decode_args(args)?;
            let admin = admin_of(router, ctx).await?;
            admin.role_delete(token, &request.id).await?;
            Ok(json!({"success": true, "result": {"deleted": request.id}}))
        }
        "admin_policies_list" => {
            let NoArgs {} = decode_args(args)?;
            let admin = admin_of(router, ctx).await?;
            let policies = admin.policies_list(token).await?;
            Ok(json!({"success": true, "result": {"policies": policies}}))
        }
        "admin_policy_create" => {
            let request: PolicyCreateArgs = decode_args(args)?;
            let admin = admin_of(router, ctx).await?;
            let created = match (request.permissions, request.arn) {
                (Some(permissions), None) => {
                    let input = ManagedPolicyInput {
                        title: request.title,
                        permissions: permissions
                            .into_iter()
                            .map(|permission| BucketPermission {
                                bucket: permission.bucket,
                                level: permission.level,
                            })
                            .collect(),
                    };
                    admin.policy_create_managed(token, &input).await?
                }
                (None, Some(arn)) => {
                    admin.policy_create_unmanaged(token, &request.title, &arn).await?
                }
                _ => {
                    return Err(OpsError::validation(
                        "set exactly one of permissions (managed) or arn (unmanaged)",
                    ));
                }
            };
            Ok(json!({"success": true, "result": created}))
        }
        "admin_policy_delete" => {
            let request: IdArgs = decode_args(args)?;
            let admin = admin_of(router, ctx).await?;
            admin.policy_delete(token, &request.id).await?;
            Ok(json!({"success": true, "result": {"deleted": request.id}}))
        }
        "admin_sso_config_get" => {
            let NoArgs {} = decode_args(args)?;
            let admin = admin_of(router, ctx).await?;
            let config = admin.sso_config_get(token).await?;
            Ok(json!({"success": true, "result": config}))
        }
        "admin_sso_config_set" => {
            let request: SsoSetArgs = decode_args(args)?;
            let admin = admin_of(router, ctx).await?;
            let updated = admin.sso_config_set(token, &request.config).await?;
            Ok(json!({"success": true, "result": updated}))
        }
        other => Err(OpsError::internal(format!("unroutable admin action: {other}"))),
    }
}

/// Builds the backend and returns its admin client.
async fn admin_of(
    router: &ToolRouter,
    ctx: &RequestContext,
) -> OpsResult<quilt_mcp_catalog::AdminClient> {
    let backend = router.backend(ctx).await?;
    Ok(backend.admin()?.clone())
}
