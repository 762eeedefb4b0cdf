// quilt-mcp/tests/tool_surface.rs
// ============================================================================
// Module: Tool Surface Tests
// Description: Integration tests for tool discovery and dispatch invariants.
// Purpose: Pin the registry shape and the universal auth/validation rules.
// Dependencies: quilt-mcp, tokio
// ============================================================================

use quilt_mcp::ToolRouter;
use quilt_mcp_config::ConfigOverrides;
use quilt_mcp_config::QuiltMcpConfig;
use quilt_mcp_core::ErrorKind;

fn resolve_config(require_jwt: bool) -> QuiltMcpConfig {
    QuiltMcpConfig::resolve_with(&ConfigOverrides::default(), move |name| match name {
        "QUILT_CATALOG_URL" => Some("https://demo.quiltdata.com".to_string()),
        "QUILT_REGISTRY_URL" => Some("s3://demo-registry".to_string()),
        "MCP_REQUIRE_JWT" if require_jwt => Some("true".to_string()),
        "MCP_JWT_SECRET" if require_jwt => Some("integration-secret".to_string()),
        _ => None,
    })
    .expect("config resolves")
}

async fn router(require_jwt: bool) -> ToolRouter {
    ToolRouter::new(resolve_config(require_jwt)).await.expect("router builds")
}

#[tokio::test]
async fn every_advertised_tool_has_an_object_schema() {
    let router = router(false).await;
    let tools = router.list_tools(false);
    assert!(tools.len() >= 30, "expected the full module surface, got {}", tools.len());
    for tool in &tools {
        assert_eq!(
            tool.input_schema.get("type").and_then(|v| v.as_str()),
            Some("object"),
            "{} must advertise an object schema",
            tool.name
        );
        assert!(!tool.description.is_empty());
    }
}

#[tokio::test]
async fn expected_actions_are_present_and_diagnostics_are_excluded() {
    let router = router(false).await;
    let tools = router.list_tools(false);
    let names: Vec<&str> = tools.iter().map(|tool| tool.name.as_str()).collect();
    for expected in [
        "auth_status",
        "buckets_objects_list",
        "buckets_object_text",
        "buckets_objects_put",
        "packaging_create",
        "packaging_manifest",
        "packaging_tag_add",
        "athena_query_execute",
        "tabulator_query_execute",
        "search_query",
        "admin_policy_delete",
    ] {
        assert!(names.contains(&expected), "missing tool {expected}");
    }
    assert!(!names.contains(&"auth_jwt_diagnostics"), "excluded tool must not be advertised");
    assert!(!names.contains(&"workflow_create"), "workflow tools are legacy-mode only");
}

#[tokio::test]
async fn strict_mode_without_bearer_rejects_context_construction() {
    let router = router(true).await;
    let err = router.base_context("1", None).expect_err("strict mode must fail closed");
    assert_eq!(err.kind, ErrorKind::AuthNoCredentials);
}

#[tokio::test]
async fn malformed_arguments_fail_validation_for_every_module() {
    let router = router(false).await;
    let ctx = router.base_context("1", None).expect("context");
    // An unknown field must be rejected before any backend is touched; these
    // run offline, so anything past validation would surface as a transport
    // error instead of VALIDATION_FAILED.
    for (tool, args) in [
        ("buckets_objects_list", serde_json::json!({"bucket": "b", "bogus": 1})),
        ("packaging_create", serde_json::json!({"name": "a/b", "entries": [], "bogus": 1})),
        ("athena_query_execute", serde_json::json!({"query": "SELECT 1", "bogus": 1})),
        ("search_query", serde_json::json!({"query": "*", "bogus": 1})),
        ("admin_user_create", serde_json::json!({"name": "n", "bogus": 1})),
    ] {
        let err = router
            .handle_tool_call(&ctx, tool, args)
            .await
            .expect_err("malformed arguments must fail");
        assert_eq!(err.kind, ErrorKind::ValidationFailed, "{tool} must validate first");
    }
}

#[tokio::test]
async fn unknown_tools_are_method_not_found() {
    let router = router(false).await;
    let ctx = router.base_context("1", None).expect("context");
    let err = router
        .handle_tool_call(&ctx, "packaging_destroy_all", serde_json::json!({}))
        .await
        .expect_err("unknown tool must fail");
    assert_eq!(err.kind, ErrorKind::MethodNotFound);
}

#[tokio::test]
async fn admin_actions_refuse_the_direct_backend() {
    let config = QuiltMcpConfig::resolve_with(
        &ConfigOverrides {
            deployment: Some(quilt_mcp_core::DeploymentMode::Legacy),
            ..ConfigOverrides::default()
        },
        |name| match name {
            "QUILT_REGISTRY_URL" => Some("s3://demo-registry".to_string()),
            _ => None,
        },
    )
    .expect("config");
    let router = ToolRouter::new(config).await.expect("router");
    let ctx = router.base_context("1", None).expect("context");
    let err = router
        .handle_tool_call(&ctx, "admin_users_list", serde_json::json!({}))
        .await
        .expect_err("direct backend must refuse admin");
    assert_eq!(err.kind, ErrorKind::ValidationFailed);
    assert!(err.fix_hint.is_some());
}
