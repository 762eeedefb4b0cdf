// quilt-mcp-aws/src/secrets.rs
// ============================================================================
// Module: Parameter Store Secrets
// Description: SSM-backed secret retrieval for the JWT shared secret.
// Purpose: Resolve `MCP_JWT_SECRET_PARAMETER` paths at startup.
// Dependencies: aws-config, aws-sdk-ssm, quilt-mcp-core
// ============================================================================

//! ## Overview
//! When a parameter-store path is configured it wins over the inline secret.
//! The parameter is fetched once at startup with decryption enabled; the
//! value never appears in logs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use aws_config::BehaviorVersion;
use aws_sdk_ssm::error::ProvideErrorMetadata;
use quilt_mcp_core::ErrorKind;
use quilt_mcp_core::OpsError;
use quilt_mcp_core::OpsResult;

// ============================================================================
// SECTION: Retrieval
// ============================================================================

/// Fetches a decrypted parameter value from SSM Parameter Store.
///
/// # Errors
///
/// Returns `NOT_FOUND` for a missing parameter, `PERMISSION_DENIED` when
/// access is refused, and the mapped envelope on other failures.
pub async fn fetch_parameter(name: &str) -> OpsResult<String> {
    let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let client = aws_sdk_ssm::Client::new(&shared);
    let output = client
        .get_parameter()
        .name(name)
        .with_decryption(true)
        .send()
        .await
        .map_err(|err| {
            let code = err.code().unwrap_or_default();
            let kind = match code {
                "ParameterNotFound" => ErrorKind::NotFound,
                "AccessDeniedException" => ErrorKind::PermissionDenied,
                _ => ErrorKind::UpstreamUnavailable,
            };
            OpsError::new(kind, format!("parameter store fetch failed for {name}"))
                .with_cause(code.to_string())
        })?;
    output
        .parameter()
        .and_then(|parameter| parameter.value())
        .map(str::to_string)
        .ok_or_else(|| OpsError::not_found(format!("parameter {name} has no value")))
}
