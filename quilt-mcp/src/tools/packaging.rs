// quilt-mcp/src/tools/packaging.rs
// ============================================================================
// Module: Packaging Tools
// Description: Package create, update, delete, browse, and tag actions.
// Purpose: Expose the QuiltOps package protocol to MCP clients.
// Dependencies: quilt-mcp-ops
// ============================================================================

//! ## Overview
//! All actions route through `QuiltOps`, so both backends serve the same
//! surface. `packaging_delete` without a `top_hash` removes the package's
//! tag map and keeps content-addressed revisions reachable by hash — the
//! tool description states this so clients are not surprised.

// ============================================================================
// SECTION: Imports
// ============================================================================

use quilt_mcp_core::CopyMode;
use quilt_mcp_core::HashAlgorithm;
use quilt_mcp_core::HashDigest;
use quilt_mcp_core::OpsError;
use quilt_mcp_core::OpsResult;
use quilt_mcp_core::PackageEntrySource;
use quilt_mcp_core::PackageRef;
use quilt_mcp_core::RequestContext;
use quilt_mcp_ops::PackageEntryRequest;
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

/// Returns the packaging module descriptors.
#[must_use]
pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "packaging_list",
            module: "packaging",
            description: "List packages in a registry",
            effect: ToolEffect::Read,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "registry": {"type": "string", "description": "Registry bucket"},
                    "filter": {"type": "string", "description": "Substring name filter"},
                    "limit": {"type": "integer"},
                    "continuation": {"type": "string"},
                },
            }),
            requirements: &[],
        },
        ToolDescriptor {
            name: "packaging_browse",
            module: "packaging",
            description: "Browse a package revision's logical entries",
            effect: ToolEffect::Read,
            input_schema: revision_schema(),
            requirements: &[],
        },
        ToolDescriptor {
            name: "packaging_manifest",
            module: "packaging",
            description: "Read a revision's full manifest with metadata and top hash",
            effect: ToolEffect::Read,
            input_schema: revision_schema(),
            requirements: &[],
        },
        ToolDescriptor {
            name: "packaging_versions",
            module: "packaging",
            description: "List stored revisions, newest first",
            effect: ToolEffect::Read,
            input_schema: json!({
                "type": "object",
                "required": ["name"],
                "properties": {
                    "registry": {"type": "string"},
                    "name": {"type": "string"},
                    "limit": {"type": "integer"},
                    "with_tags": {"type": "boolean"},
                },
            }),
            requirements: &[],
        },
        ToolDescriptor {
            name: "packaging_create",
            module: "packaging",
            description: "Create a package revision from S3 objects or inline content",
            effect: ToolEffect::Create,
            input_schema: write_schema(),
            requirements: &["aws"],
        },
        ToolDescriptor {
            name: "packaging_update",
            module: "packaging",
            description: "Update a package: new entries replace matching logical paths",
            effect: ToolEffect::Update,
            input_schema: write_schema(),
            requirements: &["aws"],
        },
        ToolDescriptor {
            name: "packaging_delete",
            module: "packaging",
            description: "Delete one revision by top_hash; without top_hash, remove the \
                          package's tag map (revisions stay reachable by hash)",
            effect: ToolEffect::Remove,
            input_schema: revision_schema(),
            requirements: &["aws"],
        },
        ToolDescriptor {
            name: "packaging_tag_list",
            module: "packaging",
            description: "List the package's tag map",
            effect: ToolEffect::Read,
            input_schema: json!({
                "type": "object",
                "required": ["name"],
                "properties": {
                    "registry": {"type": "string"},
                    "name": {"type": "string"},
                },
            }),
            requirements: &[],
        },
        ToolDescriptor {
            name: "packaging_tag_add",
            module: "packaging",
            description: "Point a tag at a stored revision",
            effect: ToolEffect::Update,
            input_schema: json!({
                "type": "object",
                "required": ["name", "tag", "top_hash"],
                "properties": {
                    "registry": {"type": "string"},
                    "name": {"type": "string"},
                    "tag": {"type": "string"},
                    "top_hash": {"type": "string"},
                },
            }),
            requirements: &["aws"],
        },
        ToolDescriptor {
            name: "packaging_tag_delete",
            module: "packaging",
            description: "Remove a tag from the package's tag map",
            effect: ToolEffect::Remove,
            input_schema: json!({
                "type": "object",
                "required": ["name", "tag"],
                "properties": {
                    "registry": {"type": "string"},
                    "name": {"type": "string"},
                    "tag": {"type": "string"},
                },
            }),
            requirements: &["aws"],
        },
    ]
}

fn revision_schema() -> Value {
    json!({
        "type": "object",
        "required": ["name"],
        "properties": {
            "registry": {"type": "string", "description": "Registry bucket"},
            "name": {"type": "string", "description": "Package name, namespace/name"},
            "top_hash": {"type": "string", "description": "Revision hash; latest when absent"},
        },
    })
}

fn write_schema() -> Value {
    json!({
        "type": "object",
        "required": ["name", "entries"],
        "properties": {
            "registry": {"type": "string"},
            "name": {"type": "string"},
            "entries": {
                "type": "array",
                "description": "Entries with logical_path plus source (s3 uri) or text",
                "items": {
                    "type": "object",
                    "required": ["logical_path"],
                    "properties": {
                        "logical_path": {"type": "string"},
                        "source": {"type": "string", "description": "s3://bucket/key"},
                        "text": {"type": "string", "description": "Inline content"},
                    },
                },
            },
            "metadata": {"type": "object", "description": "User metadata blob"},
            "copy_mode": {"type": "string", "enum": ["none", "new", "all"]},
            "message": {"type": "string", "description": "Commit message"},
            "top_hash": {"type": "string", "description": "Prior revision for updates"},
        },
    })
}

// ============================================================================
// SECTION: Argument Shapes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListArgs {
    #[serde(default)]
    registry: Option<String>,
    #[serde(default)]
    filter: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    continuation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RevisionArgs {
    #[serde(default)]
    registry: Option<String>,
    name: String,
    #[serde(default)]
    top_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VersionsArgs {
    #[serde(default)]
    registry: Option<String>,
    name: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    with_tags: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WriteArgs {
    #[serde(default)]
    registry: Option<String>,
    name: String,
    entries: Vec<EntryArgs>,
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default)]
    copy_mode: CopyMode,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    top_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntryArgs {
    logical_path: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TagListArgs {
    #[serde(default)]
    registry: Option<String>,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TagAddArgs {
    #[serde(default)]
    registry: Option<String>,
    name: String,
    tag: String,
    top_hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TagDeleteArgs {
    #[serde(default)]
    registry: Option<String>,
    name: String,
    tag: String,
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Handles one packaging tool call.
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
        "packaging_list" => {
            let request: ListArgs = decode_args(args)?;
            let registry = registry_of(router, request.registry.as_deref())?;
            let backend = router.backend(ctx).await?;
            let page = backend
                .package_list(
                    ctx,
                    &registry,
                    request.filter.as_deref(),
                    request.limit.unwrap_or(50),
                    request.continuation.as_deref(),
                )
                .await?;
            Ok(json!({"success": true, "result": page}))
        }
        "packaging_browse" => {
            let request: RevisionArgs = decode_args(args)?;
            let (package, hash) = package_of(router, &request.registry, &request.name, &request.top_hash)?;
            let backend = router.backend(ctx).await?;
            let (manifest, top_hash) =
                backend.package_manifest(ctx, &package, hash.as_ref()).await?;
            let entries: Vec<Value> = manifest
                .entries
                .iter()
                .map(|entry| json!({"logical_path": entry.logical_path, "size": entry.size}))
                .collect();
            Ok(json!({"success": true, "result": {
                "package": package.name,
                "top_hash": top_hash,
                "entries": entries,
            }}))
        }
        "packaging_manifest" => {
            let request: RevisionArgs = decode_args(args)?;
            let (package, hash) = package_of(router, &request.registry, &request.name, &request.top_hash)?;
            let backend = router.backend(ctx).await?;
            let (manifest, top_hash) =
                backend.package_manifest(ctx, &package, hash.as_ref()).await?;
            Ok(json!({"success": true, "result": {
                "top_hash": top_hash,
                "manifest": manifest,
            }}))
        }
        "packaging_versions" => {
            let request: VersionsArgs = decode_args(args)?;
            let (package, _) = package_of(router, &request.registry, &request.name, &None)?;
            let backend = router.backend(ctx).await?;
            let revisions = backend
                .package_versions_list(ctx, &package, request.limit.unwrap_or(50), request.with_tags)
                .await?;
            Ok(json!({"success": true, "result": {"revisions": revisions}}))
        }
        "packaging_create" | "packaging_update" => {
            let request: WriteArgs = decode_args(args)?;
            let (package, prior) =
                package_of(router, &request.registry, &request.name, &request.top_hash)?;
            let entries = request
                .entries
                .into_iter()
                .map(entry_of)
                .collect::<OpsResult<Vec<PackageEntryRequest>>>()?;
            let ctx = router.aws_context(ctx).await?;
            let backend = router.backend(&ctx).await?;
            let top_hash = if name == "packaging_create" {
                backend
                    .package_create_revision(
                        &ctx,
                        &package,
                        entries,
                        request.metadata.unwrap_or(Value::Null),
                        request.copy_mode,
                        request.message,
                    )
                    .await?
            } else {
                backend
                    .package_update_revision(
                        &ctx,
                        &package,
                        prior.as_ref(),
                        entries,
                        request.metadata,
                        request.copy_mode,
                        request.message,
                    )
                    .await?
            };
            Ok(json!({"success": true, "result": {"top_hash": top_hash}}))
        }
        "packaging_delete" => {
            let request: RevisionArgs = decode_args(args)?;
            let (package, hash) = package_of(router, &request.registry, &request.name, &request.top_hash)?;
            let ctx = router.aws_context(ctx).await?;
            let backend = router.backend(&ctx).await?;
            backend.package_delete(&ctx, &package, hash.as_ref()).await?;
            Ok(json!({"success": true, "result": {"deleted": package.name}}))
        }
        "packaging_tag_list" => {
            let request: TagListArgs = decode_args(args)?;
            let (package, _) = package_of(router, &request.registry, &request.name, &None)?;
            let backend = router.backend(ctx).await?;
            let tags = backend.tag_list(ctx, &package).await?;
            Ok(json!({"success": true, "result": {"tags": tags}}))
        }
        "packaging_tag_add" => {
            let request: TagAddArgs = decode_args(args)?;
            let (package, _) = package_of(router, &request.registry, &request.name, &None)?;
            let hash = digest_of(&request.top_hash)?;
            let ctx = router.aws_context(ctx).await?;
            let backend = router.backend(&ctx).await?;
            backend.tag_add(&ctx, &package, &request.tag, &hash).await?;
            Ok(json!({"success": true, "result": {"tag": request.tag, "top_hash": hash}}))
        }
        "packaging_tag_delete" => {
            let request: TagDeleteArgs = decode_args(args)?;
            let (package, _) = package_of(router, &request.registry, &request.name, &None)?;
            let ctx = router.aws_context(ctx).await?;
            let backend = router.backend(&ctx).await?;
            backend.tag_delete(&ctx, &package, &request.tag).await?;
            Ok(json!({"success": true, "result": {"deleted_tag": request.tag}}))
        }
        other => Err(OpsError::internal(format!("unroutable packaging action: {other}"))),
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the effective registry bucket for a request.
fn registry_of(router: &ToolRouter, explicit: Option<&str>) -> OpsResult<String> {
    let raw = explicit
        .map(str::to_string)
        .or_else(|| router.config().registry_url.clone())
        .ok_or_else(|| {
            OpsError::validation("no registry given and none configured")
                .with_fix_hint("pass `registry` or set QUILT_REGISTRY_URL")
        })?;
    Ok(raw.trim_start_matches("s3://").split('/').next().unwrap_or_default().to_string())
}

/// Builds the package reference and optional revision digest.
fn package_of(
    router: &ToolRouter,
    registry: &Option<String>,
    name: &str,
    top_hash: &Option<String>,
) -> OpsResult<(PackageRef, Option<HashDigest>)> {
    let registry = registry_of(router, registry.as_deref())?;
    let package = PackageRef::new(registry, name)?;
    let hash = top_hash.as_deref().map(digest_of).transpose()?;
    Ok((package, hash))
}

/// Parses a lowercase hex top-hash.
fn digest_of(raw: &str) -> OpsResult<HashDigest> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(OpsError::validation(format!("top_hash is not hex: {raw}")));
    }
    Ok(HashDigest {
        algorithm: HashAlgorithm::Sha256,
        value: trimmed.to_ascii_lowercase(),
    })
}

/// Converts one entry argument, requiring exactly one source.
fn entry_of(args: EntryArgs) -> OpsResult<PackageEntryRequest> {
    let source = match (args.source, args.text) {
        (Some(uri), None) => PackageEntrySource::S3Uri(uri),
        (None, Some(text)) => PackageEntrySource::Inline(text.into_bytes()),
        _ => {
            return Err(OpsError::validation(format!(
                "entry {} must set exactly one of source, text",
                args.logical_path
            )));
        }
    };
    Ok(PackageEntryRequest {
        logical_path: args.logical_path,
        source,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use quilt_mcp_core::ErrorKind;

    use super::digest_of;
    use super::entry_of;
    use super::EntryArgs;

    #[test]
    fn digests_must_be_hex() {
        assert!(digest_of("ABCDEF0123").is_ok());
        assert_eq!(digest_of("ABCDEF0123").expect("digest").value, "abcdef0123");
        assert!(digest_of("not-hex!").is_err());
        assert!(digest_of("").is_err());
    }

    #[test]
    fn entries_require_exactly_one_source() {
        let both = EntryArgs {
            logical_path: "a".to_string(),
            source: Some("s3://b/k".to_string()),
            text: Some("x".to_string()),
        };
        assert_eq!(entry_of(both).expect_err("must fail").kind, ErrorKind::ValidationFailed);
        let neither = EntryArgs {
            logical_path: "a".to_string(),
            source: None,
            text: None,
        };
        assert!(entry_of(neither).is_err());
    }
}
