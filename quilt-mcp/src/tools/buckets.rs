// quilt-mcp/src/tools/buckets.rs
// ============================================================================
// Module: Bucket Tools
// Description: Bucket discovery and object read/write actions.
// Purpose: Expose the S3 data plane to MCP clients.
// Dependencies: quilt-mcp-aws, quilt-mcp-ops, base64
// ============================================================================

//! ## Overview
//! Object reads support version ids and byte ranges; a missing version is
//! `NOT_FOUND`, never `PERMISSION_DENIED`. Batch puts are not atomic: every
//! item reports its own outcome and the batch envelope stays `success` as
//! long as the batch itself ran.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::engine::general_purpose::STANDARD as Base64;
use base64::Engine;
use quilt_mcp_aws::PresignMethod;
use quilt_mcp_aws::PutItem;
use quilt_mcp_aws::PutItemSource;
use quilt_mcp_aws::S3Session;
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

/// Returns the buckets module descriptors.
#[must_use]
pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "buckets_list",
            module: "buckets",
            description: "List buckets visible to the caller",
            effect: ToolEffect::Read,
            input_schema: json!({"type": "object", "properties": {}}),
            requirements: &[],
        },
        ToolDescriptor {
            name: "buckets_objects_list",
            module: "buckets",
            description: "List objects in a bucket with prefix and pagination",
            effect: ToolEffect::Read,
            input_schema: json!({
                "type": "object",
                "required": ["bucket"],
                "properties": {
                    "bucket": {"type": "string", "description": "Bucket name"},
                    "prefix": {"type": "string", "description": "Key prefix filter"},
                    "continuation": {
                        "type": "string",
                        "description": "Continuation token from the previous page",
                    },
                    "max_keys": {"type": "integer", "description": "Page size, up to 1000"},
                },
            }),
            requirements: &["aws"],
        },
        ToolDescriptor {
            name: "buckets_object_info",
            module: "buckets",
            description: "Fetch object metadata without the body",
            effect: ToolEffect::Read,
            input_schema: object_schema(),
            requirements: &["aws"],
        },
        ToolDescriptor {
            name: "buckets_object_text",
            module: "buckets",
            description: "Read object content as UTF-8 text, optionally a version or range",
            effect: ToolEffect::Read,
            input_schema: object_read_schema(),
            requirements: &["aws"],
        },
        ToolDescriptor {
            name: "buckets_object_fetch",
            module: "buckets",
            description: "Read object bytes (base64), optionally a version or range",
            effect: ToolEffect::Read,
            input_schema: object_read_schema(),
            requirements: &["aws"],
        },
        ToolDescriptor {
            name: "buckets_objects_put",
            module: "buckets",
            description: "Write a batch of objects; per-item results, not atomic",
            effect: ToolEffect::Create,
            input_schema: json!({
                "type": "object",
                "required": ["bucket", "items"],
                "properties": {
                    "bucket": {"type": "string", "description": "Destination bucket"},
                    "items": {
                        "type": "array",
                        "description": "Items with key plus text, bytes_base64, or source_uri",
                        "items": {
                            "type": "object",
                            "required": ["key"],
                            "properties": {
                                "key": {"type": "string"},
                                "text": {"type": "string"},
                                "bytes_base64": {"type": "string"},
                                "source_uri": {"type": "string"},
                            },
                        },
                    },
                },
            }),
            requirements: &["aws"],
        },
        ToolDescriptor {
            name: "buckets_object_link",
            module: "buckets",
            description: "Produce a presigned URL for one object",
            effect: ToolEffect::Read,
            input_schema: json!({
                "type": "object",
                "required": ["bucket", "key"],
                "properties": {
                    "bucket": {"type": "string"},
                    "key": {"type": "string"},
                    "ttl_secs": {"type": "integer", "description": "Link lifetime, default 3600"},
                    "method": {"type": "string", "enum": ["get", "put"]},
                },
            }),
            requirements: &["aws"],
        },
    ]
}

fn object_schema() -> Value {
    json!({
        "type": "object",
        "required": ["bucket", "key"],
        "properties": {
            "bucket": {"type": "string"},
            "key": {"type": "string"},
            "version_id": {"type": "string", "description": "Specific object version"},
        },
    })
}

fn object_read_schema() -> Value {
    json!({
        "type": "object",
        "required": ["bucket", "key"],
        "properties": {
            "bucket": {"type": "string"},
            "key": {"type": "string"},
            "version_id": {"type": "string", "description": "Specific object version"},
            "range": {"type": "string", "description": "HTTP byte range, e.g. bytes=0-1023"},
        },
    })
}

// ============================================================================
// SECTION: Argument Shapes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ObjectsListArgs {
    bucket: String,
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default)]
    continuation: Option<String>,
    #[serde(default)]
    max_keys: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ObjectArgs {
    bucket: String,
    key: String,
    #[serde(default)]
    version_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ObjectReadArgs {
    bucket: String,
    key: String,
    #[serde(default)]
    version_id: Option<String>,
    #[serde(default)]
    range: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PutArgs {
    bucket: String,
    items: Vec<PutItemArgs>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PutItemArgs {
    key: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    bytes_base64: Option<String>,
    #[serde(default)]
    source_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LinkArgs {
    bucket: String,
    key: String,
    #[serde(default)]
    ttl_secs: Option<u64>,
    #[serde(default)]
    method: Option<PresignMethod>,
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Handles one buckets tool call.
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
        "buckets_list" => {
            let NoArgs {} = decode_args(args)?;
            let backend = router.backend(&router.aws_context(ctx).await?).await?;
            let buckets = backend.bucket_list(ctx).await?;
            Ok(json!({"success": true, "result": {"buckets": buckets}}))
        }
        "buckets_objects_list" => {
            let request: ObjectsListArgs = decode_args(args)?;
            let session = session(router, ctx).await?;
            let page = session
                .list(
                    &request.bucket,
                    request.prefix.as_deref(),
                    request.continuation.as_deref(),
                    request.max_keys,
                )
                .await?;
            Ok(json!({"success": true, "result": page}))
        }
        "buckets_object_info" => {
            let request: ObjectArgs = decode_args(args)?;
            let session = session(router, ctx).await?;
            let info = session
                .head(&request.bucket, &request.key, request.version_id.as_deref())
                .await?;
            Ok(json!({"success": true, "result": info}))
        }
        "buckets_object_text" => {
            let request: ObjectReadArgs = decode_args(args)?;
            let session = session(router, ctx).await?;
            let text = session
                .get_text(
                    &request.bucket,
                    &request.key,
                    request.version_id.as_deref(),
                    request.range.as_deref(),
                )
                .await?;
            Ok(json!({"success": true, "result": {"text": text}}))
        }
        "buckets_object_fetch" => {
            let request: ObjectReadArgs = decode_args(args)?;
            let session = session(router, ctx).await?;
            let bytes = session
                .get_bytes(
                    &request.bucket,
                    &request.key,
                    request.version_id.as_deref(),
                    request.range.as_deref(),
                )
                .await?;
            Ok(json!({"success": true, "result": {
                "bytes_base64": Base64.encode(&bytes),
                "size": bytes.len(),
            }}))
        }
        "buckets_objects_put" => {
            let request: PutArgs = decode_args(args)?;
            let items = request
                .items
                .into_iter()
                .map(put_item_of)
                .collect::<OpsResult<Vec<PutItem>>>()?;
            let session = session(router, ctx).await?;
            let outcomes = session.put_batch(&request.bucket, items).await?;
            Ok(json!({"success": true, "result": {"items": outcomes}}))
        }
        "buckets_object_link" => {
            let request: LinkArgs = decode_args(args)?;
            let session = session(router, ctx).await?;
            let ttl = std::time::Duration::from_secs(request.ttl_secs.unwrap_or(3600));
            let url = session
                .presign(
                    &request.bucket,
                    &request.key,
                    ttl,
                    request.method.unwrap_or(PresignMethod::Get),
                )
                .await?;
            Ok(json!({"success": true, "result": {"url": url}}))
        }
        other => Err(OpsError::internal(format!("unroutable buckets action: {other}"))),
    }
}

/// Builds the request-scoped S3 session after credential resolution.
async fn session(router: &ToolRouter, ctx: &RequestContext) -> OpsResult<S3Session> {
    let ctx = router.aws_context(ctx).await?;
    S3Session::for_request(&ctx, router.s3_options()).await
}

/// Converts one put item, requiring exactly one content source.
fn put_item_of(args: PutItemArgs) -> OpsResult<PutItem> {
    let source = match (args.text, args.bytes_base64, args.source_uri) {
        (Some(text), None, None) => PutItemSource::Text(text),
        (None, Some(encoded), None) => {
            let bytes = Base64.decode(encoded.as_bytes()).map_err(|_| {
                OpsError::validation(format!("item {} carries invalid base64", args.key))
            })?;
            PutItemSource::Bytes(bytes)
        }
        (None, None, Some(uri)) => PutItemSource::SourceUri(uri),
        _ => {
            return Err(OpsError::validation(format!(
                "item {} must set exactly one of text, bytes_base64, source_uri",
                args.key
            )));
        }
    };
    Ok(PutItem {
        key: args.key,
        source,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::put_item_of;
    use super::PutItemArgs;

    fn args(
        text: Option<&str>,
        bytes_base64: Option<&str>,
        source_uri: Option<&str>,
    ) -> PutItemArgs {
        PutItemArgs {
            key: "k".to_string(),
            text: text.map(str::to_string),
            bytes_base64: bytes_base64.map(str::to_string),
            source_uri: source_uri.map(str::to_string),
        }
    }

    #[test]
    fn exactly_one_source_is_required() {
        assert!(put_item_of(args(Some("x"), None, None)).is_ok());
        assert!(put_item_of(args(None, Some("eA=="), None)).is_ok());
        assert!(put_item_of(args(None, None, Some("s3://b/k"))).is_ok());
        assert!(put_item_of(args(None, None, None)).is_err());
        assert!(put_item_of(args(Some("x"), Some("eA=="), None)).is_err());
    }

    #[test]
    fn invalid_base64_is_a_validation_failure() {
        let err = put_item_of(args(None, Some("not base64!"), None)).expect_err("must fail");
        assert_eq!(err.kind, quilt_mcp_core::ErrorKind::ValidationFailed);
    }
}
