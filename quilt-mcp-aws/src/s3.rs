// quilt-mcp-aws/src/s3.rs
// ============================================================================
// Module: S3 Operations
// Description: Credentialed S3 sessions and bucket operations.
// Purpose: One construction chain, paginated listing, versioned reads,
//          batched writes, and presigned links.
// Dependencies: aws-config, aws-sdk-s3, quilt-mcp-core
// ============================================================================

//! ## Overview
//! The session chain is an ordered list, not a fallback tower: JWT-exchanged
//! credentials win, ambient credentials apply only outside strict mode, and a
//! configured proxy URL replaces the endpoint while signatures stay v4.
//! Batch writes are not atomic; each item reports its own outcome and only a
//! global failure short-circuits the batch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;
use std::time::SystemTime;

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use quilt_mcp_core::ErrorKind;
use quilt_mcp_core::OpsError;
use quilt_mcp_core::OpsResult;
use quilt_mcp_core::RequestContext;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default page size for object listings.
pub const DEFAULT_LIST_MAX_KEYS: i32 = 1000;
/// Provider name recorded on JWT-exchanged credentials.
const JWT_PROVIDER_NAME: &str = "quilt-jwt-exchange";

// ============================================================================
// SECTION: Session Construction
// ============================================================================

/// Process-wide S3 construction options.
#[derive(Debug, Clone, Default)]
pub struct S3Options {
    /// Optional proxy URL replacing the service endpoint.
    pub proxy_url: Option<String>,
    /// AWS profile for ambient credential fallback.
    pub profile: Option<String>,
    /// Strict mode: ambient credentials are disallowed.
    pub require_jwt: bool,
}

/// Request-scoped S3 session.
#[derive(Debug, Clone)]
pub struct S3Session {
    /// Underlying S3 client.
    client: Client,
}

/// Loads the shared AWS config following the credential chain: JWT bundle,
/// then ambient (refused in strict mode).
///
/// # Errors
///
/// Returns `AUTH_NO_CREDENTIALS` when strict mode leaves no usable
/// credentials.
pub async fn shared_config(
    ctx: &RequestContext,
    options: &S3Options,
) -> OpsResult<aws_config::SdkConfig> {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(profile) = &options.profile {
        loader = loader.profile_name(profile);
    }
    if let Some(bundle) = &ctx.credentials {
        let expiry: Option<SystemTime> = Some(bundle.expiration.into());
        let credentials = Credentials::new(
            bundle.access_key_id.clone(),
            bundle.secret_access_key.clone(),
            bundle.session_token.clone(),
            expiry,
            JWT_PROVIDER_NAME,
        );
        loader = loader.credentials_provider(credentials);
    } else if options.require_jwt {
        return Err(OpsError::new(
            ErrorKind::AuthNoCredentials,
            "strict mode requires JWT-exchanged credentials",
        )
        .with_fix_hint("present a bearer token signed by the configured secret"));
    }
    Ok(loader.load().await)
}

impl S3Session {
    /// Builds a session for the request following the credential chain.
    ///
    /// # Errors
    ///
    /// Returns `AUTH_NO_CREDENTIALS` when strict mode leaves no usable
    /// credentials.
    pub async fn for_request(ctx: &RequestContext, options: &S3Options) -> OpsResult<Self> {
        let shared = shared_config(ctx, options).await?;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(proxy) = &options.proxy_url {
            builder = builder.endpoint_url(proxy).force_path_style(true);
        }
        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }

    /// Wraps an existing client (tests and backends with custom config).
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self {
            client,
        }
    }

    /// Returns the underlying client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Enumerates buckets visible to the session's credentials.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when enumeration fails.
    pub async fn list_buckets(&self) -> OpsResult<Vec<String>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|err| map_sdk_error(err, "list buckets"))?;
        Ok(output
            .buckets()
            .iter()
            .filter_map(|bucket| bucket.name().map(str::to_string))
            .collect())
    }

    /// Lists one page of objects under a prefix.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the listing fails.
    pub async fn list(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation: Option<&str>,
        max_keys: Option<i32>,
    ) -> OpsResult<ObjectPage> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .max_keys(max_keys.unwrap_or(DEFAULT_LIST_MAX_KEYS));
        if let Some(prefix) = prefix {
            request = request.prefix(prefix);
        }
        if let Some(continuation) = continuation {
            request = request.continuation_token(continuation);
        }
        let output = request.send().await.map_err(|err| map_sdk_error(err, "list objects"))?;
        let items = output
            .contents()
            .iter()
            .map(|object| ObjectInfo {
                key: object.key().unwrap_or_default().to_string(),
                size: object.size().and_then(|size| u64::try_from(size).ok()),
                etag: object.e_tag().map(str::to_string),
                modified: object
                    .last_modified()
                    .and_then(|ts| ts.fmt(aws_sdk_s3::primitives::DateTimeFormat::DateTime).ok()),
                version_id: None,
            })
            .collect();
        Ok(ObjectPage {
            items,
            next_continuation: output.next_continuation_token().map(str::to_string),
        })
    }

    /// Fetches object metadata without the body.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` for missing keys or versions.
    pub async fn head(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> OpsResult<ObjectInfo> {
        let mut request = self.client.head_object().bucket(bucket).key(key);
        if let Some(version_id) = version_id {
            request = request.version_id(version_id);
        }
        let output = request.send().await.map_err(|err| map_sdk_error(err, "head object"))?;
        Ok(ObjectInfo {
            key: key.to_string(),
            size: output.content_length().and_then(|size| u64::try_from(size).ok()),
            etag: output.e_tag().map(str::to_string),
            modified: output
                .last_modified()
                .and_then(|ts| ts.fmt(aws_sdk_s3::primitives::DateTimeFormat::DateTime).ok()),
            version_id: output.version_id().map(str::to_string),
        })
    }

    /// Reads object bytes, optionally a specific version or byte range.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` for missing keys or versions, `PERMISSION_DENIED`
    /// when access is refused.
    pub async fn get_bytes(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        range: Option<&str>,
    ) -> OpsResult<Vec<u8>> {
        let mut request = self.client.get_object().bucket(bucket).key(key);
        if let Some(version_id) = version_id {
            request = request.version_id(version_id);
        }
        if let Some(range) = range {
            request = request.range(range);
        }
        let output = request.send().await.map_err(|err| map_sdk_error(err, "get object"))?;
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|err| {
                OpsError::new(ErrorKind::UpstreamUnavailable, "object body read failed")
                    .with_cause(err.to_string())
            })?
            .into_bytes();
        Ok(bytes.to_vec())
    }

    /// Reads object content as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the read fails.
    pub async fn get_text(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        range: Option<&str>,
    ) -> OpsResult<String> {
        let bytes = self.get_bytes(bucket, key, version_id, range).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Writes one object.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the write fails.
    pub async fn put_bytes(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> OpsResult<u64> {
        let size = bytes.len() as u64;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|err| map_sdk_error(err, "put object"))?;
        Ok(size)
    }

    /// Deletes one object.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the delete fails.
    pub async fn delete(&self, bucket: &str, key: &str) -> OpsResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, "delete object"))?;
        Ok(())
    }

    /// Server-side copies one object.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the copy fails.
    pub async fn copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> OpsResult<()> {
        self.client
            .copy_object()
            .copy_source(format!("{source_bucket}/{source_key}"))
            .bucket(dest_bucket)
            .key(dest_key)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, "copy object"))?;
        Ok(())
    }

    /// Writes a batch of items; the batch is not atomic.
    ///
    /// Per-item results are reported in input order. A short-circuit happens
    /// only for global failures, which the caller observes as an `Err`.
    ///
    /// # Errors
    ///
    /// This method itself only fails on empty batches; item failures are
    /// reported inside [`PutItemOutcome`].
    pub async fn put_batch(
        &self,
        bucket: &str,
        items: Vec<PutItem>,
    ) -> OpsResult<Vec<PutItemOutcome>> {
        if items.is_empty() {
            return Err(OpsError::validation("batch put requires at least one item"));
        }
        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            let result = match item.source {
                PutItemSource::Text(text) => {
                    self.put_bytes(bucket, &item.key, text.into_bytes()).await
                }
                PutItemSource::Bytes(bytes) => self.put_bytes(bucket, &item.key, bytes).await,
                PutItemSource::SourceUri(uri) => {
                    let location = quilt_mcp_core::package::S3Location::parse(&uri)?;
                    self.copy(&location.bucket, &location.key, bucket, &item.key)
                        .await
                        .map(|()| 0)
                }
            };
            outcomes.push(match result {
                Ok(size) => PutItemOutcome {
                    key: item.key,
                    size: Some(size),
                    error: None,
                },
                // A missing destination bucket fails every item identically;
                // short-circuit instead of repeating the failure.
                Err(err) if is_batch_fatal(&err) => return Err(err),
                Err(err) => PutItemOutcome {
                    key: item.key,
                    size: None,
                    error: Some(err),
                },
            });
        }
        Ok(outcomes)
    }

    /// Produces a presigned URL for one object.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when presigning fails.
    pub async fn presign(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
        method: PresignMethod,
    ) -> OpsResult<String> {
        let config = PresigningConfig::expires_in(ttl).map_err(|err| {
            OpsError::validation("presign ttl out of range").with_cause(err.to_string())
        })?;
        let url = match method {
            PresignMethod::Get => self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .presigned(config)
                .await
                .map_err(|err| map_sdk_error(err, "presign get"))?,
            PresignMethod::Put => self
                .client
                .put_object()
                .bucket(bucket)
                .key(key)
                .presigned(config)
                .await
                .map_err(|err| map_sdk_error(err, "presign put"))?,
        };
        Ok(url.uri().to_string())
    }
}

// ============================================================================
// SECTION: Shapes
// ============================================================================

/// Object metadata returned by listing and head operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Object key.
    pub key: String,
    /// Object size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Entity tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Last-modified timestamp in RFC 3339 form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    /// Version id when versioning applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

/// One page of an object listing with its restart token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectPage {
    /// Objects in this page.
    pub items: Vec<ObjectInfo>,
    /// Continuation token restarting the listing after this page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_continuation: Option<String>,
}

/// One item of a batch write.
#[derive(Debug, Clone)]
pub struct PutItem {
    /// Destination key.
    pub key: String,
    /// Content source.
    pub source: PutItemSource,
}

/// Content source for a batch write item.
#[derive(Debug, Clone)]
pub enum PutItemSource {
    /// Inline text content.
    Text(String),
    /// Inline binary content.
    Bytes(Vec<u8>),
    /// Server-side copy from an existing S3 URI.
    SourceUri(String),
}

/// Per-item result of a batch write.
#[derive(Debug, Clone, Serialize)]
pub struct PutItemOutcome {
    /// Destination key.
    pub key: String,
    /// Bytes written for inline sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Failure envelope when the item failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OpsError>,
}

/// HTTP method for a presigned URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresignMethod {
    /// Presigned download.
    Get,
    /// Presigned upload.
    Put,
}

// ============================================================================
// SECTION: Error Mapping
// ============================================================================

/// Maps an S3 SDK failure into the uniform envelope.
pub(crate) fn map_sdk_error<E, R>(
    err: aws_sdk_s3::error::SdkError<E, R>,
    operation: &str,
) -> OpsError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
{
    if matches!(&err, aws_sdk_s3::error::SdkError::TimeoutError(_)) {
        return OpsError::new(ErrorKind::Timeout, format!("{operation} timed out"));
    }
    let code = err.code().unwrap_or_default().to_string();
    let message = err.message().unwrap_or("request failed").to_string();
    let kind = classify_code(&code);
    OpsError::new(kind, format!("{operation} failed: {message}"))
        .with_cause(format!("{code}: {message}"))
}

/// Returns true when a per-item failure dooms the whole batch.
fn is_batch_fatal(err: &OpsError) -> bool {
    err.kind == ErrorKind::AuthNoCredentials
        || err.cause.iter().any(|cause| cause.contains("NoSuchBucket"))
}

/// Classifies an S3 error code into an error kind.
fn classify_code(code: &str) -> ErrorKind {
    match code {
        "NoSuchKey" | "NoSuchBucket" | "NoSuchVersion" | "InvalidVersionId" | "NotFound"
        | "404" => ErrorKind::NotFound,
        "AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "ExpiredToken" => {
            ErrorKind::PermissionDenied
        }
        "SlowDown" | "ServiceUnavailable" | "InternalError" | "RequestTimeout" => {
            ErrorKind::UpstreamUnavailable
        }
        _ => ErrorKind::UpstreamUnavailable,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use quilt_mcp_core::ErrorKind;

    use super::classify_code;

    #[test]
    fn version_errors_map_to_not_found_not_permission_denied() {
        assert_eq!(classify_code("NoSuchVersion"), ErrorKind::NotFound);
        assert_eq!(classify_code("InvalidVersionId"), ErrorKind::NotFound);
        assert_eq!(classify_code("NoSuchKey"), ErrorKind::NotFound);
    }

    #[test]
    fn access_denied_maps_to_permission_denied() {
        assert_eq!(classify_code("AccessDenied"), ErrorKind::PermissionDenied);
        assert_eq!(classify_code("ExpiredToken"), ErrorKind::PermissionDenied);
    }

    #[test]
    fn throttling_maps_to_retriable_upstream() {
        let kind = classify_code("SlowDown");
        assert_eq!(kind, ErrorKind::UpstreamUnavailable);
        assert!(kind.retriable());
    }
}
