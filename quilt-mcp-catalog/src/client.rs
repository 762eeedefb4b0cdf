// quilt-mcp-catalog/src/client.rs
// ============================================================================
// Module: Catalog HTTP Client
// Description: Pooled HTTP client for GraphQL, credential exchange, and config.
// Purpose: One process-wide client; per-request bearer tokens.
// Dependencies: quilt-mcp-core, reqwest, serde_json
// ============================================================================

//! ## Overview
//! The client is constructed once at startup with the configured service
//! timeout and shared across requests; bearer tokens are supplied per call.
//! GraphQL travels through the registry host (`demo.quiltdata.com` →
//! `demo-registry.quiltdata.com/graphql`), credential exchange through
//! `/api/auth/get_credentials`, and the public `config.json` needs no auth.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use quilt_mcp_core::AwsCredentialBundle;
use quilt_mcp_core::ErrorKind;
use quilt_mcp_core::OpsError;
use quilt_mcp_core::OpsResult;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// User agent sent on every catalog request.
const USER_AGENT: &str = concat!("quilt-mcp-rs/", env!("CARGO_PKG_VERSION"));
/// Credential exchange endpoint path on the registry host.
const CREDENTIALS_PATH: &str = "/api/auth/get_credentials";
/// GraphQL query listing visible bucket configurations.
const BUCKET_CONFIGS_QUERY: &str =
    "query BucketConfigs { bucketConfigs { name title description } }";

// ============================================================================
// SECTION: Catalog Client
// ============================================================================

/// Pooled HTTP client for one catalog deployment.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    /// Shared HTTP connection pool.
    http: reqwest::Client,
    /// Catalog base URL without trailing slash.
    catalog_url: String,
    /// Registry base URL without trailing slash.
    registry_url: String,
}

impl CatalogClient {
    /// Builds a catalog client with a fixed outbound timeout.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_INVALID` when the underlying client cannot be built.
    pub fn new(
        catalog_url: &str,
        registry_url: Option<&str>,
        timeout: Duration,
    ) -> OpsResult<Self> {
        let catalog_url = catalog_url.trim_end_matches('/').to_string();
        let registry_url = match registry_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => derive_registry_url(&catalog_url),
        };
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| {
                OpsError::new(ErrorKind::ConfigInvalid, "failed to build catalog http client")
                    .with_cause(err.to_string())
            })?;
        Ok(Self {
            http,
            catalog_url,
            registry_url,
        })
    }

    /// Returns the catalog base URL.
    #[must_use]
    pub fn catalog_url(&self) -> &str {
        &self.catalog_url
    }

    /// Returns the registry base URL.
    #[must_use]
    pub fn registry_url(&self) -> &str {
        &self.registry_url
    }

    /// Returns the GraphQL endpoint URL.
    #[must_use]
    pub fn graphql_url(&self) -> String {
        format!("{}/graphql", self.registry_url)
    }

    /// Executes a GraphQL document and returns the `data` object.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope on transport, status, or GraphQL errors.
    pub async fn graphql(
        &self,
        token: Option<&str>,
        query: &str,
        variables: Value,
    ) -> OpsResult<Value> {
        let mut request = self
            .http
            .post(self.graphql_url())
            .json(&json!({"query": query, "variables": variables}));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(map_status_error(status.as_u16(), "catalog graphql"));
        }
        let body: Value = response.json().await.map_err(map_transport_error)?;
        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let detail = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(OpsError::new(
                    ErrorKind::UpstreamUnavailable,
                    "catalog rejected the GraphQL request",
                )
                .with_cause(detail));
            }
        }
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }

    /// Exchanges a bearer token for a short-lived AWS credential bundle.
    ///
    /// # Errors
    ///
    /// Returns `AUTH_INVALID` on a 401, `PERMISSION_DENIED` on a 403, and
    /// the mapped envelope on transport failures.
    pub async fn exchange_credentials(&self, token: &str) -> OpsResult<AwsCredentialBundle> {
        let url = format!("{}{}", self.registry_url, CREDENTIALS_PATH);
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(map_status_error(status.as_u16(), "credential exchange"));
        }
        response.json::<AwsCredentialBundle>().await.map_err(|err| {
            OpsError::new(ErrorKind::UpstreamUnavailable, "credential exchange returned an unexpected shape")
                .with_cause(err.to_string())
        })
    }

    /// Fetches the catalog's public `config.json` (no auth required).
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope on transport or status failures.
    pub async fn public_config(&self) -> OpsResult<CatalogConfig> {
        let url = format!("{}/config.json", self.catalog_url);
        let response = self.http.get(url).send().await.map_err(map_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(map_status_error(status.as_u16(), "catalog config"));
        }
        let raw: RawCatalogConfig = response.json().await.map_err(|err| {
            OpsError::new(ErrorKind::UpstreamUnavailable, "catalog config.json has an unexpected shape")
                .with_cause(err.to_string())
        })?;
        Ok(CatalogConfig::from_raw(raw))
    }

    /// Lists the bucket configurations visible to the caller.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the query fails.
    pub async fn bucket_configs(&self, token: Option<&str>) -> OpsResult<Vec<BucketInfo>> {
        let data = self.graphql(token, BUCKET_CONFIGS_QUERY, json!({})).await?;
        let configs = data
            .get("bucketConfigs")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(configs
            .into_iter()
            .filter_map(|config| serde_json::from_value::<BucketInfo>(config).ok())
            .collect())
    }

    /// Sends a GET to the catalog's Elasticsearch proxy endpoint.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope on transport or status failures.
    pub async fn es_search(
        &self,
        token: Option<&str>,
        params: &[(&str, String)],
    ) -> OpsResult<Value> {
        let url = format!("{}/api/search", self.registry_url);
        let mut request = self.http.get(url).query(params);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(map_status_error(status.as_u16(), "search proxy"));
        }
        response.json().await.map_err(map_transport_error)
    }
}

// ============================================================================
// SECTION: Catalog Config
// ============================================================================

/// Wire shape of the public `config.json`.
#[derive(Debug, Deserialize)]
struct RawCatalogConfig {
    /// Deployment region.
    #[serde(default)]
    region: String,
    /// Registry URL for API calls.
    #[serde(rename = "registryUrl", default)]
    registry_url: String,
    /// Analytics bucket carrying the stack prefix.
    #[serde(rename = "analyticsBucket", default)]
    analytics_bucket: String,
}

/// Discovered catalog deployment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Deployment region.
    pub region: String,
    /// Registry URL for API calls.
    pub registry_url: String,
    /// Stack prefix derived from the analytics bucket name.
    pub stack_prefix: String,
    /// Tabulator data catalog name (`quilt-<stack-prefix>-tabulator`).
    pub tabulator_database: String,
}

impl CatalogConfig {
    fn from_raw(raw: RawCatalogConfig) -> Self {
        let stack_prefix = stack_prefix_of(&raw.analytics_bucket);
        let tabulator_database = format!("quilt-{stack_prefix}-tabulator");
        Self {
            region: raw.region,
            registry_url: raw.registry_url,
            stack_prefix,
            tabulator_database,
        }
    }
}

/// Derives the stack prefix from the analytics bucket name.
fn stack_prefix_of(analytics_bucket: &str) -> String {
    let lowered = analytics_bucket.to_ascii_lowercase();
    if let Some(pos) = lowered.find("-analyticsbucket") {
        return analytics_bucket[.. pos].to_string();
    }
    match analytics_bucket.split_once('-') {
        Some((prefix, _)) => prefix.to_string(),
        None => analytics_bucket.to_string(),
    }
}

// ============================================================================
// SECTION: Bucket Info
// ============================================================================

/// Bucket configuration visible to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    /// Bucket name.
    pub name: String,
    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Description text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ============================================================================
// SECTION: URL Derivation
// ============================================================================

/// Derives the registry URL from a catalog URL by suffixing the first host
/// label with `-registry` (`demo.quiltdata.com` → `demo-registry.quiltdata.com`).
#[must_use]
pub fn derive_registry_url(catalog_url: &str) -> String {
    let Some((scheme, rest)) = catalog_url.split_once("://") else {
        return catalog_url.to_string();
    };
    match rest.split_once('.') {
        Some((first, remainder)) => format!("{scheme}://{first}-registry.{remainder}"),
        None => catalog_url.to_string(),
    }
}

// ============================================================================
// SECTION: Error Mapping
// ============================================================================

/// Maps a reqwest failure into the uniform envelope.
pub(crate) fn map_transport_error(err: reqwest::Error) -> OpsError {
    if err.is_timeout() {
        OpsError::new(ErrorKind::Timeout, "catalog request timed out").with_cause(err.to_string())
    } else {
        OpsError::new(ErrorKind::UpstreamUnavailable, "catalog unreachable")
            .with_cause(err.to_string())
    }
}

/// Maps an HTTP status into the uniform envelope.
pub(crate) fn map_status_error(status: u16, operation: &str) -> OpsError {
    match status {
        401 => OpsError::new(ErrorKind::AuthInvalid, format!("{operation} rejected the bearer token"))
            .with_fix_hint("run `login` to refresh the token"),
        403 => OpsError::new(ErrorKind::PermissionDenied, format!("{operation} refused the action")),
        404 => OpsError::new(ErrorKind::NotFound, format!("{operation} endpoint not found")),
        405 => OpsError::new(
            ErrorKind::UpstreamUnavailable,
            format!("{operation} endpoint does not accept this method on this deployment"),
        ),
        status if status >= 500 => OpsError::new(
            ErrorKind::UpstreamUnavailable,
            format!("{operation} failed upstream ({status})"),
        ),
        status => OpsError::new(
            ErrorKind::UpstreamUnavailable,
            format!("{operation} returned unexpected status {status}"),
        ),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use quilt_mcp_core::ErrorKind;

    use super::derive_registry_url;
    use super::map_status_error;
    use super::stack_prefix_of;
    use super::CatalogClient;

    #[test]
    fn registry_url_derivation_suffixes_first_label() {
        assert_eq!(
            derive_registry_url("https://demo.quiltdata.com"),
            "https://demo-registry.quiltdata.com"
        );
        assert_eq!(
            derive_registry_url("https://nightly.quilttest.com"),
            "https://nightly-registry.quilttest.com"
        );
    }

    #[test]
    fn explicit_registry_url_wins_over_derivation() {
        let client = CatalogClient::new(
            "https://demo.quiltdata.com/",
            Some("https://registry.internal/"),
            std::time::Duration::from_secs(5),
        )
        .expect("client");
        assert_eq!(client.registry_url(), "https://registry.internal");
        assert_eq!(client.graphql_url(), "https://registry.internal/graphql");
    }

    #[test]
    fn stack_prefix_handles_analytics_bucket_forms() {
        assert_eq!(stack_prefix_of("acme-analyticsbucket-123"), "acme");
        assert_eq!(stack_prefix_of("acme-prod"), "acme");
        assert_eq!(stack_prefix_of("acme"), "acme");
    }

    #[test]
    fn status_mapping_distinguishes_auth_and_upstream() {
        assert_eq!(map_status_error(401, "x").kind, ErrorKind::AuthInvalid);
        assert_eq!(map_status_error(403, "x").kind, ErrorKind::PermissionDenied);
        assert_eq!(map_status_error(404, "x").kind, ErrorKind::NotFound);
        assert_eq!(map_status_error(405, "x").kind, ErrorKind::UpstreamUnavailable);
        assert_eq!(map_status_error(503, "x").kind, ErrorKind::UpstreamUnavailable);
        assert!(map_status_error(503, "x").retriable);
    }
}
