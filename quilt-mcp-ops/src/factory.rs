// quilt-mcp-ops/src/factory.rs
// ============================================================================
// Module: Backend Factory
// Description: Per-request backend construction from the resolved mode.
// Purpose: Pick and wire the QuiltOps variant for each request.
// Dependencies: quilt-mcp-config, quilt-mcp-catalog, quilt-mcp-aws
// ============================================================================

//! ## Overview
//! The factory holds the process-wide pieces — the pooled catalog client and
//! the S3 construction options — and assembles a request-scoped backend from
//! the context's resolved backend kind. Credentials travel in the context;
//! the factory never consults globals.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use quilt_mcp_aws::S3Options;
use quilt_mcp_aws::S3Session;
use quilt_mcp_catalog::CatalogClient;
use quilt_mcp_config::QuiltMcpConfig;
use quilt_mcp_core::BackendKind;
use quilt_mcp_core::ErrorKind;
use quilt_mcp_core::OpsError;
use quilt_mcp_core::OpsResult;
use quilt_mcp_core::RequestContext;

use crate::direct::DirectBackend;
use crate::graphql::GraphqlBackend;
use crate::ops::QuiltOps;

// ============================================================================
// SECTION: Factory
// ============================================================================

/// Builds per-request backends from process-wide state.
#[derive(Clone)]
pub struct BackendFactory {
    /// Pooled catalog client when a catalog is configured.
    catalog: Option<CatalogClient>,
    /// S3 construction options.
    s3_options: S3Options,
    /// Per-backend search timeout.
    search_timeout: Duration,
}

impl BackendFactory {
    /// Builds a factory from the resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_INVALID` when the catalog client cannot be built.
    pub fn from_config(config: &QuiltMcpConfig) -> OpsResult<Self> {
        let catalog = match &config.catalog_url {
            Some(url) => Some(CatalogClient::new(
                url,
                config.registry_url.as_deref(),
                config.service_timeout(),
            )?),
            None => None,
        };
        Ok(Self {
            catalog,
            s3_options: S3Options {
                proxy_url: config.s3_proxy_url.clone(),
                profile: config.aws_profile.clone(),
                require_jwt: config.require_jwt,
            },
            search_timeout: config.service_timeout(),
        })
    }

    /// Returns the pooled catalog client, when configured.
    #[must_use]
    pub fn catalog(&self) -> Option<&CatalogClient> {
        self.catalog.as_ref()
    }

    /// Returns the S3 construction options.
    #[must_use]
    pub fn s3_options(&self) -> &S3Options {
        &self.s3_options
    }

    /// Builds the backend for one request.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_INVALID` when the resolved kind lacks its
    /// prerequisites, or `AUTH_NO_CREDENTIALS` in strict mode without a
    /// usable credential bundle.
    pub async fn for_request(&self, ctx: &RequestContext) -> OpsResult<QuiltOps> {
        match ctx.backend {
            BackendKind::Direct => {
                let registry = registry_bucket(ctx)?;
                let session = S3Session::for_request(ctx, &self.s3_options).await?;
                Ok(QuiltOps::Direct(DirectBackend::new(session, registry, self.search_timeout)))
            }
            BackendKind::Graphql => {
                let catalog = self
                    .catalog
                    .clone()
                    .ok_or_else(|| {
                        OpsError::new(
                            ErrorKind::ConfigInvalid,
                            "graphql backend requires a catalog URL",
                        )
                        .with_fix_hint("set QUILT_CATALOG_URL")
                    })?;
                // Staging is optional: reads work without AWS credentials.
                let session = S3Session::for_request(ctx, &self.s3_options).await.ok();
                Ok(QuiltOps::Graphql(GraphqlBackend::new(
                    catalog,
                    session,
                    self.search_timeout,
                )))
            }
        }
    }
}

/// Extracts the registry bucket from the context's registry URL.
fn registry_bucket(ctx: &RequestContext) -> OpsResult<String> {
    let raw = ctx.registry_url.as_deref().ok_or_else(|| {
        OpsError::new(ErrorKind::ConfigInvalid, "direct backend requires a registry URL")
            .with_fix_hint("set QUILT_REGISTRY_URL to an s3:// bucket")
    })?;
    let stripped = raw.trim_start_matches("s3://");
    let bucket = stripped.split('/').next().unwrap_or_default();
    if bucket.is_empty() {
        return Err(OpsError::new(
            ErrorKind::ConfigInvalid,
            format!("registry URL carries no bucket: {raw}"),
        ));
    }
    Ok(bucket.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use quilt_mcp_core::BackendKind;
    use quilt_mcp_core::DeploymentMode;
    use quilt_mcp_core::ErrorKind;
    use quilt_mcp_core::RequestContext;

    use super::registry_bucket;

    #[test]
    fn registry_bucket_strips_scheme_and_path() {
        let ctx = RequestContext::new("1", DeploymentMode::Legacy, BackendKind::Direct)
            .with_urls(None, Some("s3://my-registry/prefix".to_string()));
        assert_eq!(registry_bucket(&ctx).expect("bucket"), "my-registry");
    }

    #[test]
    fn missing_registry_url_is_config_invalid() {
        let ctx = RequestContext::new("1", DeploymentMode::Legacy, BackendKind::Direct);
        let err = registry_bucket(&ctx).expect_err("must fail");
        assert_eq!(err.kind, ErrorKind::ConfigInvalid);
    }
}
