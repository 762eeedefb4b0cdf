// quilt-mcp-config/src/config.rs
// ============================================================================
// Module: Configuration Resolution
// Description: Preset expansion, override merging, and strict validation.
// Purpose: Produce one validated QuiltMcpConfig per process start.
// Dependencies: quilt-mcp-core, serde
// ============================================================================

//! ## Overview
//! The deployment preset expands into a `(backend, transport)` pair; CLI and
//! environment overrides are merged in on top, explicit overrides winning.
//! Validation is fail-closed: a rejected configuration names the field that
//! caused the rejection so operators can fix it without reading source.

// ============================================================================
// SECTION: Imports
// ============================================================================

use quilt_mcp_core::BackendKind;
use quilt_mcp_core::DeploymentMode;
use quilt_mcp_core::ErrorKind;
use quilt_mcp_core::OpsError;
use quilt_mcp_core::TransportKind;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default outbound service timeout in seconds.
pub const DEFAULT_SERVICE_TIMEOUT_SECS: u64 = 60;
/// Default bind address for the HTTP transport.
pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8000";

/// Environment variable naming the deployment preset.
pub const ENV_DEPLOYMENT: &str = "QUILT_DEPLOYMENT";
/// Environment variable overriding the backend kind.
pub const ENV_BACKEND: &str = "QUILT_BACKEND";
/// Environment variable overriding the transport kind.
pub const ENV_TRANSPORT: &str = "QUILT_TRANSPORT";
/// Environment variable naming the catalog URL.
pub const ENV_CATALOG_URL: &str = "QUILT_CATALOG_URL";
/// Environment variable naming the registry URL.
pub const ENV_REGISTRY_URL: &str = "QUILT_REGISTRY_URL";
/// Environment variable naming the optional S3 proxy endpoint.
pub const ENV_S3_PROXY_URL: &str = "QUILT_S3_PROXY_URL";
/// Environment variable enabling strict JWT mode.
pub const ENV_REQUIRE_JWT: &str = "MCP_REQUIRE_JWT";
/// Environment variable holding the shared JWT secret.
pub const ENV_JWT_SECRET: &str = "MCP_JWT_SECRET";
/// Environment variable naming the parameter-store secret path.
pub const ENV_JWT_SECRET_PARAMETER: &str = "MCP_JWT_SECRET_PARAMETER";
/// Environment variable pinning the accepted JWT key id.
pub const ENV_JWT_KEY_ID: &str = "MCP_JWT_KID";
/// Environment variable overriding the outbound service timeout.
pub const ENV_SERVICE_TIMEOUT: &str = "SERVICE_TIMEOUT";
/// Environment variable naming the AWS profile for ambient credentials.
pub const ENV_AWS_PROFILE: &str = "AWS_PROFILE";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration rejection naming the offending field.
#[derive(Debug, Error)]
#[error("invalid configuration: {field}: {reason}")]
pub struct ConfigError {
    /// Field that caused the rejection.
    pub field: &'static str,
    /// Human-readable reason.
    pub reason: String,
}

impl ConfigError {
    /// Builds a rejection for a named field.
    #[must_use]
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl From<ConfigError> for OpsError {
    fn from(err: ConfigError) -> Self {
        OpsError::new(ErrorKind::ConfigInvalid, err.to_string())
            .with_fix_hint(format!("correct the `{}` setting", err.field))
    }
}

// ============================================================================
// SECTION: Overrides
// ============================================================================

/// Explicit overrides collected from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Deployment preset override.
    pub deployment: Option<DeploymentMode>,
    /// Backend kind override.
    pub backend: Option<BackendKind>,
    /// Transport kind override.
    pub transport: Option<TransportKind>,
    /// Catalog URL override.
    pub catalog_url: Option<String>,
    /// Registry URL override.
    pub registry_url: Option<String>,
    /// Strict-JWT mode override.
    pub require_jwt: Option<bool>,
    /// Outbound service timeout override in seconds.
    pub service_timeout_secs: Option<u64>,
    /// Suppress the startup banner.
    pub skip_banner: bool,
}

// ============================================================================
// SECTION: Resolved Configuration
// ============================================================================

/// Fully resolved and validated server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuiltMcpConfig {
    /// Deployment preset in effect.
    pub deployment: DeploymentMode,
    /// Backend kind serving `QuiltOps`.
    pub backend: BackendKind,
    /// Transport accepting MCP requests.
    pub transport: TransportKind,
    /// Catalog base URL; required for the GraphQL backend.
    pub catalog_url: Option<String>,
    /// Registry URL or bucket.
    pub registry_url: Option<String>,
    /// Strict mode: every tool call demands a validated JWT.
    pub require_jwt: bool,
    /// Shared JWT secret from the environment.
    pub jwt_secret: Option<String>,
    /// Parameter-store path of the JWT secret; wins over `jwt_secret`.
    pub jwt_secret_parameter: Option<String>,
    /// Key id tokens must carry in their `kid` header, when pinned.
    pub jwt_key_id: Option<String>,
    /// Outbound HTTP timeout in seconds.
    pub service_timeout_secs: u64,
    /// Optional S3 proxy endpoint replacing the service endpoint.
    pub s3_proxy_url: Option<String>,
    /// AWS profile for ambient credential fallback.
    pub aws_profile: Option<String>,
    /// HTTP bind address.
    pub bind: String,
    /// Suppress the startup banner.
    pub skip_banner: bool,
}

impl QuiltMcpConfig {
    /// Resolves configuration from CLI overrides and the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when resolution or validation fails.
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        Self::resolve_with(overrides, |name| std::env::var(name).ok())
    }

    /// Resolves configuration with an explicit environment lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when resolution or validation fails.
    pub fn resolve_with(
        overrides: &ConfigOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let deployment = match overrides.deployment {
            Some(mode) => mode,
            None => match env(ENV_DEPLOYMENT) {
                Some(raw) => parse_deployment(&raw)?,
                None => DeploymentMode::default(),
            },
        };
        let (preset_backend, preset_transport) = deployment.defaults();

        let backend = match overrides.backend {
            Some(backend) => backend,
            None => match env(ENV_BACKEND) {
                Some(raw) => parse_backend(&raw)?,
                None => preset_backend,
            },
        };
        let transport = match overrides.transport {
            Some(transport) => transport,
            None => match env(ENV_TRANSPORT) {
                Some(raw) => parse_transport(&raw)?,
                None => preset_transport,
            },
        };

        let require_jwt = match overrides.require_jwt {
            Some(value) => value,
            None => env(ENV_REQUIRE_JWT).map_or(false, |raw| parse_bool(&raw)),
        };
        let service_timeout_secs = match overrides.service_timeout_secs {
            Some(value) => value,
            None => match env(ENV_SERVICE_TIMEOUT) {
                Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                    ConfigError::new("service-timeout", format!("not a number: {raw}"))
                })?,
                None => DEFAULT_SERVICE_TIMEOUT_SECS,
            },
        };

        let config = Self {
            deployment,
            backend,
            transport,
            catalog_url: overrides.catalog_url.clone().or_else(|| env(ENV_CATALOG_URL)),
            registry_url: overrides.registry_url.clone().or_else(|| env(ENV_REGISTRY_URL)),
            require_jwt,
            jwt_secret: env(ENV_JWT_SECRET),
            jwt_secret_parameter: env(ENV_JWT_SECRET_PARAMETER),
            jwt_key_id: env(ENV_JWT_KEY_ID),
            service_timeout_secs,
            s3_proxy_url: env(ENV_S3_PROXY_URL),
            aws_profile: env(ENV_AWS_PROFILE),
            bind: DEFAULT_HTTP_BIND.to_string(),
            skip_banner: overrides.skip_banner,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deployment == DeploymentMode::Remote && self.transport == TransportKind::Stdio {
            return Err(ConfigError::new(
                "transport",
                "remote deployment requires the http transport",
            ));
        }
        if self.backend == BackendKind::Graphql && self.catalog_url.is_none() {
            return Err(ConfigError::new(
                "catalog-url",
                "graphql backend requires a catalog URL; set QUILT_CATALOG_URL",
            ));
        }
        if self.service_timeout_secs == 0 {
            return Err(ConfigError::new("service-timeout", "must be greater than zero"));
        }
        if self.require_jwt && self.jwt_secret.is_none() && self.jwt_secret_parameter.is_none() {
            return Err(ConfigError::new(
                "jwt-secret",
                "strict mode requires MCP_JWT_SECRET or MCP_JWT_SECRET_PARAMETER",
            ));
        }
        Ok(())
    }

    /// Returns the outbound call timeout.
    #[must_use]
    pub const fn service_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.service_timeout_secs)
    }
}

// ============================================================================
// SECTION: Parsers
// ============================================================================

/// Parses a deployment preset label.
fn parse_deployment(raw: &str) -> Result<DeploymentMode, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "remote" => Ok(DeploymentMode::Remote),
        "local" => Ok(DeploymentMode::Local),
        "legacy" => Ok(DeploymentMode::Legacy),
        other => Err(ConfigError::new("deployment", format!("unknown preset: {other}"))),
    }
}

/// Parses a backend kind label.
fn parse_backend(raw: &str) -> Result<BackendKind, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "direct" => Ok(BackendKind::Direct),
        "graphql" => Ok(BackendKind::Graphql),
        other => Err(ConfigError::new("backend", format!("unknown backend: {other}"))),
    }
}

/// Parses a transport kind label.
fn parse_transport(raw: &str) -> Result<TransportKind, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "stdio" => Ok(TransportKind::Stdio),
        "http" => Ok(TransportKind::Http),
        other => Err(ConfigError::new("transport", format!("unknown transport: {other}"))),
    }
}

/// Parses a permissive boolean environment value.
fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use quilt_mcp_core::BackendKind;
    use quilt_mcp_core::DeploymentMode;
    use quilt_mcp_core::TransportKind;

    use super::ConfigOverrides;
    use super::QuiltMcpConfig;
    use super::DEFAULT_SERVICE_TIMEOUT_SECS;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn default_resolution_is_local_graphql_stdio() {
        let env = env_of(&[("QUILT_CATALOG_URL", "https://demo.quiltdata.com")]);
        let config =
            QuiltMcpConfig::resolve_with(&ConfigOverrides::default(), env).expect("config");
        assert_eq!(config.deployment, DeploymentMode::Local);
        assert_eq!(config.backend, BackendKind::Graphql);
        assert_eq!(config.transport, TransportKind::Stdio);
        assert_eq!(config.service_timeout_secs, DEFAULT_SERVICE_TIMEOUT_SECS);
    }

    #[test]
    fn explicit_overrides_win_over_environment() {
        let env = env_of(&[
            ("QUILT_DEPLOYMENT", "remote"),
            ("QUILT_CATALOG_URL", "https://demo.quiltdata.com"),
        ]);
        let overrides = ConfigOverrides {
            deployment: Some(DeploymentMode::Legacy),
            backend: Some(BackendKind::Direct),
            ..ConfigOverrides::default()
        };
        let config = QuiltMcpConfig::resolve_with(&overrides, env).expect("config");
        assert_eq!(config.deployment, DeploymentMode::Legacy);
        assert_eq!(config.backend, BackendKind::Direct);
        assert_eq!(config.transport, TransportKind::Stdio);
    }

    #[test]
    fn remote_with_stdio_is_rejected_naming_transport() {
        let env = env_of(&[("QUILT_CATALOG_URL", "https://demo.quiltdata.com")]);
        let overrides = ConfigOverrides {
            deployment: Some(DeploymentMode::Remote),
            transport: Some(TransportKind::Stdio),
            ..ConfigOverrides::default()
        };
        let err = QuiltMcpConfig::resolve_with(&overrides, env).expect_err("must reject");
        assert_eq!(err.field, "transport");
    }

    #[test]
    fn graphql_backend_without_catalog_url_is_rejected() {
        let err = QuiltMcpConfig::resolve_with(&ConfigOverrides::default(), |_| None)
            .expect_err("must reject");
        assert_eq!(err.field, "catalog-url");
    }

    #[test]
    fn direct_backend_needs_no_catalog_url() {
        let overrides = ConfigOverrides {
            deployment: Some(DeploymentMode::Legacy),
            ..ConfigOverrides::default()
        };
        let config = QuiltMcpConfig::resolve_with(&overrides, |_| None).expect("config");
        assert_eq!(config.backend, BackendKind::Direct);
        assert!(config.catalog_url.is_none());
    }

    #[test]
    fn strict_mode_requires_a_secret_source() {
        let env = env_of(&[
            ("QUILT_CATALOG_URL", "https://demo.quiltdata.com"),
            ("MCP_REQUIRE_JWT", "true"),
        ]);
        let err = QuiltMcpConfig::resolve_with(&ConfigOverrides::default(), env)
            .expect_err("must reject");
        assert_eq!(err.field, "jwt-secret");

        let env = env_of(&[
            ("QUILT_CATALOG_URL", "https://demo.quiltdata.com"),
            ("MCP_REQUIRE_JWT", "true"),
            ("MCP_JWT_SECRET", "s"),
        ]);
        let config =
            QuiltMcpConfig::resolve_with(&ConfigOverrides::default(), env).expect("config");
        assert!(config.require_jwt);
    }

    #[test]
    fn service_timeout_parses_from_environment() {
        let env = env_of(&[
            ("QUILT_CATALOG_URL", "https://demo.quiltdata.com"),
            ("SERVICE_TIMEOUT", "15"),
        ]);
        let config =
            QuiltMcpConfig::resolve_with(&ConfigOverrides::default(), env).expect("config");
        assert_eq!(config.service_timeout_secs, 15);

        let env = env_of(&[
            ("QUILT_CATALOG_URL", "https://demo.quiltdata.com"),
            ("SERVICE_TIMEOUT", "soon"),
        ]);
        let err = QuiltMcpConfig::resolve_with(&ConfigOverrides::default(), env)
            .expect_err("must reject");
        assert_eq!(err.field, "service-timeout");
    }
}
