// quilt-mcp-core/src/context.rs
// ============================================================================
// Module: Request Context
// Description: Per-request context and deployment-mode vocabulary.
// Purpose: Carry identity, credentials, and cancellation with each request.
// Dependencies: serde, tokio-util
// ============================================================================

//! ## Overview
//! A [`RequestContext`] is built by the transport for every request and is
//! immutable after construction. Credentials, client handles, and the
//! cancellation token travel with it; nothing is stashed in globals or
//! thread-locals.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::auth::AwsCredentialBundle;
use crate::auth::JwtClaims;

// ============================================================================
// SECTION: Deployment Vocabulary
// ============================================================================

/// Deployment preset expanding into a backend/transport pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    /// Stateless HTTP deployment against the catalog GraphQL API.
    Remote,
    /// Local stdio deployment against the catalog GraphQL API.
    #[default]
    Local,
    /// Legacy stdio deployment against the direct S3-native backend.
    Legacy,
}

/// Backend kind serving `QuiltOps`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Direct S3-native backend.
    Direct,
    /// Catalog GraphQL backend.
    Graphql,
}

/// Transport kind accepting MCP requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Framed JSON-RPC over stdin/stdout.
    Stdio,
    /// HTTP endpoint at `/mcp`.
    Http,
}

impl DeploymentMode {
    /// Expands the preset into its default backend/transport pair.
    #[must_use]
    pub const fn defaults(self) -> (BackendKind, TransportKind) {
        match self {
            Self::Remote => (BackendKind::Graphql, TransportKind::Http),
            Self::Local => (BackendKind::Graphql, TransportKind::Stdio),
            Self::Legacy => (BackendKind::Direct, TransportKind::Stdio),
        }
    }
}

// ============================================================================
// SECTION: Request Context
// ============================================================================

/// Per-request context, immutable after construction.
#[derive(Clone)]
pub struct RequestContext {
    /// Request identifier as supplied by the client.
    pub request_id: String,
    /// Deployment mode the server is running in.
    pub mode: DeploymentMode,
    /// Backend kind resolved for this request.
    pub backend: BackendKind,
    /// Raw bearer token for catalog pass-through; redacted from diagnostics.
    pub bearer: Option<String>,
    /// Decoded JWT claims when a valid bearer token was presented.
    pub claims: Option<JwtClaims>,
    /// AWS credential bundle resolved for this request.
    pub credentials: Option<AwsCredentialBundle>,
    /// Catalog base URL.
    pub catalog_url: Option<String>,
    /// Registry URL or bucket.
    pub registry_url: Option<String>,
    /// Cancellation token cancelled on client disconnect.
    pub cancel: CancellationToken,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("mode", &self.mode)
            .field("backend", &self.backend)
            .field("bearer", &self.bearer.as_deref().map(redact_token))
            .field("subject", &self.subject())
            .field("catalog_url", &self.catalog_url)
            .field("registry_url", &self.registry_url)
            .finish_non_exhaustive()
    }
}

/// Redacts a token to its first and last four characters.
#[must_use]
pub fn redact_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[.. 4].iter().collect();
    let tail: String = chars[chars.len() - 4 ..].iter().collect();
    format!("{head}…{tail}")
}

impl RequestContext {
    /// Builds a context with no caller identity attached.
    #[must_use]
    pub fn new(request_id: impl Into<String>, mode: DeploymentMode, backend: BackendKind) -> Self {
        Self {
            request_id: request_id.into(),
            mode,
            backend,
            bearer: None,
            claims: None,
            credentials: None,
            catalog_url: None,
            registry_url: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Returns a copy carrying the raw bearer token for catalog pass-through.
    #[must_use]
    pub fn with_bearer(mut self, bearer: impl Into<String>) -> Self {
        self.bearer = Some(bearer.into());
        self
    }

    /// Returns a copy with catalog and registry URLs set.
    #[must_use]
    pub fn with_urls(mut self, catalog_url: Option<String>, registry_url: Option<String>) -> Self {
        self.catalog_url = catalog_url;
        self.registry_url = registry_url;
        self
    }

    /// Returns a copy with decoded claims attached.
    #[must_use]
    pub fn with_claims(mut self, claims: JwtClaims) -> Self {
        self.claims = Some(claims);
        self
    }

    /// Returns a copy with resolved credentials attached.
    #[must_use]
    pub fn with_credentials(mut self, credentials: AwsCredentialBundle) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Returns a copy sharing the given cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the caller subject when claims are attached.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.claims.as_ref().map(|claims| claims.sub.as_str())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::redact_token;
    use super::BackendKind;
    use super::DeploymentMode;
    use super::RequestContext;
    use super::TransportKind;

    #[test]
    fn presets_expand_to_documented_pairs() {
        assert_eq!(
            DeploymentMode::Remote.defaults(),
            (BackendKind::Graphql, TransportKind::Http)
        );
        assert_eq!(
            DeploymentMode::Local.defaults(),
            (BackendKind::Graphql, TransportKind::Stdio)
        );
        assert_eq!(
            DeploymentMode::Legacy.defaults(),
            (BackendKind::Direct, TransportKind::Stdio)
        );
    }

    #[test]
    fn default_mode_is_local() {
        assert_eq!(DeploymentMode::default(), DeploymentMode::Local);
    }

    #[test]
    fn debug_output_redacts_the_bearer_token() {
        let ctx = RequestContext::new("1", DeploymentMode::Local, BackendKind::Graphql)
            .with_bearer("eyJhbGciOiJIUzI1NiJ9.payload.signature");
        let rendered = format!("{ctx:?}");
        assert!(!rendered.contains("payload"));
        assert!(rendered.contains("eyJh"));
    }

    #[test]
    fn redaction_keeps_only_edges() {
        assert_eq!(redact_token("short"), "****");
        let redacted = redact_token("abcdefghijklmnop");
        assert!(redacted.starts_with("abcd"));
        assert!(redacted.ends_with("mnop"));
        assert!(!redacted.contains("efgh"));
    }
}
