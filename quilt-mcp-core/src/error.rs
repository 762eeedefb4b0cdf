// quilt-mcp-core/src/error.rs
// ============================================================================
// Module: Error Envelope
// Description: Stable error kinds and the uniform failure envelope.
// Purpose: Map every backend failure into one machine-readable shape.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every tool operation returns either a structured success payload or an
//! [`OpsError`] envelope. Low-level errors are mapped once at the backend
//! edge into a stable [`ErrorKind`]; the original cause is preserved for
//! diagnostics but never used for branching.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Error Kinds
// ============================================================================

/// Stable error kinds exposed verbatim in the failure envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// JWT malformed, expired, or signed with the wrong key.
    AuthInvalid,
    /// Strict mode with no usable credentials.
    AuthNoCredentials,
    /// AWS or the catalog refused the action.
    PermissionDenied,
    /// Package, object, database, or table absent.
    NotFound,
    /// Startup configuration rejected.
    ConfigInvalid,
    /// MCP protocol version header missing or unsupported.
    ProtocolMismatch,
    /// Unknown RPC method or tool action.
    MethodNotFound,
    /// Arguments violate the tool parameter schema.
    ValidationFailed,
    /// Deadline exceeded.
    Timeout,
    /// Backend 5xx or network failure.
    UpstreamUnavailable,
    /// Concurrent write conflict, e.g. a tag race.
    Conflict,
    /// Resource delete blocked by a live reference.
    InUse,
    /// Unexpected programming error.
    Internal,
}

impl ErrorKind {
    /// Returns true when a retry of the same request may succeed.
    #[must_use]
    pub const fn retriable(self) -> bool {
        matches!(self, Self::Timeout | Self::UpstreamUnavailable | Self::Conflict)
    }

    /// Returns the stable wire label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthInvalid => "AUTH_INVALID",
            Self::AuthNoCredentials => "AUTH_NO_CREDENTIALS",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::NotFound => "NOT_FOUND",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::ProtocolMismatch => "PROTOCOL_MISMATCH",
            Self::MethodNotFound => "METHOD_NOT_FOUND",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::Timeout => "TIMEOUT",
            Self::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            Self::Conflict => "CONFLICT",
            Self::InUse => "IN_USE",
            Self::Internal => "INTERNAL",
        }
    }
}

// ============================================================================
// SECTION: Failure Envelope
// ============================================================================

/// Uniform failure envelope for tool operations.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{}: {message}", .kind.as_str())]
pub struct OpsError {
    /// Stable error kind.
    pub kind: ErrorKind,
    /// One-sentence user-facing message.
    pub message: String,
    /// Optional cause chain, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cause: Vec<String>,
    /// Whether a retry of the same request may succeed.
    pub retriable: bool,
    /// Concrete remediation for actionable errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
    /// Tool names that may serve the caller better.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,
}

impl OpsError {
    /// Creates a new envelope with the kind's default retriability.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: Vec::new(),
            retriable: kind.retriable(),
            fix_hint: None,
            alternatives: Vec::new(),
        }
    }

    /// Returns a copy with a cause appended to the chain.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause.push(cause.into());
        self
    }

    /// Returns a copy with a remediation hint attached.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Returns a copy naming alternative tools.
    #[must_use]
    pub fn with_alternatives(mut self, tools: Vec<String>) -> Self {
        self.alternatives = tools;
        self
    }

    /// Shorthand for a validation failure.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationFailed, message)
    }

    /// Shorthand for a not-found failure.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Shorthand for an internal failure.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

/// Result alias for tool operations.
pub type OpsResult<T> = Result<T, OpsError>;

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::ErrorKind;
    use super::OpsError;

    #[test]
    fn retriable_kinds_are_exactly_timeout_upstream_conflict() {
        for kind in [ErrorKind::Timeout, ErrorKind::UpstreamUnavailable, ErrorKind::Conflict] {
            assert!(kind.retriable(), "{} must be retriable", kind.as_str());
        }
        for kind in [
            ErrorKind::AuthInvalid,
            ErrorKind::AuthNoCredentials,
            ErrorKind::PermissionDenied,
            ErrorKind::NotFound,
            ErrorKind::ConfigInvalid,
            ErrorKind::ProtocolMismatch,
            ErrorKind::MethodNotFound,
            ErrorKind::ValidationFailed,
            ErrorKind::InUse,
            ErrorKind::Internal,
        ] {
            assert!(!kind.retriable(), "{} must not be retriable", kind.as_str());
        }
    }

    #[test]
    fn envelope_serializes_stable_kind_labels() {
        let err = OpsError::new(ErrorKind::AuthInvalid, "token expired")
            .with_fix_hint("run `login` to refresh the token");
        let value = serde_json::to_value(&err).expect("serialize envelope");
        assert_eq!(value["kind"], "AUTH_INVALID");
        assert_eq!(value["retriable"], false);
        assert_eq!(value["fix_hint"], "run `login` to refresh the token");
        assert!(value.get("cause").is_none());
    }

    #[test]
    fn cause_chain_preserves_order() {
        let err = OpsError::new(ErrorKind::UpstreamUnavailable, "catalog unreachable")
            .with_cause("connect timeout")
            .with_cause("dns lookup failed");
        assert_eq!(err.cause, vec!["connect timeout", "dns lookup failed"]);
        assert!(err.retriable);
    }
}
