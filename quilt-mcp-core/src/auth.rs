// quilt-mcp-core/src/auth.rs
// ============================================================================
// Module: Auth Model
// Description: JWT claim and AWS credential bundle shapes.
// Purpose: Carry decoded caller identity through the request context.
// Dependencies: serde, chrono
// ============================================================================

//! ## Overview
//! [`JwtClaims`] is the decoded payload of a validated catalog bearer token.
//! [`AwsCredentialBundle`] is the short-lived credential set obtained from the
//! claims themselves or from the catalog's credential-exchange endpoint.
//! Tokens are never carried here in full; the auth plane keeps only a hash.

// ============================================================================
// SECTION: Imports
// ============================================================================

use chrono::DateTime;
use chrono::Duration;
use chrono::TimeZone;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: JWT Claims
// ============================================================================

/// Decoded claims of a validated catalog JWT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject identifier.
    pub sub: String,
    /// Token issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Token audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Expiry as unix seconds.
    pub exp: i64,
    /// Catalog roles granted to the subject.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    /// Buckets the subject may see.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buckets: Vec<String>,
    /// Catalog permission scopes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    /// Short-lived credential bundle embedded by some deployments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<AwsCredentialBundle>,
}

impl JwtClaims {
    /// Returns the expiry as a UTC timestamp, when representable.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

// ============================================================================
// SECTION: Credential Bundle
// ============================================================================

/// Short-lived AWS credential bundle exchanged for a JWT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsCredentialBundle {
    /// AWS access key id.
    #[serde(rename = "AccessKeyId")]
    pub access_key_id: String,
    /// AWS secret access key.
    #[serde(rename = "SecretAccessKey")]
    pub secret_access_key: String,
    /// AWS session token.
    #[serde(rename = "SessionToken", default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    /// Bundle expiry.
    #[serde(rename = "Expiration")]
    pub expiration: DateTime<Utc>,
}

impl AwsCredentialBundle {
    /// Returns true when the bundle expires within the given buffer of `now`.
    #[must_use]
    pub fn expires_within(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        self.expiration <= now + buffer
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use chrono::TimeZone;
    use chrono::Utc;

    use super::AwsCredentialBundle;
    use super::JwtClaims;

    #[test]
    fn claims_decode_with_optional_fields_absent() {
        let claims: JwtClaims =
            serde_json::from_value(serde_json::json!({"sub": "alice", "exp": 1_900_000_000}))
                .expect("claims");
        assert_eq!(claims.sub, "alice");
        assert!(claims.roles.is_empty());
        assert!(claims.credentials.is_none());
        assert!(claims.expires_at().is_some());
    }

    #[test]
    fn bundle_decodes_catalog_wire_shape() {
        let bundle: AwsCredentialBundle = serde_json::from_value(serde_json::json!({
            "AccessKeyId": "AKIA",
            "SecretAccessKey": "secret",
            "SessionToken": "token",
            "Expiration": "2026-01-01T00:00:00Z",
        }))
        .expect("bundle");
        assert_eq!(bundle.access_key_id, "AKIA");
        let now = Utc.with_ymd_and_hms(2025, 12, 31, 23, 56, 0).single().expect("now");
        assert!(bundle.expires_within(now, Duration::minutes(5)));
        assert!(!bundle.expires_within(now, Duration::minutes(1)));
    }
}
