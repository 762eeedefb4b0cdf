// quilt-mcp/src/auth.rs
// ============================================================================
// Module: Auth Plane
// Description: Bearer extraction and HS256 JWT validation.
// Purpose: Fail-closed token validation with pluggable secret sources.
// Dependencies: jsonwebtoken, sha2, quilt-mcp-config, quilt-mcp-aws
// ============================================================================

//! ## Overview
//! Bearer extraction happens on every request; a missing token is only an
//! error in strict mode. A present token must be a well-formed HS256 JWS
//! signed with the configured secret, unexpired, carrying the pinned `kid`
//! when one is configured, and matching issuer/audience when set. Failures
//! surface as `AUTH_INVALID` with a machine-readable reason; a token is
//! never logged beyond its `kid`, subject, and first/last four characters.

// ============================================================================
// SECTION: Imports
// ============================================================================

use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::Validation;
use quilt_mcp_config::QuiltMcpConfig;
use quilt_mcp_core::ErrorKind;
use quilt_mcp_core::JwtClaims;
use quilt_mcp_core::OpsError;
use quilt_mcp_core::OpsResult;
use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Upper bound on the authorization header size.
const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Bearer Extraction
// ============================================================================

/// Extracts a bearer token from an `Authorization` header value.
///
/// Absence of the header is not an error here; strict-mode enforcement
/// happens at dispatch.
///
/// # Errors
///
/// Returns `AUTH_INVALID` for a malformed or oversized header.
pub fn extract_bearer(header: Option<&str>) -> OpsResult<Option<String>> {
    let Some(header) = header else {
        return Ok(None);
    };
    if header.len() > MAX_AUTH_HEADER_BYTES {
        return Err(auth_invalid("authorization header too large"));
    }
    let mut parts = header.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(auth_invalid("authorization header is not a bearer token"));
    }
    Ok(Some(token.to_string()))
}

/// Returns the SHA-256 fingerprint of a token for cache keys and audit.
#[must_use]
pub fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// HS256 JWT verifier with a pinned key id.
pub struct JwtVerifier {
    /// Decoding key derived from the shared secret.
    decoding: DecodingKey,
    /// Key id tokens must carry, when pinned.
    key_id: Option<String>,
    /// Expected issuer, when configured.
    issuer: Option<String>,
    /// Expected audience, when configured.
    audience: Option<String>,
}

impl JwtVerifier {
    /// Builds a verifier from a resolved shared secret.
    #[must_use]
    pub fn new(secret: &str, key_id: Option<String>) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            key_id,
            issuer: None,
            audience: None,
        }
    }

    /// Returns a copy enforcing an expected issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Returns a copy enforcing an expected audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Resolves the secret source and builds a verifier, when configured.
    ///
    /// The parameter-store path wins over the inline secret.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the parameter fetch fails.
    pub async fn from_config(config: &QuiltMcpConfig) -> OpsResult<Option<Self>> {
        let secret = match (&config.jwt_secret_parameter, &config.jwt_secret) {
            (Some(parameter), _) => Some(quilt_mcp_aws::fetch_parameter(parameter).await?),
            (None, Some(secret)) => Some(secret.clone()),
            (None, None) => None,
        };
        Ok(secret.map(|secret| Self::new(&secret, config.jwt_key_id.clone())))
    }

    /// Validates a compact JWS and returns its decoded claims.
    ///
    /// # Errors
    ///
    /// Returns `AUTH_INVALID` with a machine-readable reason for malformed,
    /// mis-keyed, expired, or mismatched tokens.
    pub fn verify(&self, token: &str) -> OpsResult<JwtClaims> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|_| auth_invalid("token is not a well-formed JWS"))?;
        if header.alg != Algorithm::HS256 {
            return Err(auth_invalid("token algorithm is not HS256"));
        }
        if let Some(expected) = &self.key_id {
            if header.kid.as_deref() != Some(expected.as_str()) {
                return Err(auth_invalid("token kid does not match the configured key id"));
            }
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        if let Some(audience) = &self.audience {
            validation.set_audience(&[audience]);
        } else {
            validation.validate_aud = false;
        }
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding, &validation)
            .map_err(|err| auth_invalid(reason_of(&err)))?;
        Ok(data.claims)
    }
}

/// Maps a jsonwebtoken failure to a stable reason label.
fn reason_of(err: &jsonwebtoken::errors::Error) -> &'static str {
    match err.kind() {
        JwtErrorKind::ExpiredSignature => "token expired",
        JwtErrorKind::InvalidSignature => "signature does not verify",
        JwtErrorKind::InvalidIssuer => "issuer mismatch",
        JwtErrorKind::InvalidAudience => "audience mismatch",
        JwtErrorKind::ImmatureSignature => "token not yet valid",
        _ => "token malformed",
    }
}

fn auth_invalid(reason: &str) -> OpsError {
    OpsError::new(ErrorKind::AuthInvalid, format!("bearer token rejected: {reason}"))
        .with_fix_hint("run `login` to refresh the token")
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use jsonwebtoken::EncodingKey;
    use jsonwebtoken::Header;
    use quilt_mcp_core::ErrorKind;
    use quilt_mcp_core::JwtClaims;

    use super::extract_bearer;
    use super::token_fingerprint;
    use super::JwtVerifier;

    const SECRET: &str = "unit-test-secret";

    fn claims(exp: i64) -> JwtClaims {
        JwtClaims {
            sub: "alice".to_string(),
            iss: None,
            aud: None,
            exp,
            roles: Vec::new(),
            buckets: Vec::new(),
            permissions: Vec::new(),
            credentials: None,
        }
    }

    fn sign(claims: &JwtClaims, secret: &str, kid: Option<&str>) -> String {
        let mut header = Header::default();
        header.kid = kid.map(str::to_string);
        jsonwebtoken::encode(&header, claims, &EncodingKey::from_secret(secret.as_bytes()))
            .expect("token")
    }

    fn far_future() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn extracts_bearer_and_rejects_other_schemes() {
        assert_eq!(extract_bearer(None).expect("ok"), None);
        assert_eq!(
            extract_bearer(Some("Bearer abc")).expect("ok"),
            Some("abc".to_string())
        );
        assert_eq!(
            extract_bearer(Some("bearer abc")).expect("ok"),
            Some("abc".to_string())
        );
        assert!(extract_bearer(Some("Basic abc")).is_err());
        assert!(extract_bearer(Some("Bearer ")).is_err());
    }

    #[test]
    fn valid_token_round_trips_claims() {
        let verifier = JwtVerifier::new(SECRET, None);
        let token = sign(&claims(far_future()), SECRET, None);
        let decoded = verifier.verify(&token).expect("claims");
        assert_eq!(decoded.sub, "alice");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let verifier = JwtVerifier::new(SECRET, None);
        let token = sign(&claims(far_future()), "other-secret", None);
        let err = verifier.verify(&token).expect_err("must fail");
        assert_eq!(err.kind, ErrorKind::AuthInvalid);
        assert!(err.message.contains("signature"));
    }

    #[test]
    fn expired_token_is_rejected_with_reason() {
        let verifier = JwtVerifier::new(SECRET, None);
        let token = sign(&claims(1_000_000), SECRET, None);
        let err = verifier.verify(&token).expect_err("must fail");
        assert_eq!(err.kind, ErrorKind::AuthInvalid);
        assert!(err.message.contains("expired"));
    }

    #[test]
    fn mismatched_kid_is_rejected_before_signature_checks() {
        let verifier = JwtVerifier::new(SECRET, Some("expected-kid".to_string()));
        let token = sign(&claims(far_future()), SECRET, Some("other-kid"));
        let err = verifier.verify(&token).expect_err("must fail");
        assert!(err.message.contains("kid"));
        let unkeyed = sign(&claims(far_future()), SECRET, None);
        assert!(verifier.verify(&unkeyed).is_err());
    }

    #[test]
    fn issuer_and_audience_are_enforced_when_configured() {
        let verifier = JwtVerifier::new(SECRET, None).with_issuer("quilt");
        let mut bad = claims(far_future());
        bad.iss = Some("not-quilt".to_string());
        let token = sign(&bad, SECRET, None);
        assert!(verifier.verify(&token).is_err());

        let mut good = claims(far_future());
        good.iss = Some("quilt".to_string());
        let token = sign(&good, SECRET, None);
        assert!(verifier.verify(&token).is_ok());
    }

    #[test]
    fn garbage_is_not_a_well_formed_jws() {
        let verifier = JwtVerifier::new(SECRET, None);
        let err = verifier.verify("not.a.token").expect_err("must fail");
        assert_eq!(err.kind, ErrorKind::AuthInvalid);
    }

    #[test]
    fn fingerprints_are_stable_hex() {
        let a = token_fingerprint("token");
        let b = token_fingerprint("token");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, token_fingerprint("other"));
    }
}
