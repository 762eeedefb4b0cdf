// quilt-mcp/src/credentials.rs
// ============================================================================
// Module: Credential Exchange
// Description: JWT-to-AWS credential chain with a single-flight cache.
// Purpose: Resolve request credentials without duplicate upstream fetches.
// Dependencies: quilt-mcp-catalog, quilt-mcp-core, tokio
// ============================================================================

//! ## Overview
//! The extraction chain is an ordered list of probes, not a fallback tower of
//! exceptions: embedded claims bundle, then catalog exchange, then ambient
//! credentials (outside strict mode). The first hit wins. Exchange results
//! cache by `(catalog, subject, token-hash)` with expiry
//! `min(jwt expiry, bundle expiry) − 5 minutes`; concurrent misses for one
//! key collapse to a single upstream fetch, and distinct subjects never
//! observe each other's entries because the subject is part of the key.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use quilt_mcp_catalog::CatalogClient;
use quilt_mcp_core::AwsCredentialBundle;
use quilt_mcp_core::ErrorKind;
use quilt_mcp_core::JwtClaims;
use quilt_mcp_core::OpsError;
use quilt_mcp_core::OpsResult;
use tokio::sync::Mutex;

use crate::auth::token_fingerprint;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Expiry buffer subtracted from cached credential lifetimes.
const EXPIRY_BUFFER_MINUTES: i64 = 5;

// ============================================================================
// SECTION: Cache
// ============================================================================

/// One cached bundle with its effective expiry.
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Cached bundle.
    bundle: AwsCredentialBundle,
    /// Instant after which the entry is stale.
    expires_at: DateTime<Utc>,
}

/// Single-flight credential cache keyed by `(catalog, subject, token-hash)`.
#[derive(Default)]
pub struct CredentialCache {
    /// Cached bundles.
    entries: Mutex<HashMap<String, CacheEntry>>,
    /// Per-key fetch locks collapsing concurrent misses.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CredentialCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the cache key for one caller identity.
    #[must_use]
    pub fn key(catalog: &str, subject: &str, token: &str) -> String {
        format!("{catalog}|{subject}|{}", token_fingerprint(token))
    }

    /// Returns the cached bundle for a key, when fresh.
    pub async fn get(&self, key: &str) -> Option<AwsCredentialBundle> {
        let entries = self.entries.lock().await;
        entries.get(key).filter(|entry| entry.expires_at > Utc::now()).map(|entry| {
            entry.bundle.clone()
        })
    }

    /// Returns the cached bundle or fetches it exactly once per key.
    ///
    /// Waiters on the same key share the outcome of the in-flight fetch.
    ///
    /// # Errors
    ///
    /// Propagates the fetch failure to every waiter that triggered it.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> OpsResult<AwsCredentialBundle>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = OpsResult<(AwsCredentialBundle, DateTime<Utc>)>>,
    {
        if let Some(bundle) = self.get(key).await {
            return Ok(bundle);
        }
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        let _guard = lock.lock().await;
        // A racing fetch may have filled the entry while we waited.
        if let Some(bundle) = self.get(key).await {
            return Ok(bundle);
        }
        let (bundle, expires_at) = fetch().await?;
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                bundle: bundle.clone(),
                expires_at,
            },
        );
        Ok(bundle)
    }

    /// Evicts every entry belonging to a subject (explicit logout).
    pub async fn evict_subject(&self, catalog: &str, subject: &str) {
        let prefix = format!("{catalog}|{subject}|");
        let mut entries = self.entries.lock().await;
        entries.retain(|key, _| !key.starts_with(&prefix));
    }

    /// Returns the number of live entries (expired ones excluded).
    pub async fn len(&self) -> usize {
        let now = Utc::now();
        let entries = self.entries.lock().await;
        entries.values().filter(|entry| entry.expires_at > now).count()
    }

    /// Returns true when no live entry exists.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Outcome of one probe in the extraction chain.
enum Probe {
    /// The probe produced a bundle.
    Hit(AwsCredentialBundle),
    /// The probe does not apply; try the next one.
    Skip,
}

/// Resolves request credentials through the ordered probe chain.
pub struct CredentialResolver {
    /// Catalog client for the exchange endpoint.
    catalog: Option<CatalogClient>,
    /// Shared process-wide cache.
    cache: Arc<CredentialCache>,
    /// Strict mode: ambient fallback is disallowed.
    require_jwt: bool,
}

impl CredentialResolver {
    /// Builds a resolver.
    #[must_use]
    pub fn new(
        catalog: Option<CatalogClient>,
        cache: Arc<CredentialCache>,
        require_jwt: bool,
    ) -> Self {
        Self {
            catalog,
            cache,
            require_jwt,
        }
    }

    /// Returns the shared cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<CredentialCache> {
        &self.cache
    }

    /// Resolves credentials for a request.
    ///
    /// `Ok(Some(bundle))` carries explicit credentials; `Ok(None)` means the
    /// ambient SDK chain applies (never in strict mode).
    ///
    /// # Errors
    ///
    /// Returns `AUTH_NO_CREDENTIALS` when strict mode exhausts the chain, or
    /// the exchange failure when the catalog call fails.
    pub async fn resolve(
        &self,
        claims: Option<&JwtClaims>,
        bearer: Option<&str>,
    ) -> OpsResult<Option<AwsCredentialBundle>> {
        match self.probe_embedded(claims) {
            Probe::Hit(bundle) => return Ok(Some(bundle)),
            Probe::Skip => {}
        }
        match self.probe_exchange(claims, bearer).await? {
            Probe::Hit(bundle) => return Ok(Some(bundle)),
            Probe::Skip => {}
        }
        if self.require_jwt {
            return Err(OpsError::new(
                ErrorKind::AuthNoCredentials,
                "no usable credentials in strict mode",
            )
            .with_fix_hint("present a bearer token signed by the configured secret"));
        }
        Ok(None)
    }

    /// Evicts the caller's cached credentials (explicit logout).
    pub async fn logout(&self, subject: &str) {
        if let Some(catalog) = &self.catalog {
            self.cache.evict_subject(catalog.catalog_url(), subject).await;
        }
    }

    /// Probe 1: bundle embedded in the validated claims.
    fn probe_embedded(&self, claims: Option<&JwtClaims>) -> Probe {
        match claims.and_then(|claims| claims.credentials.clone()) {
            Some(bundle) => Probe::Hit(bundle),
            None => Probe::Skip,
        }
    }

    /// Probe 2: catalog credential exchange, cached and single-flight.
    async fn probe_exchange(
        &self,
        claims: Option<&JwtClaims>,
        bearer: Option<&str>,
    ) -> OpsResult<Probe> {
        let (Some(catalog), Some(claims), Some(bearer)) = (&self.catalog, claims, bearer) else {
            return Ok(Probe::Skip);
        };
        let key = CredentialCache::key(catalog.catalog_url(), &claims.sub, bearer);
        let jwt_expiry = claims.expires_at();
        let bundle = self
            .cache
            .get_or_fetch(&key, || async {
                let bundle = catalog.exchange_credentials(bearer).await?;
                let mut expires_at = bundle.expiration;
                if let Some(jwt_expiry) = jwt_expiry {
                    expires_at = expires_at.min(jwt_expiry);
                }
                let expires_at = expires_at - Duration::minutes(EXPIRY_BUFFER_MINUTES);
                Ok((bundle, expires_at))
            })
            .await?;
        Ok(Probe::Hit(bundle))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use chrono::Duration;
    use chrono::Utc;
    use quilt_mcp_core::AwsCredentialBundle;

    use super::CredentialCache;
    use super::CredentialResolver;

    fn bundle(access_key: &str) -> AwsCredentialBundle {
        AwsCredentialBundle {
            access_key_id: access_key.to_string(),
            secret_access_key: "secret".to_string(),
            session_token: Some("token".to_string()),
            expiration: Utc::now() + Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn cache_keys_separate_subjects() {
        let a = CredentialCache::key("https://c", "alice", "token");
        let b = CredentialCache::key("https://c", "bob", "token");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn concurrent_misses_collapse_to_one_fetch() {
        let cache = Arc::new(CredentialCache::new());
        let fetches = Arc::new(AtomicUsize::new(0));
        let key = CredentialCache::key("https://c", "alice", "token");

        let mut handles = Vec::new();
        for _ in 0 .. 8 {
            let cache = Arc::clone(&cache);
            let fetches = Arc::clone(&fetches);
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch(&key, || async {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        // Give the other tasks time to pile onto the lock.
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok((bundle("AKIA"), Utc::now() + Duration::minutes(30)))
                    })
                    .await
            }));
        }
        for handle in handles {
            let bundle = handle.await.expect("join").expect("bundle");
            assert_eq!(bundle.access_key_id, "AKIA");
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn expired_entries_are_not_served() {
        let cache = CredentialCache::new();
        let key = CredentialCache::key("https://c", "alice", "token");
        let _ = cache
            .get_or_fetch(&key, || async {
                Ok((bundle("AKIA"), Utc::now() - Duration::minutes(1)))
            })
            .await
            .expect("bundle");
        assert!(cache.get(&key).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn eviction_removes_only_the_subject() {
        let cache = CredentialCache::new();
        for subject in ["alice", "bob"] {
            let key = CredentialCache::key("https://c", subject, "token");
            let _ = cache
                .get_or_fetch(&key, || async {
                    Ok((bundle("AKIA"), Utc::now() + Duration::minutes(30)))
                })
                .await
                .expect("bundle");
        }
        cache.evict_subject("https://c", "alice").await;
        assert_eq!(cache.len().await, 1);
        let bob = CredentialCache::key("https://c", "bob", "token");
        assert!(cache.get(&bob).await.is_some());
    }

    #[tokio::test]
    async fn strict_mode_without_probes_fails_closed() {
        let resolver =
            CredentialResolver::new(None, Arc::new(CredentialCache::new()), true);
        let err = resolver.resolve(None, None).await.expect_err("must fail");
        assert_eq!(err.kind, quilt_mcp_core::ErrorKind::AuthNoCredentials);
    }

    #[tokio::test]
    async fn embedded_bundle_wins_without_a_catalog() {
        let resolver =
            CredentialResolver::new(None, Arc::new(CredentialCache::new()), true);
        let claims = quilt_mcp_core::JwtClaims {
            sub: "alice".to_string(),
            iss: None,
            aud: None,
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
            roles: Vec::new(),
            buckets: Vec::new(),
            permissions: Vec::new(),
            credentials: Some(bundle("EMBEDDED")),
        };
        let resolved = resolver
            .resolve(Some(&claims), Some("raw-token"))
            .await
            .expect("resolved")
            .expect("bundle");
        assert_eq!(resolved.access_key_id, "EMBEDDED");
    }

    #[tokio::test]
    async fn ambient_fallback_applies_outside_strict_mode() {
        let resolver =
            CredentialResolver::new(None, Arc::new(CredentialCache::new()), false);
        let resolved = resolver.resolve(None, None).await.expect("resolved");
        assert!(resolved.is_none());
    }
}
