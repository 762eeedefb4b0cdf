// quilt-mcp-search/src/engine.rs
// ============================================================================
// Module: Search Engine
// Description: Parallel multi-backend fan-out with ranked merge.
// Purpose: Serve one query from the first non-empty successful backend.
// Dependencies: quilt-mcp-catalog, quilt-mcp-aws, tokio
// ============================================================================

//! ## Overview
//! The engine issues the primary backend and its fallback chain concurrently
//! with a per-backend timeout, then takes the first non-empty success in
//! priority order; a fallback answer sets `fallback_used`. Scores normalize
//! to `[0, 1]` inside each backend and are weighted across backends
//! (Elasticsearch 1.0, GraphQL 0.9, S3 0.6) before de-duplication.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use quilt_mcp_aws::S3Session;
use quilt_mcp_catalog::search::elasticsearch_search;
use quilt_mcp_catalog::search::graphql_search;
use quilt_mcp_catalog::CatalogClient;
use quilt_mcp_core::ErrorKind;
use quilt_mcp_core::ObjectHit;
use quilt_mcp_core::OpsError;
use quilt_mcp_core::OpsResult;
use quilt_mcp_core::PackageHit;
use quilt_mcp_core::RequestContext;
use quilt_mcp_core::ResultType;
use quilt_mcp_core::SearchBackend;
use quilt_mcp_core::SearchHit;
use quilt_mcp_core::SearchQuery;
use quilt_mcp_core::SearchScope;
use quilt_mcp_core::search::MAX_PACKAGE_HIT_ENTRIES;
use serde::Serialize;

use crate::classify::classify;
use crate::classify::extract_extensions;
use crate::classify::QueryClass;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Boost applied to manifest (package-document) matches in package scope.
const MANIFEST_BOOST: f64 = 2.0;
/// Tool suggested for analytical queries.
const ANALYTICAL_TOOL: &str = "athena_query_execute";

// ============================================================================
// SECTION: Response Shape
// ============================================================================

/// Unified search response.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    /// Ranked, de-duplicated hits.
    pub hits: Vec<SearchHit>,
    /// Number of hits returned.
    pub total: usize,
    /// Deterministic query classification.
    pub query_class: QueryClass,
    /// Backends that produced the returned hits.
    pub backends_used: Vec<SearchBackend>,
    /// True when a fallback answered instead of the primary.
    pub fallback_used: bool,
    /// Tool better suited to the query, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_tool: Option<String>,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Unified search engine over the catalog and S3 backends.
#[derive(Debug, Clone)]
pub struct SearchEngine {
    /// Catalog client when a catalog is configured.
    catalog: Option<CatalogClient>,
    /// Per-backend timeout.
    per_backend_timeout: Duration,
}

impl SearchEngine {
    /// Builds an engine.
    #[must_use]
    pub fn new(catalog: Option<CatalogClient>, per_backend_timeout: Duration) -> Self {
        Self {
            catalog,
            per_backend_timeout,
        }
    }

    /// Executes one unified search.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when every candidate backend fails.
    pub async fn search(
        &self,
        ctx: &RequestContext,
        s3: Option<&S3Session>,
        query: &SearchQuery,
    ) -> OpsResult<SearchResponse> {
        let query_class = classify(&query.text);

        // Analytical arithmetic needs SQL; point the caller at Athena rather
        // than guessing a translation.
        if query_class == QueryClass::Analytical {
            return Ok(SearchResponse {
                hits: Vec::new(),
                total: 0,
                query_class,
                backends_used: Vec::new(),
                fallback_used: false,
                suggested_tool: Some(ANALYTICAL_TOOL.to_string()),
            });
        }

        // Empty text in bucket scope lists the newest objects directly.
        if query.is_match_all() && query.scope == SearchScope::Bucket {
            let hits = self.s3_listing(s3, query, &[]).await?;
            return Ok(SearchResponse {
                total: hits.len(),
                hits,
                query_class,
                backends_used: vec![SearchBackend::S3],
                fallback_used: false,
                suggested_tool: None,
            });
        }

        let chain = backend_chain(query_class, query);
        let token = ctx.bearer.as_deref();
        // Primary and fallbacks run concurrently; priority decides the winner.
        let results: Vec<OpsResult<Vec<SearchHit>>> = match chain.as_slice() {
            [a] => vec![self.run_backend(*a, s3, query, token).await],
            [a, b] => {
                let (ra, rb) = tokio::join!(
                    self.run_backend(*a, s3, query, token),
                    self.run_backend(*b, s3, query, token),
                );
                vec![ra, rb]
            }
            [a, b, c] => {
                let (ra, rb, rc) = tokio::join!(
                    self.run_backend(*a, s3, query, token),
                    self.run_backend(*b, s3, query, token),
                    self.run_backend(*c, s3, query, token),
                );
                vec![ra, rb, rc]
            }
            _ => Vec::new(),
        };
        let attempts: Vec<_> = chain.iter().copied().zip(results).collect();

        let mut last_error: Option<OpsError> = None;
        for (index, (backend, result)) in attempts.into_iter().enumerate() {
            match result {
                Ok(hits) if !hits.is_empty() => {
                    let ranked = self.finish(query, hits);
                    return Ok(SearchResponse {
                        total: ranked.len(),
                        hits: ranked,
                        query_class,
                        backends_used: vec![backend],
                        fallback_used: index > 0,
                        suggested_tool: None,
                    });
                }
                Ok(_) => {}
                Err(err) => last_error = Some(err),
            }
        }

        // Every backend was empty or failed; empty is a valid answer unless
        // all candidates errored.
        match last_error {
            Some(err) if chain.len() == 1 => Err(err),
            _ => Ok(SearchResponse {
                hits: Vec::new(),
                total: 0,
                query_class,
                backends_used: Vec::new(),
                fallback_used: false,
                suggested_tool: None,
            }),
        }
    }

    /// Runs one backend under the per-backend timeout.
    async fn run_backend(
        &self,
        backend: SearchBackend,
        s3: Option<&S3Session>,
        query: &SearchQuery,
        token: Option<&str>,
    ) -> OpsResult<Vec<SearchHit>> {
        let work = async {
            match backend {
                SearchBackend::Elasticsearch => {
                    let catalog = self.catalog.as_ref().ok_or_else(no_catalog)?;
                    elasticsearch_search(catalog, token, query).await
                }
                SearchBackend::Graphql => {
                    let catalog = self.catalog.as_ref().ok_or_else(no_catalog)?;
                    graphql_search(catalog, token, query).await
                }
                SearchBackend::S3 => {
                    let extensions = extract_extensions(&query.text);
                    self.s3_listing(s3, query, &extensions).await
                }
                SearchBackend::Athena => Err(OpsError::new(
                    ErrorKind::ValidationFailed,
                    "analytical queries are served by the Athena tools",
                )
                .with_alternatives(vec![ANALYTICAL_TOOL.to_string()])),
            }
        };
        match tokio::time::timeout(self.per_backend_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(OpsError::new(
                ErrorKind::Timeout,
                format!("search backend timed out after {:?}", self.per_backend_timeout),
            )),
        }
    }

    /// Lists S3 objects as the fallback backend.
    async fn s3_listing(
        &self,
        s3: Option<&S3Session>,
        query: &SearchQuery,
        extensions: &[String],
    ) -> OpsResult<Vec<SearchHit>> {
        let Some(session) = s3 else {
            return Ok(Vec::new());
        };
        if query.buckets.is_empty() {
            // Without a bucket restriction there is nothing safe to list.
            return Ok(Vec::new());
        }
        let needle = if query.is_match_all() {
            None
        } else {
            Some(query.text.trim().to_ascii_lowercase())
        };
        let mut hits = Vec::new();
        for bucket in &query.buckets {
            let mut continuation: Option<String> = None;
            'bucket: loop {
                let page = session
                    .list(bucket, None, continuation.as_deref(), None)
                    .await?;
                for object in page.items {
                    let key_lower = object.key.to_ascii_lowercase();
                    if let Some(needle) = &needle {
                        if !key_lower.contains(needle.as_str()) {
                            continue;
                        }
                    }
                    if !extensions.is_empty()
                        && !extensions.iter().any(|ext| key_lower.ends_with(&format!(".{ext}")))
                    {
                        continue;
                    }
                    hits.push(SearchHit::Object {
                        score: 1.0,
                        backend: SearchBackend::S3,
                        hit: ObjectHit {
                            bucket: bucket.clone(),
                            key: object.key,
                            size: object.size,
                            modified: object.modified,
                        },
                    });
                    if hits.len() >= query.limit {
                        break 'bucket;
                    }
                }
                continuation = page.next_continuation;
                if continuation.is_none() {
                    break;
                }
            }
            if hits.len() >= query.limit {
                break;
            }
        }
        // Newest first for listings.
        hits.sort_by(|a, b| modified_of(b).cmp(&modified_of(a)));
        Ok(hits)
    }

    /// Applies package-scope collapse, normalization, dedup, and ranking.
    fn finish(&self, query: &SearchQuery, hits: Vec<SearchHit>) -> Vec<SearchHit> {
        let hits = if query.scope == SearchScope::Package && query.result_type == ResultType::Both
        {
            collapse_package_scope(hits)
        } else {
            hits
        };
        normalize_and_rank(hits, query.limit)
    }
}

fn no_catalog() -> OpsError {
    OpsError::new(ErrorKind::ConfigInvalid, "no catalog is configured for this backend")
        .with_fix_hint("set QUILT_CATALOG_URL")
}

// ============================================================================
// SECTION: Backend Selection
// ============================================================================

/// Returns the primary-then-fallback chain for a classified query.
fn backend_chain(class: QueryClass, query: &SearchQuery) -> Vec<SearchBackend> {
    match class {
        QueryClass::TextSearch => {
            vec![SearchBackend::Elasticsearch, SearchBackend::Graphql, SearchBackend::S3]
        }
        QueryClass::FileTypeFilter => vec![SearchBackend::Elasticsearch, SearchBackend::S3],
        QueryClass::MetadataPredicate => {
            vec![SearchBackend::Graphql, SearchBackend::Elasticsearch]
        }
        QueryClass::Analytical => {
            let _ = query;
            vec![SearchBackend::Athena]
        }
    }
}

// ============================================================================
// SECTION: Merge & Rank
// ============================================================================

/// Normalizes scores per backend, weights across backends, de-duplicates,
/// and ranks descending.
fn normalize_and_rank(hits: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    // Per-backend max for [0, 1] normalization.
    let mut max_by_backend: BTreeMap<&'static str, f64> = BTreeMap::new();
    for hit in &hits {
        let (backend, score) = backend_and_score(hit);
        let entry = max_by_backend.entry(backend_label(backend)).or_insert(0.0);
        if score > *entry {
            *entry = score;
        }
    }
    let mut best: BTreeMap<String, SearchHit> = BTreeMap::new();
    for mut hit in hits {
        let (backend, raw) = backend_and_score(&hit);
        let max = max_by_backend.get(backend_label(backend)).copied().unwrap_or(1.0);
        let normalized = if max > 0.0 { (raw / max) * backend.weight() } else { 0.0 };
        set_score(&mut hit, normalized);
        let identity = hit.identity();
        match best.get(&identity) {
            Some(existing) if existing.score() >= hit.score() => {}
            _ => {
                best.insert(identity, hit);
            }
        }
    }
    let mut ranked: Vec<SearchHit> = best.into_values().collect();
    ranked.sort_by(|a, b| {
        b.score().partial_cmp(&a.score()).unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(limit);
    ranked
}

/// Collapses entry hits into their parent packages, boosting manifest hits.
fn collapse_package_scope(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut packages: BTreeMap<String, (f64, SearchBackend, PackageHit)> = BTreeMap::new();
    for hit in hits {
        match hit {
            SearchHit::Package {
                score,
                backend,
                hit,
            } => {
                // Manifest matches carry no entry attribution and get boosted.
                let effective = if hit.matched_entries.is_empty() {
                    score * MANIFEST_BOOST
                } else {
                    score
                };
                let key = format!("{}/{}", hit.bucket, hit.name);
                match packages.get_mut(&key) {
                    Some((best_score, _, merged)) => {
                        if effective > *best_score {
                            *best_score = effective;
                        }
                        for entry in hit.matched_entries {
                            if merged.matched_entries.len() >= MAX_PACKAGE_HIT_ENTRIES {
                                break;
                            }
                            if !merged.matched_entries.contains(&entry) {
                                merged.matched_entries.push(entry);
                            }
                        }
                        if merged.top_hash.is_none() {
                            merged.top_hash = hit.top_hash;
                        }
                    }
                    None => {
                        let mut hit = hit;
                        hit.matched_entries.truncate(MAX_PACKAGE_HIT_ENTRIES);
                        packages.insert(key, (effective, backend, hit));
                    }
                }
            }
            // Entry hits without package attribution cannot be collapsed.
            SearchHit::Object {
                ..
            } => {}
        }
    }
    packages
        .into_values()
        .map(|(score, backend, hit)| SearchHit::Package {
            score,
            backend,
            hit,
        })
        .collect()
}

fn backend_and_score(hit: &SearchHit) -> (SearchBackend, f64) {
    match hit {
        SearchHit::Package {
            score,
            backend,
            ..
        }
        | SearchHit::Object {
            score,
            backend,
            ..
        } => (*backend, *score),
    }
}

fn backend_label(backend: SearchBackend) -> &'static str {
    match backend {
        SearchBackend::Elasticsearch => "elasticsearch",
        SearchBackend::Graphql => "graphql",
        SearchBackend::S3 => "s3",
        SearchBackend::Athena => "athena",
    }
}

fn set_score(hit: &mut SearchHit, value: f64) {
    match hit {
        SearchHit::Package {
            score, ..
        }
        | SearchHit::Object {
            score, ..
        } => *score = value,
    }
}

fn modified_of(hit: &SearchHit) -> String {
    match hit {
        SearchHit::Object {
            hit, ..
        } => hit.modified.clone().unwrap_or_default(),
        SearchHit::Package {
            ..
        } => String::new(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use quilt_mcp_core::ObjectHit;
    use quilt_mcp_core::PackageHit;
    use quilt_mcp_core::SearchBackend;
    use quilt_mcp_core::SearchHit;
    use quilt_mcp_core::SearchQuery;

    use super::backend_chain;
    use super::collapse_package_scope;
    use super::normalize_and_rank;
    use crate::classify::QueryClass;

    fn object(bucket: &str, key: &str, score: f64, backend: SearchBackend) -> SearchHit {
        SearchHit::Object {
            score,
            backend,
            hit: ObjectHit {
                bucket: bucket.to_string(),
                key: key.to_string(),
                size: None,
                modified: None,
            },
        }
    }

    fn package(
        bucket: &str,
        name: &str,
        score: f64,
        entries: Vec<&str>,
        backend: SearchBackend,
    ) -> SearchHit {
        SearchHit::Package {
            score,
            backend,
            hit: PackageHit {
                bucket: bucket.to_string(),
                name: name.to_string(),
                top_hash: None,
                matched_entries: entries.into_iter().map(str::to_string).collect(),
            },
        }
    }

    #[test]
    fn chains_follow_the_routing_table() {
        let query: SearchQuery =
            serde_json::from_value(serde_json::json!({"text": "x"})).expect("query");
        assert_eq!(
            backend_chain(QueryClass::TextSearch, &query),
            vec![SearchBackend::Elasticsearch, SearchBackend::Graphql, SearchBackend::S3]
        );
        assert_eq!(
            backend_chain(QueryClass::FileTypeFilter, &query),
            vec![SearchBackend::Elasticsearch, SearchBackend::S3]
        );
        assert_eq!(
            backend_chain(QueryClass::MetadataPredicate, &query),
            vec![SearchBackend::Graphql, SearchBackend::Elasticsearch]
        );
    }

    #[test]
    fn duplicate_hits_collapse_to_highest_score() {
        let hits = vec![
            object("b", "k.csv", 1.0, SearchBackend::S3),
            object("b", "k.csv", 4.0, SearchBackend::Elasticsearch),
            object("b", "other.csv", 2.0, SearchBackend::Elasticsearch),
        ];
        let ranked = normalize_and_rank(hits, 10);
        assert_eq!(ranked.len(), 2);
        // The ES copy of k.csv normalizes to 1.0 * 1.0 and wins over S3's 0.6.
        assert_eq!(ranked[0].identity(), "object:s3://b/k.csv");
        assert!((ranked[0].score() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cross_backend_weights_order_results() {
        let hits = vec![
            object("b", "from-s3.csv", 10.0, SearchBackend::S3),
            object("b", "from-gql.csv", 10.0, SearchBackend::Graphql),
        ];
        let ranked = normalize_and_rank(hits, 10);
        assert_eq!(ranked[0].identity(), "object:s3://b/from-gql.csv");
        assert!((ranked[0].score() - 0.9).abs() < f64::EPSILON);
        assert!((ranked[1].score() - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn limit_truncates_after_ranking() {
        let hits = (0 .. 20)
            .map(|i| object("b", &format!("k{i}.csv"), f64::from(i), SearchBackend::S3))
            .collect();
        let ranked = normalize_and_rank(hits, 5);
        assert_eq!(ranked.len(), 5);
    }

    #[test]
    fn package_scope_collapses_entries_and_boosts_manifests() {
        let hits = vec![
            // Manifest match: no entries, boosted by 2.0.
            package("b", "team/data", 1.0, vec![], SearchBackend::Elasticsearch),
            // Entry matches attributed to the same package.
            package("b", "team/data", 1.0, vec!["a.csv"], SearchBackend::Elasticsearch),
            package("b", "team/data", 0.5, vec!["b.csv"], SearchBackend::Elasticsearch),
            // A different package seen only through entries.
            package("b", "team/other", 0.8, vec!["c.csv"], SearchBackend::Elasticsearch),
        ];
        let collapsed = collapse_package_scope(hits);
        assert_eq!(collapsed.len(), 2);
        let data = collapsed
            .iter()
            .find(|hit| hit.identity().contains("team/data"))
            .expect("team/data hit");
        match data {
            SearchHit::Package {
                score,
                hit,
                ..
            } => {
                assert!((score - 2.0).abs() < f64::EPSILON);
                assert_eq!(hit.matched_entries.len(), 2);
            }
            SearchHit::Object {
                ..
            } => panic!("expected package hit"),
        }
    }

    #[test]
    fn entry_cap_is_one_hundred() {
        let entries: Vec<String> = (0 .. 150).map(|i| format!("e{i}.csv")).collect();
        let refs: Vec<&str> = entries.iter().map(String::as_str).collect();
        let hits = vec![package("b", "team/data", 1.0, refs, SearchBackend::Elasticsearch)];
        let collapsed = collapse_package_scope(hits);
        match &collapsed[0] {
            SearchHit::Package {
                hit, ..
            } => assert_eq!(hit.matched_entries.len(), 100),
            SearchHit::Object {
                ..
            } => panic!("expected package hit"),
        }
    }
}
