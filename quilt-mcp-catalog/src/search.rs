// quilt-mcp-catalog/src/search.rs
// ============================================================================
// Module: Catalog Search Backends
// Description: GraphQL and Elasticsearch-proxy search primitives.
// Purpose: Produce native-scored hits for the unified search layer.
// Dependencies: quilt-mcp-core, serde_json
// ============================================================================

//! ## Overview
//! Two catalog-backed search paths: the Enterprise GraphQL `searchPackages` /
//! `searchObjects` queries and the registry's Elasticsearch proxy at
//! `/api/search`. Both return hits carrying their backend's native score;
//! cross-backend normalization is the merge layer's job, not this one's.
//! A non-empty bucket filter is always pushed down to the backend.

// ============================================================================
// SECTION: Imports
// ============================================================================

use quilt_mcp_core::ObjectHit;
use quilt_mcp_core::OpsResult;
use quilt_mcp_core::PackageHit;
use quilt_mcp_core::ResultType;
use quilt_mcp_core::SearchBackend;
use quilt_mcp_core::SearchHit;
use quilt_mcp_core::SearchQuery;
use serde_json::json;
use serde_json::Value;

use crate::client::CatalogClient;

// ============================================================================
// SECTION: GraphQL Documents
// ============================================================================

const SEARCH_PACKAGES_QUERY: &str = r"query SearchPackages($buckets: [String!]!, $searchString: String!, $size: Int!) {
  searchPackages(buckets: $buckets, searchString: $searchString) {
    ... on PackagesSearchResultSet {
      total
      firstPage(size: $size) {
        hits { bucket name hash score }
      }
    }
    ... on EmptySearchResultSet { _ }
  }
}";

const SEARCH_OBJECTS_QUERY: &str = r"query SearchObjects($buckets: [String!]!, $searchString: String!, $size: Int!) {
  searchObjects(buckets: $buckets, searchString: $searchString) {
    ... on ObjectsSearchResultSet {
      total
      firstPage(size: $size) {
        hits { bucket key size lastModified score }
      }
    }
    ... on EmptySearchResultSet { _ }
  }
}";

const BUCKET_OBJECTS_QUERY: &str = r"query BucketObjects($bucket: String!, $filter: ObjectFilterInput, $first: Int!) {
  objects(bucket: $bucket, filter: $filter, first: $first) {
    edges {
      node { key size updated package { name topHash } }
    }
  }
}";

// ============================================================================
// SECTION: GraphQL Search
// ============================================================================

/// Runs a unified query against the catalog GraphQL search.
///
/// # Errors
///
/// Returns the mapped envelope when the catalog call fails.
pub async fn graphql_search(
    client: &CatalogClient,
    token: Option<&str>,
    query: &SearchQuery,
) -> OpsResult<Vec<SearchHit>> {
    let mut hits = Vec::new();
    let size = i64::try_from(query.limit).unwrap_or(i64::MAX);
    if query.result_type != ResultType::Objects {
        let variables = json!({
            "buckets": query.buckets,
            "searchString": query.text,
            "size": size,
        });
        let data = client.graphql(token, SEARCH_PACKAGES_QUERY, variables).await?;
        hits.extend(parse_package_hits(&data));
    }
    if query.result_type != ResultType::Packages {
        let variables = json!({
            "buckets": query.buckets,
            "searchString": query.text,
            "size": size,
        });
        let data = client.graphql(token, SEARCH_OBJECTS_QUERY, variables).await?;
        hits.extend(parse_object_hits(&data));
    }
    Ok(hits)
}

/// Lists objects in one bucket through the catalog GraphQL `objects` query.
///
/// # Errors
///
/// Returns the mapped envelope when the catalog call fails.
pub async fn graphql_bucket_objects(
    client: &CatalogClient,
    token: Option<&str>,
    bucket: &str,
    key_filter: Option<&str>,
    limit: usize,
) -> OpsResult<Vec<SearchHit>> {
    let filter = key_filter.map_or(Value::Null, |needle| json!({"key": {"wildcard": format!("*{needle}*")}}));
    let variables = json!({
        "bucket": bucket.trim_start_matches("s3://"),
        "filter": filter,
        "first": i64::try_from(limit).unwrap_or(i64::MAX),
    });
    let data = client.graphql(token, BUCKET_OBJECTS_QUERY, variables).await?;
    let edges = data
        .pointer("/objects/edges")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let bucket = bucket.trim_start_matches("s3://").to_string();
    Ok(edges
        .iter()
        .filter_map(|edge| edge.get("node"))
        .filter_map(|node| {
            let key = node.get("key")?.as_str()?.to_string();
            // Objects inside a package come back attributed to it; surface
            // those as package hits so package-scope collapse can group them.
            if let Some(name) = node.pointer("/package/name").and_then(Value::as_str) {
                return Some(SearchHit::Package {
                    score: 1.0,
                    backend: SearchBackend::Graphql,
                    hit: PackageHit {
                        bucket: bucket.clone(),
                        name: name.to_string(),
                        top_hash: node.pointer("/package/topHash").and_then(Value::as_str).map(
                            |value| quilt_mcp_core::HashDigest {
                                algorithm: quilt_mcp_core::HashAlgorithm::Sha256,
                                value: value.to_string(),
                            },
                        ),
                        matched_entries: vec![key],
                    },
                });
            }
            Some(SearchHit::Object {
                score: 1.0,
                backend: SearchBackend::Graphql,
                hit: ObjectHit {
                    bucket: bucket.clone(),
                    key,
                    size: node.get("size").and_then(Value::as_u64),
                    modified: node.get("updated").and_then(Value::as_str).map(str::to_string),
                },
            })
        })
        .collect())
}

fn parse_package_hits(data: &Value) -> Vec<SearchHit> {
    data.pointer("/searchPackages/firstPage/hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| {
                    let bucket = hit.get("bucket")?.as_str()?.to_string();
                    let name = hit.get("name")?.as_str()?.to_string();
                    Some(SearchHit::Package {
                        score: hit.get("score").and_then(Value::as_f64).unwrap_or(1.0),
                        backend: SearchBackend::Graphql,
                        hit: PackageHit {
                            bucket,
                            name,
                            top_hash: hit
                                .get("hash")
                                .and_then(Value::as_str)
                                .map(|value| quilt_mcp_core::HashDigest {
                                    algorithm: quilt_mcp_core::HashAlgorithm::Sha256,
                                    value: value.to_string(),
                                }),
                            matched_entries: Vec::new(),
                        },
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_object_hits(data: &Value) -> Vec<SearchHit> {
    data.pointer("/searchObjects/firstPage/hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| {
                    let bucket = hit.get("bucket")?.as_str()?.to_string();
                    let key = hit.get("key")?.as_str()?.to_string();
                    Some(SearchHit::Object {
                        score: hit.get("score").and_then(Value::as_f64).unwrap_or(1.0),
                        backend: SearchBackend::Graphql,
                        hit: ObjectHit {
                            bucket,
                            key,
                            size: hit.get("size").and_then(Value::as_u64),
                            modified: hit
                                .get("lastModified")
                                .and_then(Value::as_str)
                                .map(str::to_string),
                        },
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

// ============================================================================
// SECTION: Elasticsearch Proxy Search
// ============================================================================

/// Runs a unified query against the registry's Elasticsearch proxy.
///
/// Package documents index under `<bucket>_packages` with a `handle` field;
/// object documents index under `<bucket>` with `key`/`size`/`last_modified`.
///
/// # Errors
///
/// Returns the mapped envelope when the proxy call fails.
pub async fn elasticsearch_search(
    client: &CatalogClient,
    token: Option<&str>,
    query: &SearchQuery,
) -> OpsResult<Vec<SearchHit>> {
    let index = es_index_for(query);
    let params = [
        ("index", index),
        ("action", "search".to_string()),
        ("query", if query.is_match_all() { "*".to_string() } else { query.text.clone() }),
        ("size", query.limit.to_string()),
    ];
    let body = client.es_search(token, &params).await?;
    Ok(parse_es_hits(&body))
}

/// Builds the comma-joined index expression for the bucket filter.
fn es_index_for(query: &SearchQuery) -> String {
    if query.buckets.is_empty() {
        return match query.result_type {
            ResultType::Packages => "*_packages".to_string(),
            ResultType::Objects | ResultType::Both => "_all".to_string(),
        };
    }
    let mut indices = Vec::new();
    for bucket in &query.buckets {
        match query.result_type {
            ResultType::Packages => indices.push(format!("{bucket}_packages")),
            ResultType::Objects => indices.push(bucket.clone()),
            ResultType::Both => {
                indices.push(bucket.clone());
                indices.push(format!("{bucket}_packages"));
            }
        }
    }
    indices.join(",")
}

/// Parses the standard Elasticsearch response body into hits.
fn parse_es_hits(body: &Value) -> Vec<SearchHit> {
    let Some(hits) = body.pointer("/hits/hits").and_then(Value::as_array) else {
        return Vec::new();
    };
    hits.iter()
        .filter_map(|hit| {
            let index = hit.get("_index").and_then(Value::as_str).unwrap_or_default();
            let score = hit.get("_score").and_then(Value::as_f64).unwrap_or(0.0);
            let source = hit.get("_source")?;
            let bucket = index.trim_end_matches("_packages").to_string();
            if index.ends_with("_packages") || source.get("handle").is_some() {
                let name = source.get("handle").and_then(Value::as_str)?.to_string();
                Some(SearchHit::Package {
                    score,
                    backend: SearchBackend::Elasticsearch,
                    hit: PackageHit {
                        bucket,
                        name,
                        top_hash: source.get("hash").and_then(Value::as_str).map(|value| {
                            quilt_mcp_core::HashDigest {
                                algorithm: quilt_mcp_core::HashAlgorithm::Sha256,
                                value: value.to_string(),
                            }
                        }),
                        matched_entries: Vec::new(),
                    },
                })
            } else {
                let key = source.get("key").and_then(Value::as_str)?.to_string();
                Some(SearchHit::Object {
                    score,
                    backend: SearchBackend::Elasticsearch,
                    hit: ObjectHit {
                        bucket,
                        key,
                        size: source.get("size").and_then(Value::as_u64),
                        modified: source
                            .get("last_modified")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    },
                })
            }
        })
        .collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use quilt_mcp_core::ResultType;
    use quilt_mcp_core::SearchHit;
    use quilt_mcp_core::SearchQuery;
    use quilt_mcp_core::SearchScope;
    use serde_json::json;

    use super::es_index_for;
    use super::parse_es_hits;
    use super::parse_package_hits;

    fn query(buckets: Vec<String>, result_type: ResultType) -> SearchQuery {
        SearchQuery {
            text: "rna".to_string(),
            scope: SearchScope::Global,
            buckets,
            result_type,
            limit: 10,
        }
    }

    #[test]
    fn bucket_filter_shapes_the_index_expression() {
        let single = query(vec!["nextflowtower".to_string()], ResultType::Packages);
        assert_eq!(es_index_for(&single), "nextflowtower_packages");
        let both = query(vec!["b1".to_string()], ResultType::Both);
        assert_eq!(es_index_for(&both), "b1,b1_packages");
        let unfiltered = query(Vec::new(), ResultType::Objects);
        assert_eq!(es_index_for(&unfiltered), "_all");
    }

    #[test]
    fn es_hits_split_package_and_object_documents() {
        let body = json!({"hits": {"hits": [
            {"_index": "b1_packages", "_score": 2.5,
             "_source": {"handle": "team/data", "hash": "abc"}},
            {"_index": "b1", "_score": 1.5,
             "_source": {"key": "data/x.csv", "size": 42, "last_modified": "2026-01-01"}},
        ]}});
        let hits = parse_es_hits(&body);
        assert_eq!(hits.len(), 2);
        match &hits[0] {
            SearchHit::Package {
                hit, score, ..
            } => {
                assert_eq!(hit.name, "team/data");
                assert_eq!(hit.bucket, "b1");
                assert_eq!(*score, 2.5);
            }
            SearchHit::Object {
                ..
            } => panic!("expected package hit first"),
        }
        match &hits[1] {
            SearchHit::Object {
                hit, ..
            } => assert_eq!(hit.key, "data/x.csv"),
            SearchHit::Package {
                ..
            } => panic!("expected object hit second"),
        }
    }

    #[test]
    fn graphql_package_hits_parse_first_page() {
        let data = json!({"searchPackages": {"total": 1, "firstPage": {"hits": [
            {"bucket": "nextflowtower", "name": "team/run", "hash": "ff", "score": 3.0},
        ]}}});
        let hits = parse_package_hits(&data);
        assert_eq!(hits.len(), 1);
        match &hits[0] {
            SearchHit::Package {
                hit, ..
            } => assert_eq!(hit.bucket, "nextflowtower"),
            SearchHit::Object {
                ..
            } => panic!("expected package hit"),
        }
    }

    #[test]
    fn empty_result_set_yields_no_hits() {
        let data = json!({"searchPackages": {"_": true}});
        assert!(parse_package_hits(&data).is_empty());
    }
}
