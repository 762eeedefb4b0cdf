// quilt-mcp-core/src/search.rs
// ============================================================================
// Module: Search Model
// Description: Query, scope, and hit shapes for the unified search layer.
// Purpose: Provide one tagged hit union shared by every search backend.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`SearchQuery`] carries free text, a scope, an optional bucket filter,
//! a result-type selector, and a limit. Hits are a tagged union of package
//! and object hits carrying a normalized score and the backend that produced
//! them so the merge layer can rank across backends.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::hashing::HashDigest;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default result limit when the caller does not specify one.
pub const DEFAULT_SEARCH_LIMIT: usize = 50;
/// Maximum number of matched entries attached to a package hit.
pub const MAX_PACKAGE_HIT_ENTRIES: usize = 100;

// ============================================================================
// SECTION: Query Shapes
// ============================================================================

/// Search scope selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    /// Search a single bucket.
    Bucket,
    /// Search within one package's manifests and entries.
    Package,
    /// Search everything the caller may see.
    #[default]
    Global,
}

/// Result-type selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    /// Package hits only.
    Packages,
    /// Object hits only.
    Objects,
    /// Both packages and objects.
    #[default]
    Both,
}

/// Normalized unified search query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text query; `*` or empty means match-all.
    pub text: String,
    /// Search scope.
    #[serde(default)]
    pub scope: SearchScope,
    /// Normalized bucket filter; empty means no restriction.
    #[serde(default)]
    pub buckets: Vec<String>,
    /// Result-type selector.
    #[serde(default)]
    pub result_type: ResultType,
    /// Maximum number of hits to return.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

const fn default_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

impl SearchQuery {
    /// Returns true when the text matches everything.
    #[must_use]
    pub fn is_match_all(&self) -> bool {
        self.text.trim().is_empty() || self.text.trim() == "*"
    }
}

// ============================================================================
// SECTION: Backend Tags
// ============================================================================

/// Backend that produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchBackend {
    /// Catalog-fronted Elasticsearch.
    Elasticsearch,
    /// Catalog GraphQL search.
    Graphql,
    /// S3 listing fallback.
    S3,
    /// Athena analytical queries.
    Athena,
}

impl SearchBackend {
    /// Fixed cross-backend ranking weight.
    #[must_use]
    pub const fn weight(self) -> f64 {
        match self {
            Self::Elasticsearch => 1.0,
            Self::Graphql => 0.9,
            Self::S3 => 0.6,
            Self::Athena => 0.9,
        }
    }
}

// ============================================================================
// SECTION: Hits
// ============================================================================

/// A package-level search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageHit {
    /// Registry bucket holding the package.
    pub bucket: String,
    /// Package name.
    pub name: String,
    /// Revision the hit refers to, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_hash: Option<HashDigest>,
    /// Matched entries, capped at [`MAX_PACKAGE_HIT_ENTRIES`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_entries: Vec<String>,
}

/// An object-level search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectHit {
    /// Bucket holding the object.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Object size in bytes, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Last-modified timestamp in RFC 3339 form, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

impl ObjectHit {
    /// Returns the physical URI identifying this hit for de-duplication.
    #[must_use]
    pub fn physical_uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

/// Tagged union of search hits with ranking metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchHit {
    /// Package hit.
    Package {
        /// Normalized score in `[0, 1]` after backend weighting.
        score: f64,
        /// Backend that produced the hit.
        backend: SearchBackend,
        /// Package payload.
        #[serde(flatten)]
        hit: PackageHit,
    },
    /// Object hit.
    Object {
        /// Normalized score in `[0, 1]` after backend weighting.
        score: f64,
        /// Backend that produced the hit.
        backend: SearchBackend,
        /// Object payload.
        #[serde(flatten)]
        hit: ObjectHit,
    },
}

impl SearchHit {
    /// Returns the hit score.
    #[must_use]
    pub const fn score(&self) -> f64 {
        match self {
            Self::Package {
                score, ..
            }
            | Self::Object {
                score, ..
            } => *score,
        }
    }

    /// Returns the de-duplication identity for this hit.
    #[must_use]
    pub fn identity(&self) -> String {
        match self {
            Self::Package {
                hit, ..
            } => match &hit.top_hash {
                Some(top_hash) => format!("package:{}/{}@{}", hit.bucket, hit.name, top_hash),
                None => format!("package:{}/{}", hit.bucket, hit.name),
            },
            Self::Object {
                hit, ..
            } => format!("object:{}", hit.physical_uri()),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::ObjectHit;
    use super::PackageHit;
    use super::SearchBackend;
    use super::SearchHit;
    use super::SearchQuery;

    #[test]
    fn match_all_accepts_star_and_blank() {
        let query: SearchQuery = serde_json::from_value(serde_json::json!({"text": "*"}))
            .expect("query");
        assert!(query.is_match_all());
        let blank: SearchQuery = serde_json::from_value(serde_json::json!({"text": "  "}))
            .expect("query");
        assert!(blank.is_match_all());
        let real: SearchQuery = serde_json::from_value(serde_json::json!({"text": "rna"}))
            .expect("query");
        assert!(!real.is_match_all());
    }

    #[test]
    fn identity_distinguishes_object_and_package() {
        let object = SearchHit::Object {
            score: 0.5,
            backend: SearchBackend::S3,
            hit: ObjectHit {
                bucket: "b".to_string(),
                key: "k.csv".to_string(),
                size: None,
                modified: None,
            },
        };
        let package = SearchHit::Package {
            score: 0.5,
            backend: SearchBackend::Graphql,
            hit: PackageHit {
                bucket: "b".to_string(),
                name: "team/k".to_string(),
                top_hash: None,
                matched_entries: Vec::new(),
            },
        };
        assert_ne!(object.identity(), package.identity());
        assert_eq!(object.identity(), "object:s3://b/k.csv");
    }

    #[test]
    fn backend_weights_match_ranking_table() {
        assert_eq!(SearchBackend::Elasticsearch.weight(), 1.0);
        assert_eq!(SearchBackend::Graphql.weight(), 0.9);
        assert_eq!(SearchBackend::S3.weight(), 0.6);
    }
}
