// quilt-mcp-search/src/filter.rs
// ============================================================================
// Module: Bucket Filter Normalization
// Description: Normalize `bucket`/`buckets` inputs into one list.
// Purpose: Guarantee one backend filter shape regardless of caller spelling.
// Dependencies: none beyond std
// ============================================================================

//! ## Overview
//! Callers may pass `bucket` (a single string), `buckets` (a list), both, or
//! neither. This layer produces one de-duplicated list with URI schemes and
//! trailing slashes stripped, so `bucket:"X"` and `buckets:["X"]` reach the
//! backend as the identical filter.

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Normalizes the caller's bucket inputs into one filter list.
#[must_use]
pub fn normalize_buckets(bucket: Option<&str>, buckets: Option<&[String]>) -> Vec<String> {
    let mut normalized = Vec::new();
    if let Some(single) = bucket {
        push_bucket(&mut normalized, single);
    }
    if let Some(many) = buckets {
        for entry in many {
            push_bucket(&mut normalized, entry);
        }
    }
    normalized
}

/// Cleans one bucket label and appends it if new.
fn push_bucket(list: &mut Vec<String>, raw: &str) {
    let cleaned = raw.trim().trim_start_matches("s3://").trim_end_matches('/').to_string();
    if !cleaned.is_empty() && !list.iter().any(|existing| existing == &cleaned) {
        list.push(cleaned);
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::normalize_buckets;

    #[test]
    fn singular_and_list_forms_produce_the_same_filter() {
        let single = normalize_buckets(Some("nextflowtower"), None);
        let listed = normalize_buckets(None, Some(&["nextflowtower".to_string()]));
        assert_eq!(single, listed);
        assert_eq!(single, vec!["nextflowtower"]);
    }

    #[test]
    fn schemes_and_slashes_are_stripped() {
        let normalized = normalize_buckets(Some("s3://my-bucket/"), None);
        assert_eq!(normalized, vec!["my-bucket"]);
    }

    #[test]
    fn duplicates_collapse_preserving_order() {
        let normalized = normalize_buckets(
            Some("a"),
            Some(&["b".to_string(), "a".to_string(), "s3://b".to_string()]),
        );
        assert_eq!(normalized, vec!["a", "b"]);
    }

    #[test]
    fn neither_input_yields_empty_filter() {
        assert!(normalize_buckets(None, None).is_empty());
        assert!(normalize_buckets(Some("  "), Some(&[])).is_empty());
    }
}
