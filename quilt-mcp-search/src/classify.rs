// quilt-mcp-search/src/classify.rs
// ============================================================================
// Module: Query Classification
// Description: Deterministic rule-based free-text query classifier.
// Purpose: Route queries to the right backend without model inference.
// Dependencies: none beyond std
// ============================================================================

//! ## Overview
//! Classification is keyword- and token-based and fully deterministic: the
//! same text always yields the same class. Priority order is analytical,
//! metadata predicate, file-type filter, then plain text search, so a query
//! mentioning both an aggregate and an extension routes to Athena.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Keywords marking an analytical query.
const ANALYTICAL_KEYWORDS: &[&str] = &[
    "largest",
    "smallest",
    "biggest",
    "count",
    "total",
    "sum",
    "average",
    "mean",
    "aggregate",
    "group by",
    "summarize",
    "statistics",
    "larger than",
    "smaller than",
    "bigger than",
];

/// Keywords marking a metadata predicate.
const METADATA_KEYWORDS: &[&str] = &[
    "metadata",
    "meta.",
    "tag:",
    "tags:",
    "label:",
    "author:",
    "created in",
    "created by",
    "modified in",
    "property:",
];

/// File extensions recognized by the file-type rules.
const KNOWN_EXTENSIONS: &[&str] = &[
    "csv", "tsv", "json", "jsonl", "parquet", "txt", "pdf", "xlsx", "xls", "md", "yaml", "yml",
    "fastq", "bam", "vcf", "h5ad", "png", "tiff",
];

// ============================================================================
// SECTION: Query Class
// ============================================================================

/// Deterministic classification of a free-text query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryClass {
    /// Plain full-text search.
    TextSearch,
    /// Search restricted by file extension.
    FileTypeFilter,
    /// Search over user metadata predicates.
    MetadataPredicate,
    /// Aggregation or size/date arithmetic, served by Athena.
    Analytical,
}

/// Classifies a free-text query.
#[must_use]
pub fn classify(text: &str) -> QueryClass {
    let lowered = text.to_ascii_lowercase();
    if ANALYTICAL_KEYWORDS.iter().any(|keyword| lowered.contains(keyword)) {
        return QueryClass::Analytical;
    }
    if METADATA_KEYWORDS.iter().any(|keyword| lowered.contains(keyword)) {
        return QueryClass::MetadataPredicate;
    }
    if !extract_extensions(&lowered).is_empty() {
        return QueryClass::FileTypeFilter;
    }
    QueryClass::TextSearch
}

/// Extracts file extensions named by the query.
///
/// Recognized forms: `ext:csv`, `*.csv`, `.csv files`, and `csv files` for
/// a known extension list.
#[must_use]
pub fn extract_extensions(text: &str) -> Vec<String> {
    let lowered = text.to_ascii_lowercase();
    let mut extensions = Vec::new();
    let tokens: Vec<&str> = lowered
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '(' | ')'))
        .filter(|token| !token.is_empty())
        .collect();
    for (index, token) in tokens.iter().enumerate() {
        if let Some(ext) = token.strip_prefix("ext:") {
            push_extension(&mut extensions, ext);
            continue;
        }
        if let Some(ext) = token.strip_prefix("*.") {
            push_extension(&mut extensions, ext);
            continue;
        }
        let followed_by_files = tokens
            .get(index + 1)
            .is_some_and(|next| matches!(*next, "file" | "files" | "data"));
        if let Some(ext) = token.strip_prefix('.') {
            if followed_by_files || KNOWN_EXTENSIONS.contains(&ext) {
                push_extension(&mut extensions, ext);
            }
            continue;
        }
        if followed_by_files && KNOWN_EXTENSIONS.contains(token) {
            push_extension(&mut extensions, token);
        }
    }
    extensions
}

fn push_extension(extensions: &mut Vec<String>, ext: &str) {
    let cleaned: String =
        ext.chars().take_while(|c| c.is_ascii_alphanumeric()).collect::<String>();
    if !cleaned.is_empty() && !extensions.iter().any(|existing| existing == &cleaned) {
        extensions.push(cleaned);
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::classify;
    use super::extract_extensions;
    use super::QueryClass;

    #[test]
    fn classification_is_deterministic_and_prioritized() {
        assert_eq!(classify("largest csv files"), QueryClass::Analytical);
        assert_eq!(classify("packages created in 2024"), QueryClass::MetadataPredicate);
        assert_eq!(classify("find csv files"), QueryClass::FileTypeFilter);
        assert_eq!(classify("rna sequencing"), QueryClass::TextSearch);
        // Same input, same class.
        assert_eq!(classify("find csv files"), classify("find csv files"));
    }

    #[test]
    fn size_operators_are_analytical() {
        assert_eq!(classify("files larger than 100MB"), QueryClass::Analytical);
        assert_eq!(classify("count of objects"), QueryClass::Analytical);
    }

    #[test]
    fn extension_extraction_handles_all_forms() {
        assert_eq!(extract_extensions("ext:csv"), vec!["csv"]);
        assert_eq!(extract_extensions("*.parquet data"), vec!["parquet"]);
        assert_eq!(extract_extensions(".json files"), vec!["json"]);
        assert_eq!(extract_extensions("csv files please"), vec!["csv"]);
        assert!(extract_extensions("weather files").is_empty());
        assert!(extract_extensions("plain text query").is_empty());
    }

    #[test]
    fn duplicate_extensions_collapse() {
        assert_eq!(extract_extensions("csv files ext:csv *.csv"), vec!["csv"]);
    }
}
