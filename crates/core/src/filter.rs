//! Canonical query predicate semantics.
//!
//! The two predicates are encoded exactly once, here; every adapter lowers
//! them into its backend's native primitives and the in-process reference
//! provider evaluates them directly via [`QueryFilter::matches`]:
//!
//! - int predicate: a document is included iff `doc.int_filter <= int_lte`.
//! - keyword predicate: a document is included iff **every** whitespace
//!   token of the filter value is present in the document's token set.
//!
//! Both predicates are ANDed when present. Backends whose native keyword
//! primitive cannot express all-tokens semantics implement the closest
//! available approximation; those deviations are documented on each adapter
//! rather than reconciled silently.

use crate::document::Document;

/// Optional predicates attached to an ANN query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    /// Include documents with `int_filter <= int_lte`.
    pub int_lte: Option<u32>,
    /// Include documents containing every whitespace token of this value.
    pub keyword_all: Option<String>,
}

impl QueryFilter {
    /// A filter with no predicates; matches every document.
    pub fn none() -> Self {
        Self::default()
    }

    /// Only the integer threshold predicate.
    pub fn int_lte(threshold: u32) -> Self {
        Self {
            int_lte: Some(threshold),
            ..Self::default()
        }
    }

    /// Only the keyword all-tokens predicate.
    pub fn keyword_all(tokens: impl Into<String>) -> Self {
        Self {
            int_lte: None,
            keyword_all: Some(tokens.into()),
        }
    }

    /// Builds a filter from the optional pair used by the sweep tables.
    pub fn from_parts(int_lte: Option<u32>, keyword_all: Option<&str>) -> Self {
        Self {
            int_lte,
            keyword_all: keyword_all.map(str::to_string),
        }
    }

    /// True when no predicate is set.
    pub fn is_empty(&self) -> bool {
        self.int_lte.is_none() && self.keyword_all.is_none()
    }

    /// The keyword predicate's tokens, empty when the predicate is unset.
    pub fn keyword_tokens(&self) -> Vec<&str> {
        self.keyword_all
            .as_deref()
            .map(|k| k.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Evaluates the canonical semantics against a document.
    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(threshold) = self.int_lte {
            if doc.int_filter > threshold {
                return false;
            }
        }
        if self.keyword_all.is_some() {
            let have = doc.keyword_tokens();
            if !self.keyword_tokens().iter().all(|t| have.contains(t)) {
                return false;
            }
        }
        true
    }
}
