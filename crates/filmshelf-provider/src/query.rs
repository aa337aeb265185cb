//! Search query parameters and the wildcard rule.

use filmshelf_core::types::ContentKind;
use serde::{Deserialize, Serialize};

/// Marker that asks the provider for prefix matching.
pub const WILDCARD: char = '*';

/// Shortest query text sent upstream without an explicit wildcard.
pub const MIN_QUERY_LEN: usize = 3;

/// A fully specified title search.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub year: Option<i32>,
    pub kind: Option<ContentKind>,
    /// 1-based page number.
    pub page: u32,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into().trim().to_string(),
            year: None,
            kind: None,
            page: 1,
        }
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_kind(mut self, kind: ContentKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    /// The search text as it should be sent upstream.
    ///
    /// Returns `None` when the text is too short to send: fewer than
    /// [`MIN_QUERY_LEN`] characters and no trailing [`WILDCARD`].
    pub fn upstream_text(&self) -> Option<String> {
        let text = self.text.trim();
        if text.ends_with(WILDCARD) {
            return Some(text.to_string());
        }
        if text.chars().count() < MIN_QUERY_LEN {
            return None;
        }
        Some(format!("{}{}", text, WILDCARD))
    }
}
