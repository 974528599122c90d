use crate::models::RawItem;
use serde::{Deserialize, Serialize};

/// Search parameters for API-based sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    /// Free-text query
    pub search_text: String,
    /// Items requested per page
    pub per_page: u32,
    /// Sort order understood by the source
    pub order: String,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            search_text: "lego".to_string(),
            per_page: 96,
            order: "newest_first".to_string(),
        }
    }
}

/// Why a source stopped producing pages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationSignal {
    /// The cursor is past the last valid page.
    Exhausted,
    /// The source throttled us; what we have is kept.
    RateLimited,
    /// Anything else; the source's run counts as failed.
    Fatal(String),
}

/// One page of raw items, optionally carrying the reason to stop after it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<RawItem>,
    pub signal: Option<TerminationSignal>,
}

impl Page {
    pub fn items(items: Vec<RawItem>) -> Self {
        Self {
            items,
            signal: None,
        }
    }

    pub fn terminated(signal: TerminationSignal) -> Self {
        Self {
            items: Vec::new(),
            signal: Some(signal),
        }
    }

    pub fn with_signal(mut self, signal: TerminationSignal) -> Self {
        self.signal = Some(signal);
        self
    }
}
