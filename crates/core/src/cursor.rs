//! Paginated result envelope.

use serde::Serialize;

/// One page of results plus the tokens needed to move around.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cursor<T> {
    pub page_size: u32,
    pub has_more: bool,
    /// Size of the unpaginated filtered set, when the listing computes it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    pub data: Vec<T>,
}

impl<T> Cursor<T> {
    pub fn empty(page_size: u32) -> Self {
        Self {
            page_size,
            has_more: false,
            total: None,
            previous: None,
            next: None,
            data: Vec::new(),
        }
    }

    /// Trim an overfetched batch to `page_size`, returning whether a row was dropped.
    ///
    /// Listings ask the store for `page_size + 1` rows; the extra row only
    /// signals that another page exists and is never returned.
    pub fn from_overfetch(mut rows: Vec<T>, page_size: u32) -> Self {
        let has_more = rows.len() > page_size as usize;
        rows.truncate(page_size as usize);
        Self {
            page_size,
            has_more,
            total: None,
            previous: None,
            next: None,
            data: rows,
        }
    }
}
