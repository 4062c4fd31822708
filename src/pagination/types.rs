//! Pagination types
//!
//! Defines pages, cursors and the per-endpoint pagination style.

use crate::types::Record;
use std::fmt;

/// Sentinel sent as the first cursor of a cursor-paged endpoint
pub const START_CURSOR: &str = "Start";

/// Position passed to a page fetch
///
/// `Start` means "not yet started" and is distinct from exhaustion, which is
/// signalled only by a page whose `next_cursor` is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// First request
    Start,
    /// Token taken verbatim from the previous page
    Token(String),
}

impl PageCursor {
    /// Value to put on the wire
    pub fn as_str(&self) -> &str {
        match self {
            Self::Start => START_CURSOR,
            Self::Token(token) => token,
        }
    }

    /// Check if this is the first request
    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start)
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One page of raw records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Records in API order
    pub records: Vec<Record>,
    /// Cursor for the next page; `None` ends pagination
    pub next_cursor: Option<String>,
}

impl Page {
    /// A final page
    pub fn last(records: Vec<Record>) -> Self {
        Self {
            records,
            next_cursor: None,
        }
    }

    /// A page followed by more
    pub fn with_next(records: Vec<Record>, next_cursor: impl Into<String>) -> Self {
        Self {
            records,
            next_cursor: Some(next_cursor.into()),
        }
    }

    /// Check if this page ends pagination
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }

    /// Number of records on the page
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the page has no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// How an endpoint is paged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PaginationStyle {
    /// Single request; any cursor in the response is ignored
    #[default]
    None,

    /// Opaque cursor echoed back by the server
    Cursor {
        /// Query parameter carrying the cursor
        cursor_param: String,
        /// Query parameter carrying the page size
        count_param: String,
        /// Records requested per page
        page_size: u32,
    },

    /// Numbered pages; a short page ends pagination
    PageNumber {
        /// Query parameter carrying the page number
        page_param: String,
        /// First page number (usually 0 or 1)
        start_page: u32,
        /// Query parameter carrying the page size
        page_size_param: String,
        /// Records requested per page
        page_size: u32,
    },
}

impl PaginationStyle {
    /// Cursor paging with `cursor` / `count` parameters
    pub fn cursor(page_size: u32) -> Self {
        Self::Cursor {
            cursor_param: "cursor".to_string(),
            count_param: "count".to_string(),
            page_size,
        }
    }

    /// Page-number paging starting at `start_page`
    pub fn page_number(
        page_param: impl Into<String>,
        start_page: u32,
        page_size_param: impl Into<String>,
        page_size: u32,
    ) -> Self {
        Self::PageNumber {
            page_param: page_param.into(),
            start_page,
            page_size_param: page_size_param.into(),
            page_size,
        }
    }

    /// Check if the endpoint is fetched in a single request
    pub fn is_single(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Query parameters for a request at `cursor`
    pub fn request_params(&self, cursor: &PageCursor) -> Vec<(String, String)> {
        match self {
            Self::None => Vec::new(),
            Self::Cursor {
                cursor_param,
                count_param,
                page_size,
            } => vec![
                (cursor_param.clone(), cursor.as_str().to_string()),
                (count_param.clone(), page_size.to_string()),
            ],
            Self::PageNumber {
                page_param,
                start_page,
                page_size_param,
                page_size,
            } => {
                let page = match cursor {
                    PageCursor::Start => start_page.to_string(),
                    PageCursor::Token(token) => token.clone(),
                };
                vec![
                    (page_param.clone(), page),
                    (page_size_param.clone(), page_size.to_string()),
                ]
            }
        }
    }

    /// Cursor for the page after the one just fetched
    ///
    /// `server_cursor` is the token the response carried, if any. Empty
    /// tokens end pagination.
    pub fn next_cursor(
        &self,
        cursor: &PageCursor,
        server_cursor: Option<String>,
        records: usize,
    ) -> Option<String> {
        match self {
            Self::None => None,
            Self::Cursor { .. } => server_cursor.filter(|c| !c.is_empty()),
            Self::PageNumber {
                start_page,
                page_size,
                ..
            } => {
                if records < *page_size as usize || records == 0 {
                    return None;
                }
                let current = match cursor {
                    PageCursor::Start => *start_page,
                    PageCursor::Token(token) => token.parse().ok()?,
                };
                Some((current + 1).to_string())
            }
        }
    }
}
