//! Offset pagination utilities.

use serde::Deserialize;
use thiserror::Error;

/// Default number of items per page.
pub const DEFAULT_LIMIT: i64 = 50;

/// Maximum number of items a single page may request.
pub const MAX_LIMIT: i64 = 200;

/// Error type for pagination parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PageError {
    #[error("Limit must be between 1 and {MAX_LIMIT}, got {0}")]
    InvalidLimit(i64),
    #[error("Offset must be non-negative, got {0}")]
    InvalidOffset(i64),
}

/// Query parameters for paginated listings.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A validated limit/offset pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    /// Creates a page, rejecting out-of-range values.
    pub fn new(limit: i64, offset: i64) -> Result<Self, PageError> {
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(PageError::InvalidLimit(limit));
        }
        if offset < 0 {
            return Err(PageError::InvalidOffset(offset));
        }
        Ok(Self { limit, offset })
    }

    /// Returns the slice bounds of this page over a collection of `len` items.
    pub fn bounds(&self, len: usize) -> (usize, usize) {
        let start = (self.offset as usize).min(len);
        let end = start.saturating_add(self.limit as usize).min(len);
        (start, end)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl TryFrom<PageQuery> for Page {
    type Error = PageError;

    fn try_from(query: PageQuery) -> Result<Self, Self::Error> {
        Page::new(
            query.limit.unwrap_or(DEFAULT_LIMIT),
            query.offset.unwrap_or(0),
        )
    }
}
