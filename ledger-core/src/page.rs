//! Pagination for listing operations

use serde::{Deserialize, Serialize};

/// Requested page (1-based) and page size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Page number, starting at 1
    pub page: u64,
    /// Entries per page
    pub page_size: u64,
}

impl PageRequest {
    /// Create a request. Page 0 is read as page 1, page size 0 as 1.
    pub fn new(page: u64, page_size: u64) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 10)
    }
}

/// Page metadata returned alongside a page of results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    /// Total matching entries
    pub total_entries: u64,
    /// ceil(total_entries / page_size)
    pub total_pages: u64,
    /// Requested page
    pub page: u64,
    /// Entries per page
    pub page_size: u64,
    /// (page - 1) * page_size
    pub offset: u64,
}

impl PageResult {
    /// Compute page metadata for `request` over `total_entries` matches
    pub fn for_request(request: PageRequest, total_entries: u64) -> Self {
        let request = PageRequest::new(request.page, request.page_size);
        Self {
            total_entries,
            total_pages: total_entries.div_ceil(request.page_size),
            page: request.page,
            page_size: request.page_size,
            offset: (request.page - 1).saturating_mul(request.page_size),
        }
    }
}

/// One page of results with its metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Page metadata
    pub result: PageResult,
    /// Entries on this page
    pub items: Vec<T>,
}

impl<T> Page<T> {
    /// Number of entries on this page
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the page holds no entries
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
