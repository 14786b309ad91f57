//! Over-fetch pagination.
//!
//! A page of `limit` rows is requested from the store as `limit + 1` rows; the
//! extra row only answers whether another page exists and is never returned.

use serde::Serialize;

use crate::error::{MemoryError, Result};

/// Validated logical page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    pub limit: usize,
    pub offset: usize,
}

impl PageRequest {
    /// Build a request, enforcing `1 <= limit <= max_limit` and an offset the
    /// store can bind as a signed 64-bit integer.
    pub fn new(limit: usize, offset: usize, max_limit: usize) -> Result<Self> {
        if limit == 0 {
            return Err(MemoryError::validation("limit must be a positive integer"));
        }
        if limit > max_limit {
            return Err(MemoryError::validation(format!(
                "limit must not exceed {max_limit}; page with offset instead"
            )));
        }
        if i64::try_from(offset).is_err() {
            return Err(MemoryError::validation(format!(
                "offset must not exceed {}",
                i64::MAX
            )));
        }
        Ok(Self { limit, offset })
    }

    /// Rows to ask the store for.
    pub fn fetch_limit(&self) -> usize {
        self.limit + 1
    }

    /// Trim an over-fetched batch into a page.
    pub fn paginate<T>(&self, mut rows: Vec<T>) -> Page<T> {
        let has_more = rows.len() > self.limit;
        rows.truncate(self.limit);
        Page {
            count: rows.len(),
            results: rows,
            offset: self.offset,
            limit: self.limit,
            has_more,
        }
    }
}

/// One page of results, as returned to tool callers.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub count: usize,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_row_sets_has_more() {
        let req = PageRequest::new(2, 0, 100).unwrap();
        assert_eq!(req.fetch_limit(), 3);
        let page = req.paginate(vec![1, 2, 3]);
        assert_eq!(page.results, vec![1, 2]);
        assert_eq!(page.count, 2);
        assert!(page.has_more);
    }

    #[test]
    fn short_batch_is_last_page() {
        let req = PageRequest::new(2, 4, 100).unwrap();
        let page = req.paginate(vec![5]);
        assert_eq!(page.count, 1);
        assert_eq!(page.offset, 4);
        assert!(!page.has_more);
    }

    #[test]
    fn exact_batch_is_last_page() {
        let page = PageRequest::new(3, 0, 100).unwrap().paginate(vec![1, 2, 3]);
        assert_eq!(page.count, 3);
        assert!(!page.has_more);
    }

    #[test]
    fn empty_batch_is_success() {
        let page = PageRequest::new(10, 50, 100).unwrap().paginate(Vec::<u8>::new());
        assert_eq!(page.count, 0);
        assert!(!page.has_more);
    }

    #[test]
    fn limit_bounds_are_enforced() {
        assert!(PageRequest::new(0, 0, 100).is_err());
        assert!(PageRequest::new(101, 0, 100).is_err());
        assert!(PageRequest::new(100, 0, 100).is_ok());
    }

    #[test]
    fn offset_beyond_i64_is_rejected() {
        assert!(PageRequest::new(1, i64::MAX as usize, 100).is_ok());
        let err = PageRequest::new(1, i64::MAX as usize + 1, 100).unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
        assert!(PageRequest::new(1, usize::MAX, 100).is_err());
    }
}
