//! Page parameters and paged results shared by the feed and list endpoints

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 50;

/// Pagination parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ListParams {
    /// Create new pagination parameters
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Normalize raw client input: a page below 1 becomes 1, a size below 1
    /// falls back to `default_per_page`, a size above `max_per_page` is capped.
    pub fn normalize(page: i64, per_page: i64, default_per_page: u32, max_per_page: u32) -> Self {
        let page = u32::try_from(page.max(1)).unwrap_or(u32::MAX);
        let per_page = if per_page < 1 {
            default_per_page
        } else {
            u32::try_from(per_page).unwrap_or(u32::MAX).min(max_per_page)
        };
        Self {
            page,
            per_page: per_page.max(1),
        }
    }

    /// Calculate the offset for database queries
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.per_page)
    }
}

/// Paginated result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
}

impl<T> PagedResult<T> {
    /// Build from one already-sliced page
    pub fn new(items: Vec<T>, total_count: u64, params: &ListParams) -> Self {
        Self {
            items,
            total_count,
            page: params.page,
            page_size: params.per_page,
            has_more: params.offset() + params.limit() < total_count,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            page: self.page,
            page_size: self.page_size,
            has_more: self.has_more,
        }
    }
}

/// Slice one page out of a fully ordered collection
pub fn paginate<T>(all: Vec<T>, params: &ListParams) -> PagedResult<T> {
    let total = all.len() as u64;
    let offset = usize::try_from(params.offset()).unwrap_or(usize::MAX);
    let items = all
        .into_iter()
        .skip(offset)
        .take(params.per_page as usize)
        .collect();
    PagedResult::new(items, total, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_clamps_inputs() {
        assert_eq!(ListParams::normalize(0, 0, 10, 50), ListParams { page: 1, per_page: 10 });
        assert_eq!(ListParams::normalize(-3, -1, 10, 50), ListParams { page: 1, per_page: 10 });
        assert_eq!(ListParams::normalize(2, 500, 10, 50), ListParams { page: 2, per_page: 50 });
        assert_eq!(ListParams::normalize(4, 7, 10, 50), ListParams { page: 4, per_page: 7 });
    }

    #[test]
    fn test_page_beyond_end_is_empty() {
        let result = paginate((0..5).collect::<Vec<_>>(), &ListParams::new(3, 5));
        assert!(result.items.is_empty());
        assert_eq!(result.total_count, 5);
        assert!(!result.has_more);
    }

    #[test]
    fn test_has_more_on_exact_boundary() {
        let result = paginate((0..10).collect::<Vec<_>>(), &ListParams::new(2, 5));
        assert_eq!(result.items, vec![5, 6, 7, 8, 9]);
        assert!(!result.has_more);

        let result = paginate((0..11).collect::<Vec<_>>(), &ListParams::new(2, 5));
        assert!(result.has_more);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Walking every page yields each item exactly once, in order.
        #[test]
        fn pages_partition_the_collection(total in 0usize..200, per_page in 1u32..=50) {
            let all: Vec<usize> = (0..total).collect();
            let pages = (total as u64).div_ceil(u64::from(per_page)).max(1) as u32;

            let mut seen = Vec::new();
            for page in 1..=pages {
                let params = ListParams::new(page, per_page);
                let result = paginate(all.clone(), &params);
                prop_assert_eq!(result.total_count, total as u64);
                prop_assert_eq!(
                    result.has_more,
                    u64::from(page) * u64::from(per_page) < total as u64
                );
                seen.extend(result.items);
            }
            prop_assert_eq!(seen, all);
        }
    }
}
