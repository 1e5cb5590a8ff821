use serde::Serialize;

pub const DEFAULT_PER_PAGE: i64 = 25;
pub const MAX_PER_PAGE: i64 = 100;

/// Requested page window. Pages are 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: Option<i64>, per_page: i64) -> Self {
        Self {
            page: page.filter(|p| *p >= 1).unwrap_or(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    /// Parses the raw `page` query value; anything that is not a positive
    /// integer falls back to the first page.
    pub fn from_query(page: Option<&str>, per_page: i64) -> Self {
        Self::new(page.and_then(|p| p.trim().parse::<i64>().ok()), per_page)
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, DEFAULT_PER_PAGE)
    }
}

/// Result page plus the numbers the pager needs.
#[derive(Clone, Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, pagination: Pagination, total: i64) -> Self {
        Self {
            items,
            page: pagination.page,
            per_page: pagination.per_page,
            total: total.max(0),
        }
    }

    pub fn total_pages(&self) -> i64 {
        total_pages(self.total, self.per_page)
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }
}

pub fn total_pages(total: i64, per_page: i64) -> i64 {
    let per_page = per_page.max(1);
    ((total.max(0) + per_page - 1) / per_page).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_invalid_pages_fall_back_to_first() {
        assert_eq!(Pagination::from_query(None, 25).page, 1);
        assert_eq!(Pagination::from_query(Some("abc"), 25).page, 1);
        assert_eq!(Pagination::from_query(Some("0"), 25).page, 1);
        assert_eq!(Pagination::from_query(Some("-4"), 25).page, 1);
        assert_eq!(Pagination::from_query(Some(" 3 "), 25).page, 3);
    }

    #[test]
    fn test_per_page_is_clamped() {
        assert_eq!(Pagination::new(None, 0).per_page, 1);
        assert_eq!(Pagination::new(None, 500).per_page, MAX_PER_PAGE);
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 25), 1);
        assert_eq!(total_pages(25, 25), 1);
        assert_eq!(total_pages(26, 25), 2);
        assert_eq!(total_pages(101, 10), 11);
    }

    #[test]
    fn test_page_navigation_flags() {
        let page: Page<u8> = Page::new(vec![], Pagination::new(Some(2), 10), 35);
        assert!(page.has_previous());
        assert!(page.has_next());
        assert_eq!(page.total_pages(), 4);

        let last: Page<u8> = Page::new(vec![], Pagination::new(Some(4), 10), 35);
        assert!(!last.has_next());
    }

    proptest! {
        #[test]
        fn offset_matches_page_number(page in 1i64..10_000, per_page in 1i64..=MAX_PER_PAGE) {
            let pagination = Pagination::new(Some(page), per_page);
            prop_assert_eq!(pagination.offset(), (page - 1) * per_page);
            prop_assert_eq!(pagination.offset() / per_page + 1, page);
        }

        #[test]
        fn every_row_lands_on_exactly_one_page(total in 0i64..5_000, per_page in 1i64..=MAX_PER_PAGE) {
            let pages = total_pages(total, per_page);
            let last = Pagination::new(Some(pages), per_page);
            prop_assert!(last.offset() <= total.max(0));
            if total > 0 {
                prop_assert!(last.offset() < total);
                prop_assert!(last.offset() + per_page >= total);
            }
        }
    }
}
