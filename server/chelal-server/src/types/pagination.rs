//! `?page=&page_size=` handling shared by every list endpoint

use crate::error::{api_success_with_meta, ApiResponse, PaginationInfo, ResponseMetadata};
use serde::Deserialize;
use utoipa::IntoParams;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Raw query values. Out-of-range input is clamped, never rejected.
#[derive(Debug, Deserialize, IntoParams, Clone, Copy, Default)]
pub struct PaginationParams {
    #[param(example = 1, minimum = 1)]
    pub page: Option<u32>,

    #[param(example = 20, minimum = 1, maximum = 100)]
    pub page_size: Option<u32>,
}

impl PaginationParams {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page: Some(page), page_size: Some(page_size) }
    }

    pub fn page(&self) -> u32 {
        self.page.map_or(1, |p| p.max(1))
    }

    pub fn page_size(&self) -> u32 {
        self.page_size.map_or(DEFAULT_PAGE_SIZE, |s| s.clamp(1, MAX_PAGE_SIZE))
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size())
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page().saturating_sub(1)) * self.limit()
    }

    /// Number of pages for `total` rows; an empty result still has one page.
    pub fn total_pages(&self, total: i64) -> u32 {
        let total = u64::try_from(total).unwrap_or(0);
        let pages = total.div_ceil(u64::from(self.page_size())).max(1);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    pub fn to_metadata(&self, total: i64) -> ResponseMetadata {
        let page = self.page();
        let last = self.total_pages(total);
        ResponseMetadata {
            pagination: Some(PaginationInfo {
                page,
                page_size: self.page_size(),
                total_pages: last,
                has_next: page < last,
                has_previous: page > 1,
            }),
            total_count: Some(total),
        }
    }

    pub fn wrap_response<T>(&self, rows: T, total: i64) -> ApiResponse<T> {
        api_success_with_meta(rows, self.to_metadata(total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_values_fall_back_to_first_page_of_twenty() {
        let params = PaginationParams::default();
        assert_eq!((params.page(), params.page_size(), params.offset()), (1, 20, 0));
    }

    #[test]
    fn third_page_of_ten_skips_twenty_rows() {
        let params = PaginationParams::new(3, 10);
        assert_eq!(params.offset(), 20);
        assert_eq!(params.limit(), 10);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        assert_eq!(PaginationParams::new(1, 500).page_size(), MAX_PAGE_SIZE);
        assert_eq!(PaginationParams::new(1, 0).page_size(), 1);
        assert_eq!(PaginationParams::new(0, 20).page(), 1);
    }

    #[test]
    fn page_count_rounds_up() {
        let params = PaginationParams::new(1, 25);
        assert_eq!(params.total_pages(0), 1);
        assert_eq!(params.total_pages(25), 1);
        assert_eq!(params.total_pages(26), 2);
        assert_eq!(params.total_pages(-3), 1);
    }

    #[test]
    fn metadata_reports_neighbours() {
        let middle = PaginationParams::new(2, 10).to_metadata(45);
        let info = middle.pagination.unwrap();
        assert_eq!(info.total_pages, 5);
        assert!(info.has_next && info.has_previous);
        assert_eq!(middle.total_count, Some(45));

        let last = PaginationParams::new(5, 10).to_metadata(45).pagination.unwrap();
        assert!(!last.has_next);
    }
}
