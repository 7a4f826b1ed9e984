use cms_models::Page;
use serde::Deserialize;
use serde::Serialize;
use utoipa::IntoParams;
use utoipa::ToSchema;

use super::validation::FieldErrors;

pub const DEFAULT_PER_PAGE: u64 = 15;
pub const MAX_PER_PAGE: u64 = 100;

/// Statistics about a paginated response
///
/// Provides the pagination settings issued in the request alongside
/// a few convenience fields useful to navigate the paginated results.
///
/// # Expected usage
///
/// This struct is meant to be flattened in the response of a paginated query.
///
/// ```ignore
/// #[derive(Serialize, ToSchema)]
/// struct MyPaginatedResponse {
///     #[serde(flatten)]
///     stats: PaginationStats,
///     results: Vec<MyData>,
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
pub struct PaginationStats {
    /// The total number of items
    #[schema(minimum = 0)]
    pub count: u64,

    /// The number of items per page
    #[schema(minimum = 1)]
    pub page_size: u64,

    /// The total number of pages
    #[schema(minimum = 0)]
    pub page_count: u64,

    /// The current page number
    #[schema(minimum = 1)]
    pub current: u64,

    /// The previous page number, if any
    #[schema(required, minimum = 1)]
    pub previous: Option<u64>,

    /// The next page number, if any
    #[schema(required, minimum = 1)]
    pub next: Option<u64>,
}

impl PaginationStats {
    /// Computes a new [PaginationStats] from the requested page and the total count
    ///
    /// Pages past the end are valid requests: they are empty and point back to
    /// the page before them.
    pub fn new(total_count: u64, page: Page) -> Self {
        let page_size = page.per_page.max(1);
        let current = page.page.max(1);
        let page_count = total_count.div_ceil(page_size);
        let previous = (current > 1 && total_count > 0).then_some(current - 1);
        let next = (current < page_count).then_some(current + 1);
        Self {
            count: total_count,
            page_size,
            page_count,
            current,
            previous,
            next,
        }
    }
}

/// Raw `page` and `per_page` query parameters
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationQueryParams {
    /// Page number, starting at 1
    #[param(value_type = Option<u64>, minimum = 1, default = 1)]
    pub page: Option<String>,
    /// Number of items per page
    #[param(value_type = Option<u64>, minimum = 1, maximum = 100, default = 15)]
    pub per_page: Option<String>,
}

impl PaginationQueryParams {
    pub fn validate(&self, errors: &mut FieldErrors) -> Page {
        let page = errors
            .integer_between("page", self.page.as_deref(), 1, u64::MAX)
            .unwrap_or(1);
        let per_page = errors
            .integer_between("per_page", self.per_page.as_deref(), 1, MAX_PER_PAGE)
            .unwrap_or(DEFAULT_PER_PAGE);
        Page::new(page, per_page)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::first_page(31, 1, 15, 3, None, Some(2))]
    #[case::middle_page(31, 2, 15, 3, Some(1), Some(3))]
    #[case::last_page(31, 3, 15, 3, Some(2), None)]
    #[case::past_the_end(31, 9, 15, 3, Some(8), None)]
    #[case::empty(0, 1, 15, 0, None, None)]
    #[case::exact(30, 2, 15, 2, Some(1), None)]
    fn stats(
        #[case] count: u64,
        #[case] page: u64,
        #[case] per_page: u64,
        #[case] page_count: u64,
        #[case] previous: Option<u64>,
        #[case] next: Option<u64>,
    ) {
        let stats = PaginationStats::new(count, Page::new(page, per_page));
        assert_eq!(
            stats,
            PaginationStats {
                count,
                page_size: per_page,
                page_count,
                current: page,
                previous,
                next,
            }
        );
    }

    #[test]
    fn defaults() {
        let mut errors = FieldErrors::default();
        let page = PaginationQueryParams::default().validate(&mut errors);
        assert!(errors.is_empty());
        assert_eq!((page.page, page.per_page), (1, DEFAULT_PER_PAGE));
    }

    #[test]
    fn out_of_range() {
        let mut errors = FieldErrors::default();
        PaginationQueryParams {
            page: Some("0".to_owned()),
            per_page: Some("101".to_owned()),
        }
        .validate(&mut errors);
        assert_eq!(
            errors.get("page"),
            Some(&["The page field must be at least 1.".to_owned()][..])
        );
        assert_eq!(
            errors.get("per_page"),
            Some(&["The per_page field must be between 1 and 100.".to_owned()][..])
        );
    }
}
