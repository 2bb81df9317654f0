//! Pagination for note listings
//!
//! Pages are 0-indexed. Page size is chosen by the caller within
//! [1, MAX_LIMIT].

/// Page size when the caller gives none
pub const DEFAULT_LIMIT: i64 = 20;

/// Largest page size a caller may request
pub const MAX_LIMIT: i64 = 100;

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Current page number (0-indexed)
    pub page: i64,
    /// Rows per page
    pub limit: i64,
    /// ceil(total / limit)
    pub total_pages: i64,
    /// Offset for SQL LIMIT/OFFSET query
    pub offset: i64,
}

/// Clamp a requested page size into [1, MAX_LIMIT]
pub fn sanitize_limit(requested: Option<i64>) -> i64 {
    requested.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Calculate pagination metadata
///
/// Negative pages read as page 0. Pages past the end are kept as asked and
/// simply yield no rows; the offset saturates instead of wrapping.
///
/// # Examples
/// ```
/// use notehub_server::pagination::calculate_pagination;
///
/// let p = calculate_pagination(45, 2, 20);
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 40);
/// ```
pub fn calculate_pagination(total_results: i64, requested_page: i64, limit: i64) -> Pagination {
    let limit = limit.clamp(1, MAX_LIMIT);
    let total_pages = (total_results + limit - 1) / limit;
    let page = requested_page.max(0);

    Pagination {
        page,
        limit,
        total_pages,
        offset: page.saturating_mul(limit),
    }
}
