//! Data models for the library server

#[macro_use]
mod macros;

pub mod fine;
pub mod loan;
pub mod material;
pub mod reservation;
pub mod review;
pub mod stats;
pub mod system_config;
pub mod user;

use serde::Serialize;
use utoipa::ToSchema;

pub use fine::{Fine, FineStatus};
pub use loan::{Loan, LoanDetails, LoanStatus};
pub use material::{Material, MaterialStatus, MaterialSummary, MaterialType};
pub use reservation::{Reservation, ReservationDetails, ReservationStatus};
pub use review::Review;
pub use system_config::{ConfigEntry, LibraryPolicy};
pub use user::{User, UserClaims, UserStatus, UserSummary, UserType};

/// Default and maximum page sizes for list endpoints
pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

/// Normalized pagination window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub per_page: i64,
}

impl Page {
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

/// Paginated response wrapper
#[derive(Debug, Serialize, ToSchema)]
#[aliases(
    PaginatedUsers = PaginatedResponse<UserSummary>,
    PaginatedMaterials = PaginatedResponse<MaterialSummary>,
    PaginatedLoans = PaginatedResponse<LoanDetails>,
    PaginatedReservations = PaginatedResponse<ReservationDetails>,
    PaginatedFines = PaginatedResponse<Fine>
)]
pub struct PaginatedResponse<T> {
    /// Page content
    pub items: Vec<T>,
    /// Total number of matching records
    pub total: i64,
    /// Current page number
    pub page: i64,
    /// Items per page
    pub per_page: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: i64, page: Page) -> Self {
        Self {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
        }
    }
}

/// Result of a batch sweep (overdue marking, hold expiry)
#[derive(Debug, Serialize, ToSchema)]
pub struct ProcessedCount {
    pub processed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults() {
        let page = Page::new(None, None);
        assert_eq!(page, Page { page: 1, per_page: 20 });
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_page_clamped() {
        let page = Page::new(Some(0), Some(1000));
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, MAX_PER_PAGE);

        let page = Page::new(Some(3), Some(25));
        assert_eq!(page.offset(), 50);
    }
}
