//! Catalog material model

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

text_enum! {
    pub enum MaterialType {
        Book => "book",
        Journal => "journal",
        Magazine => "magazine",
        Thesis => "thesis",
        Dvd => "dvd",
        Ebook => "ebook",
        Other => "other",
    }
}

text_enum! {
    /// Availability status. `Available`/`Unavailable` follow the copy count,
    /// `Maintenance`/`Lost` are set by librarians and stop circulation.
    pub enum MaterialStatus {
        Available => "available",
        Unavailable => "unavailable",
        Maintenance => "maintenance",
        Lost => "lost",
    }
}

impl MaterialStatus {
    pub fn is_circulating(&self) -> bool {
        matches!(self, MaterialStatus::Available | MaterialStatus::Unavailable)
    }

    /// Status after the available copy count changed
    pub fn for_copies(self, available_copies: i32) -> Self {
        if !self.is_circulating() {
            self
        } else if available_copies > 0 {
            MaterialStatus::Available
        } else {
            MaterialStatus::Unavailable
        }
    }
}

/// Catalog item from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Material {
    pub id: i32,
    pub title: String,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    pub material_type: MaterialType,
    pub category: Option<String>,
    pub language: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub total_copies: i32,
    pub available_copies: i32,
    pub status: MaterialStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Material with its review summary, for detail views
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct MaterialDetails {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub material: Material,
    pub average_rating: Option<f64>,
    pub review_count: i64,
    /// Pending reservations waiting for a copy
    pub queue_length: i64,
}

/// Short material representation for catalog lists
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct MaterialSummary {
    pub id: i32,
    pub title: String,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub publication_year: Option<i32>,
    pub material_type: MaterialType,
    pub category: Option<String>,
    pub total_copies: i32,
    pub available_copies: i32,
    pub status: MaterialStatus,
}

/// Catalog search parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct MaterialQuery {
    /// Free text over title, author and ISBN
    pub q: Option<String>,
    pub material_type: Option<MaterialType>,
    pub category: Option<String>,
    /// Only materials with a copy on the shelf
    pub available_only: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Create material request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateMaterial {
    #[validate(length(min = 1, max = 500, message = "Title is required"))]
    pub title: String,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    #[validate(range(min = 0, max = 2200))]
    pub publication_year: Option<i32>,
    pub material_type: Option<MaterialType>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    /// Defaults to 1
    #[validate(range(min = 1, max = 10000, message = "At least one copy is required"))]
    pub total_copies: Option<i32>,
}

/// Update material request
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateMaterial {
    #[validate(length(min = 1, max = 500))]
    pub title: Option<String>,
    pub author: Option<String>,
    /// An empty string removes the stored ISBN
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    #[validate(range(min = 0, max = 2200))]
    pub publication_year: Option<i32>,
    pub material_type: Option<MaterialType>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    #[validate(range(min = 1, max = 10000))]
    pub total_copies: Option<i32>,
    /// Only `maintenance`, `lost`, or `available` (back into circulation) are accepted
    pub status: Option<MaterialStatus>,
}

/// What an update does to the ISBN column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsbnUpdate {
    Keep,
    Clear,
    Set(String),
}

impl IsbnUpdate {
    /// `None` keeps the ISBN and a blank string clears it. Anything else must
    /// be a valid ISBN; the rejected input is returned as the error.
    pub fn parse(raw: Option<&str>) -> Result<Self, String> {
        match raw.map(str::trim) {
            None => Ok(IsbnUpdate::Keep),
            Some("") => Ok(IsbnUpdate::Clear),
            Some(raw) => normalize_isbn(raw).map(IsbnUpdate::Set).ok_or_else(|| raw.to_string()),
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            IsbnUpdate::Set(isbn) => Some(isbn),
            _ => None,
        }
    }

    pub fn clears(&self) -> bool {
        matches!(self, IsbnUpdate::Clear)
    }
}

static ISBN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d{9}[\dX]|\d{13})$").expect("valid ISBN regex"));

/// Strip separators and verify the ISBN-10/13 checksum.
/// Returns the normalized form, or `None` if the value is not a valid ISBN.
pub fn normalize_isbn(raw: &str) -> Option<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !matches!(c, '-' | ' '))
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if !ISBN_RE.is_match(&compact) {
        return None;
    }

    let digits: Vec<u32> = compact
        .chars()
        .map(|c| if c == 'X' { 10 } else { c.to_digit(10).unwrap_or(0) })
        .collect();

    let valid = if digits.len() == 10 {
        let sum: u32 = digits
            .iter()
            .enumerate()
            .map(|(i, d)| d * (10 - i as u32))
            .sum();
        sum % 11 == 0
    } else {
        let sum: u32 = digits
            .iter()
            .enumerate()
            .map(|(i, d)| if i % 2 == 0 { *d } else { d * 3 })
            .sum();
        sum % 10 == 0
    };

    valid.then_some(compact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isbn13_normalized() {
        assert_eq!(
            normalize_isbn("978-0-306-40615-7").as_deref(),
            Some("9780306406157")
        );
    }

    #[test]
    fn test_isbn10_with_check_x() {
        assert_eq!(normalize_isbn("0-8044-2957-x").as_deref(), Some("080442957X"));
    }

    #[test]
    fn test_isbn_bad_checksum() {
        assert!(normalize_isbn("978-0-306-40615-8").is_none());
        assert!(normalize_isbn("0-306-40615-3").is_none());
    }

    #[test]
    fn test_isbn_bad_shape() {
        assert!(normalize_isbn("").is_none());
        assert!(normalize_isbn("12345").is_none());
        assert!(normalize_isbn("97803064061X7").is_none());
    }

    #[test]
    fn test_isbn_update_keep_clear_set() {
        assert_eq!(IsbnUpdate::parse(None), Ok(IsbnUpdate::Keep));
        assert_eq!(IsbnUpdate::parse(Some("  ")), Ok(IsbnUpdate::Clear));
        assert!(IsbnUpdate::parse(Some("")).unwrap().clears());

        let set = IsbnUpdate::parse(Some("978-0-306-40615-7")).unwrap();
        assert_eq!(set.value(), Some("9780306406157"));
        assert!(!set.clears());

        assert_eq!(IsbnUpdate::parse(Some("12345")), Err("12345".to_string()));
    }

    #[test]
    fn test_status_follows_copies() {
        assert_eq!(
            MaterialStatus::Available.for_copies(0),
            MaterialStatus::Unavailable
        );
        assert_eq!(
            MaterialStatus::Unavailable.for_copies(2),
            MaterialStatus::Available
        );
        assert_eq!(
            MaterialStatus::Maintenance.for_copies(3),
            MaterialStatus::Maintenance
        );
        assert!(!MaterialStatus::Lost.is_circulating());
    }
}
