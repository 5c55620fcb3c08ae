//! # Pagination Module
//!
//! Splits a [`QuerySet`] into pages. A page is fetched with one `COUNT(*)`
//! query for the total and one `LIMIT`/`OFFSET` query for the data.

// ============================================================================
// External Crate Imports
// ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::{error::Error, model::Model, query_set::QuerySet};

// ============================================================================
// Pagination Structs
// ============================================================================

/// Represents a paginated result set from the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    /// The list of items for the current page
    pub data: Vec<T>,
    /// The total number of records matching the query (ignoring pagination)
    pub total: i64,
    /// The current page number (zero-based)
    pub page: usize,
    /// The number of items per page
    pub limit: usize,
    /// The total number of pages available
    pub total_pages: i64,
}

/// A builder for pagination settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    /// Zero-based page index
    pub page: usize,
    /// Number of items per page
    pub limit: usize,
    /// Maximum allowed items per page
    pub max_limit: usize,
}

impl Pagination {
    /// Creates a new Pagination instance with a custom safety limit.
    ///
    /// A `limit` above `max_limit`, or of zero, falls back to 10 items per page.
    pub fn new_with_limit(page: usize, limit: usize, max_limit: usize) -> Self {
        let limit = if limit == 0 || limit > max_limit { 10 } else { limit };
        Self { page, limit, max_limit }
    }

    /// Creates a new Pagination instance with a default safety limit of 100.
    pub fn new(page: usize, limit: usize) -> Self {
        Self::new_with_limit(page, limit, 100)
    }

    pub fn offset(&self) -> usize {
        self.page * self.limit
    }

    /// Applies `LIMIT`/`OFFSET` for this page to a query.
    pub fn apply<'a, T: Model + Default>(&self, query: QuerySet<'a, T>) -> QuerySet<'a, T> {
        query.limit(self.limit).offset(self.offset())
    }

    /// Executes the query and returns one page of it.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let page = Pagination::new(0, 20).paginate(db.objects::<Brand>().order_by("name")?).await?;
    /// for brand in page.data {
    ///     println!("{:?}", brand);
    /// }
    /// ```
    pub async fn paginate<T: Model + Default>(self, query: QuerySet<'_, T>) -> Result<Paginated<T>, Error> {
        let total = query.count().await?;
        let data = self.apply(query).all().await?;

        let total_pages = (total as f64 / self.limit as f64).ceil() as i64;

        Ok(Paginated { data, total, page: self.page, limit: self.limit, total_pages })
    }
}
