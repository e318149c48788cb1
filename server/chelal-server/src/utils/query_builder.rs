//! Filtered, paginated SELECT construction
//!
//! Conditions are joined with `WHERE`/`AND` as they are added, so base
//! queries never carry their own `WHERE` clause.

use crate::types::PaginationParams;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::{QueryAs, QueryScalar};
use sqlx::{Postgres, QueryBuilder};

/// Example usage:
/// ```ignore
/// let mut query = PaginatedQuery::new("SELECT * FROM appointments");
/// query
///     .filter_eq("patient_id", params.patient_id)
///     .filter_eq("date", params.date)
///     .order_by("date", "DESC")
///     .paginate(&pagination);
///
/// let rows: Vec<Appointment> = query.build_query_as().fetch_all(&pool).await?;
/// ```
pub struct PaginatedQuery<'a> {
    query: QueryBuilder<'a, Postgres>,
    conditions: usize,
    page: u32,
    page_size: u32,
}

impl<'a> PaginatedQuery<'a> {
    pub fn new(base_query: impl Into<String>) -> Self {
        Self {
            query: QueryBuilder::new(base_query),
            conditions: 0,
            page: 1,
            page_size: crate::types::pagination::DEFAULT_PAGE_SIZE,
        }
    }

    fn push_condition(&mut self, condition: &str) -> &mut Self {
        let joiner = if self.conditions == 0 { " WHERE " } else { " AND " };
        self.query.push(joiner);
        self.query.push(condition);
        self.conditions += 1;
        self
    }

    /// Add a condition that is always applied.
    pub fn add_base_filter<T>(&mut self, column: &str, value: T) -> &mut Self
    where
        T: for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> + Send + Sync + 'static,
    {
        self.push_condition(&format!("{} = ", column));
        self.query.push_bind(value);
        self
    }

    /// Add an equality filter (only if value is Some)
    pub fn filter_eq<T>(&mut self, column: &str, value: Option<T>) -> &mut Self
    where
        T: for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> + Send + Sync + 'static,
    {
        if let Some(val) = value {
            self.add_base_filter(column, val);
        }
        self
    }

    /// Add a not-equal filter (only if value is Some)
    pub fn filter_ne<T>(&mut self, column: &str, value: Option<T>) -> &mut Self
    where
        T: for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> + Send + Sync + 'static,
    {
        if let Some(val) = value {
            self.push_condition(&format!("{} != ", column));
            self.query.push_bind(val);
        }
        self
    }

    /// Case-insensitive substring match (only if value is Some and non-blank)
    pub fn filter_ilike(&mut self, column: &str, value: Option<&str>) -> &mut Self {
        if let Some(val) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.push_condition(&format!("{} ILIKE ", column));
            self.query.push_bind(format!("%{}%", val));
        }
        self
    }

    /// Case-insensitive substring match against any of `columns`
    pub fn search(&mut self, columns: &[&str], value: Option<&str>) -> &mut Self {
        let Some(val) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return self;
        };
        if columns.is_empty() {
            return self;
        }

        self.push_condition("(");
        let pattern = format!("%{}%", val);
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                self.query.push(" OR ");
            }
            self.query.push(format!("{} ILIKE ", column));
            self.query.push_bind(pattern.clone());
        }
        self.query.push(")");
        self
    }

    /// Raw predicate with no bound values, e.g. `is_read = false`.
    pub fn filter_raw(&mut self, predicate: &'static str) -> &mut Self {
        self.push_condition(predicate)
    }

    /// Add ORDER BY clause
    pub fn order_by(&mut self, column: &str, direction: &str) -> &mut Self {
        self.query.push(format!(" ORDER BY {} {}", column, direction));
        self
    }

    pub fn paginate(&mut self, params: &PaginationParams) -> &mut Self {
        self.page = params.page();
        self.page_size = params.page_size();
        self.query.push(" LIMIT ");
        self.query.push_bind(params.limit());
        self.query.push(" OFFSET ");
        self.query.push_bind(params.offset());
        self
    }

    pub fn build_query_as<T>(&mut self) -> QueryAs<'_, Postgres, T, PgArguments>
    where
        T: for<'r> sqlx::FromRow<'r, PgRow>,
    {
        self.query.build_query_as()
    }

    pub fn build_query_scalar<T>(&mut self) -> QueryScalar<'_, Postgres, T, PgArguments>
    where
        (T,): for<'r> sqlx::FromRow<'r, PgRow>,
    {
        self.query.build_query_scalar()
    }

    pub fn sql(&self) -> &str {
        self.query.sql()
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }
}
