//! # Query Set
//!
//! A small builder for `SELECT` statements over one model's table. Field names
//! are checked against the model's attributes before any SQL is produced; raw
//! fragments (`join_raw`, `where_raw`) are passed through untouched.
//!
//! ```rust,ignore
//! let adults = db
//!     .objects::<Person>()
//!     .filter("age", Op::Gte, 18)?
//!     .order_by("name")?
//!     .limit(10)
//!     .all()
//!     .await?;
//! ```

// ============================================================================
// External Crate Imports
// ============================================================================

use std::{fmt, marker::PhantomData};

use sqlx::Row;

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::{
    database::Database,
    error::Error,
    field::Value,
    model::{Model, PK},
    persist,
};

/// Comparison operator of a [`QuerySet::filter`] condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Like => "LIKE",
        })
    }
}

/// Lazily built `SELECT <table>.* FROM <table> ...` for model `T`.
pub struct QuerySet<'a, T> {
    db: &'a Database,
    table: String,
    joins: Vec<String>,
    conditions: Vec<String>,
    values: Vec<Value>,
    order: Vec<String>,
    limit: Option<usize>,
    offset: Option<usize>,
    _model: PhantomData<fn() -> T>,
}

impl<'a, T: Model + Default> QuerySet<'a, T> {
    pub(crate) fn new(db: &'a Database) -> Self {
        Self {
            db,
            table: T::model_type().table_name(),
            joins: Vec::new(),
            conditions: Vec::new(),
            values: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            _model: PhantomData,
        }
    }

    /// Qualified column for `field`, which must be `id` or a column attribute of `T`.
    fn column(&self, field: &str) -> Result<String, Error> {
        if field != PK {
            let descriptor = self.db.registry.field(T::model_type(), field)?;
            if !descriptor.is_column() {
                return Err(Error::NotAColumn { field: field.to_string(), model: T::model_type().name() });
            }
        }
        Ok(format!("{}.{field}", self.table))
    }

    fn condition(&mut self, field: &str, op: Op, value: Value, negate: bool) -> Result<(), Error> {
        let column = self.column(field)?;

        let condition = match (op, value.is_null()) {
            (Op::Eq, true) => format!("{column} IS NULL"),
            (Op::Ne, true) => format!("{column} IS NOT NULL"),
            _ => {
                self.values.push(value);
                format!("{column} {op} ?")
            }
        };

        self.conditions.push(if negate { format!("NOT ({condition})") } else { condition });
        Ok(())
    }

    /// Keeps rows where `field <op> value`. Comparing to `Value::Null` with
    /// `Eq`/`Ne` becomes `IS NULL`/`IS NOT NULL`.
    pub fn filter(mut self, field: &str, op: Op, value: impl Into<Value>) -> Result<Self, Error> {
        self.condition(field, op, value.into(), false)?;
        Ok(self)
    }

    /// Drops rows where `field <op> value`.
    pub fn exclude(mut self, field: &str, op: Op, value: impl Into<Value>) -> Result<Self, Error> {
        self.condition(field, op, value.into(), true)?;
        Ok(self)
    }

    pub fn order_by(mut self, field: &str) -> Result<Self, Error> {
        let column = self.column(field)?;
        self.order.push(format!("{column} ASC"));
        Ok(self)
    }

    pub fn order_by_desc(mut self, field: &str) -> Result<Self, Error> {
        let column = self.column(field)?;
        self.order.push(format!("{column} DESC"));
        Ok(self)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Adds `JOIN <table> ON <on>`.
    pub fn join_raw(mut self, table: &str, on: &str) -> Self {
        self.joins.push(format!("JOIN {table} ON {on}"));
        self
    }

    /// Adds a raw condition with a single `?` placeholder bound to `value`.
    pub fn where_raw(mut self, sql: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(sql.to_string());
        self.values.push(value.into());
        self
    }

    fn from_clause(&self) -> String {
        let mut sql = format!(" FROM {}", self.table);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        sql
    }

    pub fn to_sql(&self) -> String {
        let mut sql = format!("SELECT {}.*{}", self.table, self.from_clause());

        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order.join(", "));
        }

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            // SQLite only accepts OFFSET after a LIMIT.
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        sql
    }

    /// Every matching row. Rows that cannot be decoded are logged and left out.
    pub async fn all(self) -> Result<Vec<T>, Error> {
        let sql = self.to_sql();
        let rows = self.db.raw(&sql).bind_all(self.values).fetch_all().await?;

        let mut models = Vec::with_capacity(rows.len());
        for row in &rows {
            match persist::hydrate::<T>(&self.db.registry, row) {
                Ok(model) => models.push(model),
                Err(e) => log::error!("skipping {} row: {e}", T::model_type().name()),
            }
        }
        Ok(models)
    }

    pub async fn first(self) -> Result<Option<T>, Error> {
        Ok(self.limit(1).all().await?.into_iter().next())
    }

    /// The instance with primary key `id`, if any.
    pub async fn get(self, id: i32) -> Result<Option<T>, Error> {
        self.filter(PK, Op::Eq, id)?.first().await
    }

    /// Number of matching rows, ignoring ordering and paging.
    pub async fn count(&self) -> Result<i64, Error> {
        let sql = format!("SELECT COUNT(*){}", self.from_clause());
        let row = self.db.raw(&sql).bind_all(self.values.clone()).fetch_one().await?;
        Ok(row.try_get::<i64, _>(0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators_render_as_sql() {
        assert_eq!(Op::Eq.to_string(), "=");
        assert_eq!(Op::Ne.to_string(), "!=");
        assert_eq!(Op::Gte.to_string(), ">=");
        assert_eq!(Op::Like.to_string(), "LIKE");
    }
}
