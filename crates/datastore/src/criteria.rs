//! Typed criteria and bound SQL values.
//!
//! Every dynamic value reaches the database as a bound parameter; the only
//! text spliced into a statement is an identifier that passed
//! [`ensure_identifier`].

use chrono::{DateTime, Utc};
use freightdeck_core::{AppError, AppResult};
use sqlx::query_builder::Separated;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

/// A value bound into a SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// UUID value.
    Uuid(Uuid),
    /// Text value.
    Text(String),
    /// 64-bit integer value.
    Integer(i64),
    /// Boolean value.
    Bool(bool),
    /// UTC timestamp value.
    Timestamp(DateTime<Utc>),
    /// JSON document value.
    Json(serde_json::Value),
    /// SQL NULL.
    Null,
}

impl SqlValue {
    /// Returns whether this value is SQL NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub(crate) fn push_bind(self, builder: &mut QueryBuilder<'_, Postgres>) {
        match self {
            Self::Uuid(value) => {
                builder.push_bind(value);
            }
            Self::Text(value) => {
                builder.push_bind(value);
            }
            Self::Integer(value) => {
                builder.push_bind(value);
            }
            Self::Bool(value) => {
                builder.push_bind(value);
            }
            Self::Timestamp(value) => {
                builder.push_bind(value);
            }
            Self::Json(value) => {
                builder.push_bind(value);
            }
            Self::Null => {
                builder.push("NULL");
            }
        }
    }

    pub(crate) fn push_bind_separated(self, row: &mut Separated<'_, '_, Postgres, &'static str>) {
        match self {
            Self::Uuid(value) => {
                row.push_bind(value);
            }
            Self::Text(value) => {
                row.push_bind(value);
            }
            Self::Integer(value) => {
                row.push_bind(value);
            }
            Self::Bool(value) => {
                row.push_bind(value);
            }
            Self::Timestamp(value) => {
                row.push_bind(value);
            }
            Self::Json(value) => {
                row.push_bind(value);
            }
            Self::Null => {
                row.push("NULL");
            }
        }
    }
}

impl From<Uuid> for SqlValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Validates a dynamic name as a plain SQL identifier before it is spliced
/// into statement text.
pub(crate) fn ensure_identifier(name: &str) -> AppResult<&str> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_');

    if valid_start && chars.all(|rest| rest.is_ascii_alphanumeric() || rest == '_') {
        Ok(name)
    } else {
        Err(AppError::Validation(format!(
            "'{name}' is not a valid SQL identifier"
        )))
    }
}

/// Ordered column/value pairs applied as equality predicates; a `Null`
/// value becomes an `IS NULL` check.
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    fields: Vec<(String, SqlValue)>,
}

impl Criteria {
    /// Creates an empty criteria set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one column/value pair.
    #[must_use]
    pub fn field(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.fields.push((column.into(), value.into()));
        self
    }

    /// Returns whether no pairs were added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &(String, SqlValue)> {
        self.fields.iter()
    }
}

/// Sort direction for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

impl SortDirection {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Explicit ordering for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// Column to order by.
    pub column: String,
    /// Direction of the ordering.
    pub direction: SortDirection,
}

impl Sort {
    /// Ascending sort on `column`.
    #[must_use]
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    /// Descending sort on `column`.
    #[must_use]
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Options for [`Repository::get_all`](crate::Repository::get_all).
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Equality predicates applied to the listing.
    pub criteria: Criteria,
    /// Optional explicit ordering; creation time always tie-breaks.
    pub sort: Option<Sort>,
    /// Optional row cap.
    pub limit: Option<i64>,
    /// Fetch only soft-deleted rows instead of active ones.
    pub only_deleted: bool,
}
