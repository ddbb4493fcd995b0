//! # Row Access
//!
//! A [`Row`] is a view of the statement's current result row. It borrows the
//! statement, and moving the cursor needs the statement mutably, so a `Row`
//! can never outlive the step that produced it.
//!
//! ```text
//! let row = conn.step(&mut stmt)?.unwrap();
//! conn.step(&mut stmt)?;      // error[E0499]: `stmt` is still borrowed by `row`
//! row.get::<i64>("id")?;
//! ```
//!
//! ## Typed Reads
//!
//! | Call                     | NULL column | Type mismatch              |
//! |--------------------------|-------------|----------------------------|
//! | `get::<i64>(c)`          | `0`         | `Misuse::ColumnType`       |
//! | `get::<String>(c)`       | `""`        | `Misuse::ColumnType`       |
//! | `get::<Option<i64>>(c)`  | `None`      | `Misuse::ColumnType`       |
//! | `get_opt::<i64>(c)`      | `None`      | `Misuse::ColumnType`       |
//! | `get_ref(c)`             | `Null`      | never                      |
//!
//! Columns are addressed by 0-based ordinal or by case-insensitive name (see
//! [`ColumnIndex`]).

use crate::database::prepared::Statement;
use crate::error::{Misuse, Result};
use crate::types::{ConversionError, FromColumn, Value, ValueKind, ValueRef};

/// Anything that can pick a result column.
pub trait ColumnIndex {
    fn resolve(&self, stmt: &Statement<'_>) -> Result<usize>;
}

impl ColumnIndex for usize {
    fn resolve(&self, stmt: &Statement<'_>) -> Result<usize> {
        let count = stmt.column_count();
        if *self < count {
            Ok(*self)
        } else {
            Err(Misuse::ColumnOutOfRange {
                index: *self,
                count,
            }
            .into())
        }
    }
}

impl ColumnIndex for &str {
    fn resolve(&self, stmt: &Statement<'_>) -> Result<usize> {
        stmt.column_index(self)
            .ok_or_else(|| Misuse::UnknownColumn((*self).to_owned()).into())
    }
}

impl ColumnIndex for String {
    fn resolve(&self, stmt: &Statement<'_>) -> Result<usize> {
        self.as_str().resolve(stmt)
    }
}

/// The current result row of a statement.
pub struct Row<'stmt> {
    stmt: &'stmt Statement<'stmt>,
}

impl std::fmt::Debug for Row<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Row")
            .field("columns", &self.stmt.column_names())
            .field("values", &self.to_values().unwrap_or_default())
            .finish()
    }
}

impl<'stmt> Row<'stmt> {
    pub(crate) fn new(stmt: &'stmt Statement<'stmt>) -> Self {
        Self { stmt }
    }

    pub fn column_count(&self) -> usize {
        self.stmt.column_count()
    }

    pub fn column_names(&self) -> &'stmt [String] {
        self.stmt.column_names()
    }

    /// Reads column `col` as `T`. NULL reads as the type's zero value; use
    /// `Option<T>` or [`Self::get_opt`] to tell NULL apart.
    pub fn get<T: FromColumn<'stmt>>(&self, col: impl ColumnIndex) -> Result<T> {
        let index = col.resolve(self.stmt)?;
        let value = self.value_at(index)?;
        T::from_column(value).map_err(|err| match err {
            ConversionError::Mismatch { expected, found } => Misuse::ColumnType {
                column: index,
                expected,
                found,
            }
            .into(),
            ConversionError::Utf8 => Misuse::InvalidUtf8 { column: index }.into(),
        })
    }

    pub fn get_opt<T: FromColumn<'stmt>>(&self, col: impl ColumnIndex) -> Result<Option<T>> {
        self.get::<Option<T>>(col)
    }

    /// Borrowed dynamic value; text and blob point into the engine's buffer.
    pub fn get_ref(&self, col: impl ColumnIndex) -> Result<ValueRef<'stmt>> {
        let index = col.resolve(self.stmt)?;
        self.value_at(index)
    }

    pub fn kind(&self, col: impl ColumnIndex) -> Result<ValueKind> {
        Ok(self.get_ref(col)?.kind())
    }

    pub fn is_null(&self, col: impl ColumnIndex) -> Result<bool> {
        Ok(self.kind(col)? == ValueKind::Null)
    }

    /// Owned copy of every column, in order. Fails like `get::<Value>` on
    /// text that is not valid UTF-8.
    pub fn to_values(&self) -> Result<Vec<Value>> {
        (0..self.column_count()).map(|index| self.get::<Value>(index)).collect()
    }

    fn value_at(&self, index: usize) -> Result<ValueRef<'stmt>> {
        let stmt = self.stmt;
        stmt.connection()
            .context
            .run(|state| -> Result<ValueRef<'stmt>> {
                state.db()?;
                Ok(stmt.raw()?.column_value(index))
            })
    }
}
