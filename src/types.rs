//! # Dynamic Value Representation
//!
//! The engine stores one of five scalar kinds in every column, whatever the
//! declared type. This module models that value space and the conversions
//! between it and Rust types.
//!
//! ## Value Representation
//!
//! - [`Value`]: owned value, used for binding and for materialized rows
//! - [`ValueRef`]: borrowed value pointing into the engine's row buffer,
//!   valid until the cursor moves
//! - [`ValueKind`]: the bare tag, as reported by the engine's type probe
//!
//! ## Conversion Rules
//!
//! Reading a column goes through [`FromColumn`]. The non-optional targets
//! never fail on NULL; they produce the type's zero value instead:
//!
//! | Target            | Integer        | Real        | Text          | Blob       | Null   |
//! |-------------------|----------------|-------------|---------------|------------|--------|
//! | integers, `bool`  | range-checked  | truncated   | parsed        | mismatch   | `0`    |
//! | `f64`, `f32`      | widened        | as is       | parsed        | mismatch   | `0.0`  |
//! | `String`          | formatted      | formatted   | copied        | if UTF-8   | `""`   |
//! | `&str`            | mismatch       | mismatch    | borrowed      | if UTF-8   | `""`   |
//! | `Vec<u8>`, `&[u8]`| mismatch       | mismatch    | bytes         | as is      | empty  |
//! | `Option<T>`       | `Some(T)`      | `Some(T)`   | `Some(T)`     | `Some(T)`  | `None` |
//!
//! `Option<T>` is the canonical form when NULL must stay distinguishable.
//! Reals are truncated toward zero; NaN, infinities, and values outside the
//! target's range are a mismatch, never saturated. [`Value`] copies every
//! kind as is, and like `String` refuses text that is not valid UTF-8.
//!
//! ## Usage Examples
//!
//! ```ignore
//! let age: i64 = row.get("age")?;             // NULL -> 0
//! let nickname: Option<String> = row.get(3)?; // NULL -> None
//! let raw: &[u8] = row.get("payload")?;       // zero-copy
//! ```

use std::fmt;

/// Tag of a dynamically typed engine value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Integer,
    Real,
    Text,
    Blob,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "NULL",
            ValueKind::Integer => "INTEGER",
            ValueKind::Real => "REAL",
            ValueKind::Text => "TEXT",
            ValueKind::Blob => "BLOB",
        };
        f.write_str(name)
    }
}

/// Owned engine value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// Borrowed engine value. Text and blob variants point into the engine's
/// buffer for the current row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueRef<'a> {
    Null,
    Integer(i64),
    Real(f64),
    Text(&'a [u8]),
    Blob(&'a [u8]),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Integer(_) => ValueKind::Integer,
            Value::Real(_) => ValueKind::Real,
            Value::Text(_) => ValueKind::Text,
            Value::Blob(_) => ValueKind::Blob,
        }
    }

    pub fn as_value_ref(&self) -> ValueRef<'_> {
        match self {
            Value::Null => ValueRef::Null,
            Value::Integer(i) => ValueRef::Integer(*i),
            Value::Real(f) => ValueRef::Real(*f),
            Value::Text(s) => ValueRef::Text(s.as_bytes()),
            Value::Blob(b) => ValueRef::Blob(b),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl<'a> ValueRef<'a> {
    pub fn kind(&self) -> ValueKind {
        match self {
            ValueRef::Null => ValueKind::Null,
            ValueRef::Integer(_) => ValueKind::Integer,
            ValueRef::Real(_) => ValueKind::Real,
            ValueRef::Text(_) => ValueKind::Text,
            ValueRef::Blob(_) => ValueKind::Blob,
        }
    }
}

/// Copies the value out of the engine buffer. Text that is not valid UTF-8
/// is refused rather than replaced.
impl TryFrom<ValueRef<'_>> for Value {
    type Error = ConversionError;

    fn try_from(v: ValueRef<'_>) -> ConversionResult<Self> {
        Ok(match v {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => {
                let text = std::str::from_utf8(t).map_err(|_| ConversionError::Utf8)?;
                Value::Text(text.to_owned())
            }
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        })
    }
}

macro_rules! value_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Integer(i64::from(v))
                }
            }
        )*
    };
}

value_from_integer!(i8, i16, i32, i64, u8, u16, u32, bool);

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Real(f64::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A value that could not be read as the requested type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionError {
    /// The stored kind has no conversion to the target.
    Mismatch {
        expected: &'static str,
        found: ValueKind,
    },
    /// Text bytes are not valid UTF-8.
    Utf8,
}

pub type ConversionResult<T> = Result<T, ConversionError>;

/// Conversion from a column value into a Rust type.
///
/// The lifetime lets `&str` and `&[u8]` borrow straight from the engine's
/// row buffer.
pub trait FromColumn<'a>: Sized {
    fn from_column(value: ValueRef<'a>) -> ConversionResult<Self>;
}

fn mismatch<T>(expected: &'static str, value: ValueRef<'_>) -> ConversionResult<T> {
    Err(ConversionError::Mismatch {
        expected,
        found: value.kind(),
    })
}

/// Truncates toward zero; `None` for NaN, infinities, and values outside
/// the `i64` range.
fn truncate_real(f: f64) -> Option<i64> {
    // 2^63 is exact in f64; every finite value below it truncates into range.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    let t = f.trunc();
    (t.is_finite() && t >= -LIMIT && t < LIMIT).then_some(t as i64)
}

fn integer_of(expected: &'static str, value: ValueRef<'_>) -> ConversionResult<i64> {
    match value {
        ValueRef::Null => Ok(0),
        ValueRef::Integer(i) => Ok(i),
        ValueRef::Real(f) => truncate_real(f).map_or_else(|| mismatch(expected, value), Ok),
        ValueRef::Text(t) => std::str::from_utf8(t)
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .map_or_else(|| mismatch(expected, value), Ok),
        ValueRef::Blob(_) => mismatch(expected, value),
    }
}

fn real_of(expected: &'static str, value: ValueRef<'_>) -> ConversionResult<f64> {
    match value {
        ValueRef::Null => Ok(0.0),
        ValueRef::Integer(i) => Ok(i as f64),
        ValueRef::Real(f) => Ok(f),
        ValueRef::Text(t) => std::str::from_utf8(t)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .map_or_else(|| mismatch(expected, value), Ok),
        ValueRef::Blob(_) => mismatch(expected, value),
    }
}

macro_rules! from_column_integer {
    ($($ty:ty),*) => {
        $(
            impl<'a> FromColumn<'a> for $ty {
                fn from_column(value: ValueRef<'a>) -> ConversionResult<Self> {
                    let wide = integer_of(stringify!($ty), value)?;
                    <$ty>::try_from(wide).or_else(|_| mismatch(stringify!($ty), value))
                }
            }
        )*
    };
}

from_column_integer!(i8, i16, i32, u8, u16, u32, u64, usize);

impl<'a> FromColumn<'a> for i64 {
    fn from_column(value: ValueRef<'a>) -> ConversionResult<Self> {
        integer_of("i64", value)
    }
}

impl<'a> FromColumn<'a> for bool {
    fn from_column(value: ValueRef<'a>) -> ConversionResult<Self> {
        integer_of("bool", value).map(|i| i != 0)
    }
}

impl<'a> FromColumn<'a> for f64 {
    fn from_column(value: ValueRef<'a>) -> ConversionResult<Self> {
        real_of("f64", value)
    }
}

impl<'a> FromColumn<'a> for f32 {
    fn from_column(value: ValueRef<'a>) -> ConversionResult<Self> {
        real_of("f32", value).map(|f| f as f32)
    }
}

impl<'a> FromColumn<'a> for &'a str {
    fn from_column(value: ValueRef<'a>) -> ConversionResult<Self> {
        match value {
            ValueRef::Null => Ok(""),
            ValueRef::Text(t) | ValueRef::Blob(t) => {
                std::str::from_utf8(t).map_err(|_| ConversionError::Utf8)
            }
            _ => mismatch("&str", value),
        }
    }
}

impl<'a> FromColumn<'a> for String {
    fn from_column(value: ValueRef<'a>) -> ConversionResult<Self> {
        match value {
            ValueRef::Integer(i) => Ok(i.to_string()),
            ValueRef::Real(f) => Ok(f.to_string()),
            _ => <&str>::from_column(value).map(str::to_owned),
        }
    }
}

impl<'a> FromColumn<'a> for &'a [u8] {
    fn from_column(value: ValueRef<'a>) -> ConversionResult<Self> {
        match value {
            ValueRef::Null => Ok(&[]),
            ValueRef::Text(b) | ValueRef::Blob(b) => Ok(b),
            _ => mismatch("&[u8]", value),
        }
    }
}

impl<'a> FromColumn<'a> for Vec<u8> {
    fn from_column(value: ValueRef<'a>) -> ConversionResult<Self> {
        <&[u8]>::from_column(value).map(<[u8]>::to_vec)
    }
}

impl<'a> FromColumn<'a> for ValueRef<'a> {
    fn from_column(value: ValueRef<'a>) -> ConversionResult<Self> {
        Ok(value)
    }
}

impl<'a> FromColumn<'a> for Value {
    fn from_column(value: ValueRef<'a>) -> ConversionResult<Self> {
        Value::try_from(value)
    }
}

impl<'a, T: FromColumn<'a>> FromColumn<'a> for Option<T> {
    fn from_column(value: ValueRef<'a>) -> ConversionResult<Self> {
        match value {
            ValueRef::Null => Ok(None),
            other => T::from_column(other).map(Some),
        }
    }
}
