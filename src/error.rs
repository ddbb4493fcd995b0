//! # Error Taxonomy
//!
//! Every recoverable failure surfaces as [`Error`]. Variants fall into three
//! kinds, reported by [`Error::kind`]:
//!
//! | Kind       | Variants                                   | Cause                                  |
//! |------------|--------------------------------------------|----------------------------------------|
//! | `Compile`  | `Compile`, `UnnamedParameter`              | SQL rejected at prepare time           |
//! | `Engine`   | `Engine`                                   | non-OK result from step/bind/exec      |
//! | `Contract` | `Misuse(_)`                                | caller broke the API contract          |
//!
//! None of them is retried internally.
//!
//! ## Unrecoverable Conditions
//!
//! A step result outside the documented set, a failed BEGIN/COMMIT/ROLLBACK,
//! or a failed `user_version` read/write means the engine or this binding
//! layer is in a state it cannot leave safely. Those paths go through
//! [`unrecoverable`], which logs and panics. They are deliberately not
//! variants of [`Error`] so no caller can swallow them by accident.

use thiserror::Error;

use crate::engine::Failure;
use crate::types::ValueKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Compile,
    Engine,
    Contract,
}

#[derive(Debug, Error)]
pub enum Error {
    /// The engine refused to compile the SQL text.
    #[error("failed to prepare `{sql}`: {message} (code {code})")]
    Compile {
        code: i32,
        message: String,
        sql: String,
    },

    /// A parameter slot has no name, or uses the positional `?` marker.
    #[error("parameter #{index} in `{sql}` is unnamed; use :name, $name or @name")]
    UnnamedParameter { index: usize, sql: String },

    /// A non-OK result code from step, bind, reset, or exec.
    #[error("{message} (code {code})")]
    Engine { code: i32, message: String },

    #[error(transparent)]
    Misuse(#[from] Misuse),
}

/// Contract violations: the engine is fine, the call was not.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Misuse {
    #[error("connection is closed")]
    Closed,

    #[error("statement has been finalized")]
    Finalized,

    #[error("statement was prepared on a different connection")]
    ForeignStatement,

    #[error("SQL text contains no statement")]
    EmptyStatement,

    #[error("SQL text contains more than one statement; trailing text: `{0}`")]
    TrailingSql(String),

    #[error("database path `{0}` is not valid UTF-8 or contains a NUL byte")]
    InvalidPath(String),

    #[error("`execute` takes no parameters, but the SQL uses `{0}`; prepare and bind it instead")]
    ParameterInExecute(String),

    #[error("statement produced a row but no row callback was supplied")]
    UnexpectedRow,

    #[error("no parameter named `{0}`")]
    UnknownParameter(String),

    #[error("no column named `{0}`")]
    UnknownColumn(String),

    #[error("column index {index} out of range ({count} columns)")]
    ColumnOutOfRange { index: usize, count: usize },

    #[error("column {column}: cannot read {found} as {expected}")]
    ColumnType {
        column: usize,
        expected: &'static str,
        found: ValueKind,
    },

    #[error("column {column}: text is not valid UTF-8")]
    InvalidUtf8 { column: usize },

    #[error("a transaction is already active on this connection")]
    NestedTransaction,

    #[error("cannot close a connection from inside its own transaction")]
    CloseInTransaction,

    #[error("migration {requested} out of order: database is at version {current}")]
    MigrationOutOfOrder { current: i32, requested: i32 },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Compile { .. } | Error::UnnamedParameter { .. } => ErrorKind::Compile,
            Error::Engine { .. } => ErrorKind::Engine,
            Error::Misuse(_) => ErrorKind::Contract,
        }
    }

    pub fn is_compile(&self) -> bool {
        self.kind() == ErrorKind::Compile
    }

    pub fn is_engine(&self) -> bool {
        self.kind() == ErrorKind::Engine
    }

    pub fn is_contract(&self) -> bool {
        self.kind() == ErrorKind::Contract
    }

    /// Engine result code, when the engine produced this error.
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Compile { code, .. } | Error::Engine { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn misuse(&self) -> Option<&Misuse> {
        match self {
            Error::Misuse(m) => Some(m),
            _ => None,
        }
    }

    pub(crate) fn engine(failure: Failure) -> Self {
        Error::Engine {
            code: failure.code,
            message: failure.message,
        }
    }
}

/// Logs and aborts the current operation on a broken engine invariant.
#[cold]
#[track_caller]
pub(crate) fn unrecoverable(context: &str, code: i32, message: &str) -> ! {
    tracing::error!(code, detail = message, "unrecoverable engine condition: {}", context);
    panic!("unrecoverable engine condition: {context}: {message} (code {code})");
}
