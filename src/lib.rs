//! # sqlgate - Serialized, Named-Parameter SQLite Access
//!
//! sqlgate sits in front of SQLite's statement API and makes it hard to use
//! wrong:
//!
//! - **Named binding only**: `:name`, `$name` and `@name` are interchangeable;
//!   positional `?` parameters are refused when the statement is prepared
//! - **Typed rows**: columns read by name or ordinal into Rust types, with
//!   NULL either defaulted or surfaced as `Option`
//! - **Serialized access**: one connection can be shared across threads and
//!   calls into the engine never interleave
//! - **Transactions and migrations**: closures that commit on `Ok`, roll back
//!   on `Err` or panic, and ordered schema versions kept in `user_version`
//!
//! ## Quick Start
//!
//! ```ignore
//! use sqlgate::Connection;
//!
//! let conn = Connection::open("./app.db")?;
//! conn.migrate(1, |c| c.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)"))?;
//!
//! let mut insert = conn.prepare("INSERT INTO users (name) VALUES (:name)")?;
//! insert.bind("name", "Alice")?;
//! conn.perform(&mut insert)?;
//!
//! let mut select = conn.prepare("SELECT name FROM users WHERE id = :id")?;
//! select.bind("id", conn.last_insert_rowid())?;
//! if let Some(row) = conn.step(&mut select)? {
//!     assert_eq!(row.get::<&str>("name")?, "Alice");
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Connection / Statement / Row            │  database
//! ├─────────────────────────────────────────┤
//! │ Serialized context (ReentrantMutex)     │  database::context
//! ├─────────────────────────────────────────┤
//! │ Raw handles, result classification      │  engine (all unsafe code)
//! ├─────────────────────────────────────────┤
//! │ SQLite C API (rusqlite::ffi, bundled)   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`database`]: connections, statements, rows, transactions, migrations
//! - [`types`]: dynamic values and column conversions
//! - [`error`]: the error taxonomy
//! - [`config`]: shared constants

pub mod config;
pub mod database;
mod engine;
pub mod error;
pub mod types;

pub use database::{ColumnIndex, Connection, ConnectionBuilder, Row, Statement, TransactionBehavior};
pub use error::{Error, ErrorKind, Misuse, Result};
pub use types::{FromColumn, Value, ValueKind, ValueRef};
