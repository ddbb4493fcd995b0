//! # Database Module
//!
//! The connection-level API: open a [`Connection`], prepare [`Statement`]s,
//! bind by name, step through [`Row`]s, group work in transactions and
//! migrations.
//!
//! ## Architecture
//!
//! ```text
//!   Connection ──────────────┐
//!     │ prepare              │ owns
//!     ▼                      ▼
//!   Statement<'conn> ──► SerialContext (ReentrantMutex<EngineState>)
//!     │ step / perform       │
//!     ▼                      ▼
//!   Row<'stmt> ─────────► engine (sqlite3 / sqlite3_stmt)
//! ```
//!
//! Every arrow into the engine passes through the connection's
//! [`SerialContext`](context::SerialContext). Statements and rows borrow the
//! connection, so neither can outlive it, and a row can never be read after
//! its statement moved on.
//!
//! ## Module Organization
//!
//! - `connection`: `Connection`, prepare / execute / perform / step
//! - `builder`: `ConnectionBuilder` open options
//! - `context`: the serialized execution context
//! - `prepared`: `Statement`, parameter and column maps, binding
//! - `row`: `Row`, `ColumnIndex`, typed column reads
//! - `transaction`: `Connection::transaction`, `TransactionBehavior`
//! - `migration`: `Connection::migrate`
//! - `pragma`: user version, last rowid, change count
//! - `lifecycle`: close and drop
//!
//! ## Usage
//!
//! ```ignore
//! use sqlgate::Connection;
//!
//! let conn = Connection::open("./app.db")?;
//! conn.migrate(1, |c| c.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)"))?;
//!
//! let mut insert = conn.prepare("INSERT INTO users (name) VALUES (:name)")?;
//! for name in ["ada", "grace"] {
//!     insert.bind("name", name)?;
//!     conn.perform(&mut insert)?;
//! }
//!
//! let mut select = conn.prepare("SELECT id, name FROM users ORDER BY id")?;
//! conn.perform_with(&mut select, |row| {
//!     println!("{} {}", row.get::<i64>("id")?, row.get::<&str>("name")?);
//!     Ok::<_, sqlgate::Error>(())
//! })?;
//! ```

mod builder;
mod connection;
mod context;
mod lifecycle;
mod migration;
mod pragma;
mod prepared;
mod row;
mod transaction;

pub use builder::ConnectionBuilder;
pub use connection::Connection;
pub use prepared::Statement;
pub use row::{ColumnIndex, Row};
pub use transaction::TransactionBehavior;
