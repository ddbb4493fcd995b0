//! # Connection Builder
//!
//! `ConnectionBuilder` configures and opens a [`Connection`]. Settings are
//! chained and applied by `open()`.
//!
//! ## Configuration Options
//!
//! | Option               | Default               | Description                                  |
//! |----------------------|-----------------------|----------------------------------------------|
//! | path / in_memory     | in-memory             | Database file, or a private memory database  |
//! | read_only            | false                 | Open without write access                    |
//! | create_if_missing    | true                  | Create the file when it does not exist       |
//! | busy_timeout         | 5s                    | Engine retry window for a locked file        |
//! | transaction_behavior | `Deferred`            | Lock mode used by `BEGIN`                    |
//!
//! ## Usage
//!
//! ```ignore
//! let conn = Connection::builder()
//!     .path("./app.db")
//!     .busy_timeout(Duration::from_millis(250))
//!     .transaction_behavior(TransactionBehavior::Immediate)
//!     .open()?;
//! ```
//!
//! URI filenames are enabled, so `file:` paths with query parameters
//! (`file:app.db?mode=ro`) work as well.

use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{DEFAULT_BUSY_TIMEOUT, MAX_BUSY_TIMEOUT_MS, MEMORY_PATH};
use crate::database::connection::Connection;
use crate::database::transaction::TransactionBehavior;
use crate::engine::{open_flags, RawDb};
use crate::error::{Error, Misuse, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    Memory,
    File(PathBuf),
}

/// Builder for configuring and opening a [`Connection`].
///
/// Use `Connection::builder()` to create one.
#[derive(Debug, Clone)]
pub struct ConnectionBuilder {
    location: Location,
    read_only: bool,
    create_if_missing: bool,
    busy_timeout: Duration,
    transaction_behavior: TransactionBehavior,
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionBuilder {
    pub fn new() -> Self {
        Self {
            location: Location::Memory,
            read_only: false,
            create_if_missing: true,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            transaction_behavior: TransactionBehavior::default(),
        }
    }

    /// Database file to open. `":memory:"` is the same as [`Self::in_memory`].
    pub fn path<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref();
        self.location = if path == Path::new(MEMORY_PATH) {
            Location::Memory
        } else {
            Location::File(path.to_path_buf())
        };
        self
    }

    pub fn in_memory(mut self) -> Self {
        self.location = Location::Memory;
        self
    }

    /// Opens without write access. Implies the file must already exist.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// How long the engine keeps retrying a locked database before a
    /// statement fails with BUSY. Clamped to `i32::MAX` milliseconds.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn transaction_behavior(mut self, behavior: TransactionBehavior) -> Self {
        self.transaction_behavior = behavior;
        self
    }

    pub fn open(self) -> Result<Connection> {
        let (c_path, path) = match &self.location {
            Location::Memory => (CString::new(MEMORY_PATH).ok(), None),
            Location::File(path) => (
                path.to_str().and_then(|s| CString::new(s).ok()),
                Some(path.clone()),
            ),
        };
        let Some(c_path) = c_path else {
            let shown = path.as_deref().map(|p| p.display().to_string()).unwrap_or_default();
            return Err(Misuse::InvalidPath(shown).into());
        };

        let flags = open_flags(self.read_only, self.create_if_missing);
        let db = RawDb::open(&c_path, flags).map_err(Error::engine)?;
        let millis = self.busy_timeout.as_millis().min(MAX_BUSY_TIMEOUT_MS) as i32;
        db.busy_timeout(millis);

        tracing::debug!(
            path = %c_path.to_string_lossy(),
            read_only = self.read_only,
            busy_timeout_ms = millis,
            behavior = ?self.transaction_behavior,
            "opened connection"
        );
        Ok(Connection::from_parts(db, path, self.transaction_behavior))
    }
}
