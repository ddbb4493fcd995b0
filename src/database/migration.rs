//! # Schema Migrations
//!
//! Migrations are numbered blocks applied in order. The schema version lives
//! in the database header (`PRAGMA user_version`), so it survives reopening.
//!
//! ```text
//! migrate(v, f), with current = user_version
//!
//!   v <= current      → nothing happens
//!   v == current + 1  → BEGIN; f; user_version = v; COMMIT
//!   otherwise         → Misuse::MigrationOutOfOrder, f never runs
//! ```
//!
//! The version check and the apply run inside one pass through the
//! serialized context, so two threads racing the same migration cannot both
//! apply it. A failing block rolls back both its changes and the version bump.
//!
//! ## Usage
//!
//! ```ignore
//! conn.migrate(1, |c| c.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)"))?;
//! conn.migrate(2, |c| c.execute("ALTER TABLE users ADD COLUMN email TEXT"))?;
//! ```

use crate::database::connection::Connection;
use crate::error::{Error, Misuse, Result};

impl Connection {
    /// Applies migration `version` if the database is exactly one version
    /// behind it.
    pub fn migrate<E, F>(&self, version: i32, f: F) -> Result<(), E>
    where
        E: From<Error>,
        F: FnOnce(&Connection) -> Result<(), E>,
    {
        self.context.run(|_| -> Result<(), E> {
            let current = self.user_version()?;
            if version <= current {
                tracing::trace!(version, current, "migration already applied");
                return Ok(());
            }
            if current.checked_add(1) != Some(version) {
                return Err(Error::from(Misuse::MigrationOutOfOrder {
                    current,
                    requested: version,
                })
                .into());
            }
            self.transaction(|conn| -> Result<(), E> {
                f(conn)?;
                conn.set_user_version(version)?;
                Ok(())
            })?;
            tracing::info!(version, "applied migration");
            Ok(())
        })
    }
}
