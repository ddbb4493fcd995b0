//! # Engine Metadata
//!
//! Values the engine tracks per connection: the schema version kept in the
//! database header, the rowid of the last insert, and the row count of the
//! last write.
//!
//! | Accessor              | Source                          | Closed connection |
//! |-----------------------|---------------------------------|-------------------|
//! | `user_version`        | `PRAGMA user_version`           | `Misuse::Closed`  |
//! | `set_user_version`    | `PRAGMA user_version = N`       | `Misuse::Closed`  |
//! | `last_insert_rowid`   | `sqlite3_last_insert_rowid`     | `0`               |
//! | `changes`             | `sqlite3_changes`               | `0`               |
//!
//! The engine stores `user_version` as a signed 32-bit integer. Failing to
//! read or write it means the database file is unusable and panics.

use crate::config::USER_VERSION_PRAGMA;
use crate::database::connection::Connection;
use crate::error::{unrecoverable, Result};

impl Connection {
    pub fn user_version(&self) -> Result<i32> {
        self.context.run(|state| -> Result<i32> {
            let db = state.db()?;
            let raw = match db.query_integer(USER_VERSION_PRAGMA) {
                Ok(value) => value.unwrap_or(0),
                Err(failure) => {
                    unrecoverable("reading user_version failed", failure.code, &failure.message)
                }
            };
            match i32::try_from(raw) {
                Ok(version) => Ok(version),
                Err(_) => unrecoverable("user_version outside 32-bit range", 0, &raw.to_string()),
            }
        })
    }

    pub fn set_user_version(&self, version: i32) -> Result<()> {
        self.context.run(|state| -> Result<()> {
            let db = state.db()?;
            if let Err(failure) = db.exec(&format!("{USER_VERSION_PRAGMA} = {version}")) {
                unrecoverable("writing user_version failed", failure.code, &failure.message);
            }
            Ok(())
        })
    }

    /// Rowid of the most recent successful insert on this connection.
    pub fn last_insert_rowid(&self) -> i64 {
        self.context
            .run(|state| state.db().map_or(0, |db| db.last_insert_rowid()))
    }

    /// Rows touched by the most recent INSERT, UPDATE or DELETE.
    pub fn changes(&self) -> u64 {
        self.context
            .run(|state| state.db().map_or(0, |db| db.changes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_version_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(conn.user_version().unwrap(), 0);
        conn.set_user_version(-3).unwrap();
        assert_eq!(conn.user_version().unwrap(), -3);
        conn.set_user_version(i32::MAX).unwrap();
        assert_eq!(conn.user_version().unwrap(), i32::MAX);
    }

    #[test]
    fn rowid_and_changes_track_writes() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (v)").unwrap();
        conn.execute("INSERT INTO t VALUES (1), (2), (3)").unwrap();
        assert_eq!(conn.last_insert_rowid(), 3);
        assert_eq!(conn.changes(), 3);

        conn.execute("DELETE FROM t WHERE v > 1").unwrap();
        assert_eq!(conn.changes(), 2);
    }
}
