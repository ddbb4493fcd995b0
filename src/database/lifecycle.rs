//! # Connection Lifecycle
//!
//! `close()` releases the engine handle explicitly; dropping the connection
//! does the same for handles that are still open.
//!
//! ## Close
//!
//! Closing runs inside the serialized context, so it waits for work already
//! queued from other threads. Afterwards every engine operation fails with
//! [`Misuse::Closed`], including a second `close()`. Statements that are
//! still alive can be finalized (or dropped) after close; the engine defers
//! tearing down the handle until the last one is gone.
//!
//! Closing from inside a transaction block on the same connection is refused
//! with [`Misuse::CloseInTransaction`].
//!
//! ## Usage
//!
//! ```ignore
//! let conn = Connection::open("./app.db")?;
//! // ... use connection ...
//! conn.close()?;
//! ```

use crate::database::connection::Connection;
use crate::error::{Error, Misuse, Result};

impl Connection {
    pub fn close(&self) -> Result<()> {
        self.context.run(|state| -> Result<()> {
            let db = state.db()?;
            if state.in_transaction() {
                return Err(Misuse::CloseInTransaction.into());
            }
            db.close().map_err(Error::engine)?;
            state.take_db();
            tracing::debug!(path = ?self.path(), "closed connection");
            Ok(())
        })
    }

    pub fn is_closed(&self) -> bool {
        self.context.run(|state| state.is_closed())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let Some(db) = self.context.run(|state| state.take_db()) else {
            return;
        };
        match db.close() {
            Ok(()) => tracing::debug!(path = ?self.path(), "closed connection on drop"),
            Err(failure) => tracing::warn!(
                path = ?self.path(),
                code = failure.code,
                detail = %failure.message,
                "failed to close connection on drop"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_twice_is_closed_error() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(!conn.is_closed());
        conn.close().unwrap();
        assert!(conn.is_closed());
        assert_eq!(conn.close().unwrap_err().misuse(), Some(&Misuse::Closed));
    }

    #[test]
    fn operations_after_close_fail() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (v)").unwrap();
        let mut stmt = conn.prepare("INSERT INTO t VALUES (:v)").unwrap();
        conn.close().unwrap();

        let closed = Some(&Misuse::Closed);
        assert_eq!(conn.prepare("SELECT 1").unwrap_err().misuse(), closed);
        assert_eq!(conn.execute("SELECT 1").unwrap_err().misuse(), closed);
        assert_eq!(stmt.bind("v", 1).unwrap_err().misuse(), closed);
        assert_eq!(conn.perform(&mut stmt).unwrap_err().misuse(), closed);
        assert_eq!(conn.user_version().unwrap_err().misuse(), closed);
        assert_eq!(conn.last_insert_rowid(), 0);
        assert!(!conn.in_transaction());

        // still releasable after close
        stmt.finalize().unwrap();
    }

    #[test]
    fn close_inside_transaction_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        let err = conn.transaction(|c| c.close()).unwrap_err();
        assert_eq!(err.misuse(), Some(&Misuse::CloseInTransaction));
        assert!(!conn.is_closed());
    }
}
