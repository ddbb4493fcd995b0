//! # Transactions
//!
//! [`Connection::transaction`] runs a closure between `BEGIN` and `COMMIT`.
//!
//! ## State Machine
//!
//! ```text
//!          transaction(f)
//!   idle ─────────────────► active ──f → Ok──► COMMIT ───► idle
//!                              │
//!                              ├──f → Err──► ROLLBACK ───► idle (error returned)
//!                              │
//!                              └──f panics─► ROLLBACK ───► idle (panic resumes)
//! ```
//!
//! The closure runs inside the connection's serialized context, so it can
//! prepare, step and execute freely while other threads wait for the whole
//! transaction to finish.
//!
//! ## Rules
//!
//! - No nesting. A transaction started inside another one, or while a raw
//!   `BEGIN` is open, fails with [`Misuse::NestedTransaction`].
//! - `BEGIN`, `COMMIT` and `ROLLBACK` failing is unrecoverable and panics.
//! - When the engine already rolled back on its own (some I/O and constraint
//!   conflict errors do), the final `ROLLBACK` is skipped and a block that
//!   still returned `Ok` gets an engine error instead of a commit.

use crate::config::{COMMIT_SQL, ROLLBACK_SQL};
use crate::database::connection::Connection;
use crate::database::context::EngineState;
use crate::engine::{Failure, RawDb};
use crate::error::{unrecoverable, Error, Misuse, Result};

/// Lock mode taken by `BEGIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionBehavior {
    /// Locks are acquired on first read or write.
    #[default]
    Deferred,
    /// Write lock at `BEGIN`.
    Immediate,
    /// Exclusive lock at `BEGIN`.
    Exclusive,
}

impl TransactionBehavior {
    fn begin_sql(self) -> &'static str {
        match self {
            TransactionBehavior::Deferred => "BEGIN DEFERRED",
            TransactionBehavior::Immediate => "BEGIN IMMEDIATE",
            TransactionBehavior::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

impl Connection {
    /// Runs `f` in a transaction. `Ok` commits, `Err` rolls back and returns
    /// the error unchanged, a panic rolls back and keeps unwinding.
    ///
    /// ```ignore
    /// let id = conn.transaction(|conn| {
    ///     conn.execute("INSERT INTO t (name) VALUES ('a')")?;
    ///     Ok::<_, sqlgate::Error>(conn.last_insert_rowid())
    /// })?;
    /// ```
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&Connection) -> Result<T, E>,
    {
        self.context.run(|state| -> Result<T, E> {
            let db = state.db()?;
            if state.in_transaction() || !db.is_autocommit() {
                return Err(Error::from(Misuse::NestedTransaction).into());
            }
            let active = ActiveTransaction::begin(state, db, self.behavior());
            match f(self) {
                Ok(value) => {
                    active.commit()?;
                    Ok(value)
                }
                Err(err) => {
                    active.rollback();
                    Err(err)
                }
            }
        })
    }

    /// True while a transaction is open, whether started here or by a raw
    /// `BEGIN`.
    pub fn in_transaction(&self) -> bool {
        self.context.run(|state| match state.db() {
            Ok(db) => state.in_transaction() || !db.is_autocommit(),
            Err(_) => false,
        })
    }
}

/// An open transaction. Rolls back on drop unless committed or rolled back
/// explicitly.
struct ActiveTransaction<'s> {
    state: &'s EngineState,
    db: RawDb,
    finished: bool,
}

impl<'s> ActiveTransaction<'s> {
    fn begin(state: &'s EngineState, db: RawDb, behavior: TransactionBehavior) -> Self {
        if let Err(failure) = db.exec(behavior.begin_sql()) {
            unrecoverable("BEGIN failed", failure.code, &failure.message);
        }
        state.set_in_transaction(true);
        tracing::trace!(?behavior, "transaction started");
        Self {
            state,
            db,
            finished: false,
        }
    }

    fn commit(mut self) -> Result<()> {
        if self.db.is_autocommit() {
            self.finish();
            tracing::debug!("transaction was rolled back by the engine");
            return Err(Error::engine(Failure::rolled_back()));
        }
        if let Err(failure) = self.db.exec(COMMIT_SQL) {
            // Drop rolls back while unwinding.
            unrecoverable("COMMIT failed", failure.code, &failure.message);
        }
        self.finish();
        tracing::debug!("transaction committed");
        Ok(())
    }

    fn rollback(mut self) {
        self.roll_back();
    }

    fn roll_back(&mut self) {
        if self.db.is_autocommit() {
            self.finish();
            tracing::debug!("transaction already rolled back by the engine");
            return;
        }
        let result = self.db.exec(ROLLBACK_SQL);
        self.finish();
        match result {
            Ok(()) => tracing::debug!("transaction rolled back"),
            Err(failure) if std::thread::panicking() => {
                tracing::error!(code = failure.code, detail = %failure.message, "ROLLBACK failed while unwinding");
            }
            Err(failure) => unrecoverable("ROLLBACK failed", failure.code, &failure.message),
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.state.set_in_transaction(false);
    }
}

impl Drop for ActiveTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.roll_back();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT UNIQUE)")
            .unwrap();
        conn
    }

    fn count(conn: &Connection) -> i64 {
        let mut stmt = conn.prepare("SELECT COUNT(*) FROM t").unwrap();
        let row = conn.step(&mut stmt).unwrap().unwrap();
        row.get(0).unwrap()
    }

    #[test]
    fn begin_sql_per_behavior() {
        assert_eq!(TransactionBehavior::default(), TransactionBehavior::Deferred);
        assert_eq!(TransactionBehavior::Immediate.begin_sql(), "BEGIN IMMEDIATE");
    }

    #[test]
    fn ok_commits_err_rolls_back() {
        let conn = conn();
        conn.transaction(|c| c.execute("INSERT INTO t (v) VALUES ('a')"))
            .unwrap();
        assert_eq!(count(&conn), 1);

        let err = conn
            .transaction(|c| {
                c.execute("INSERT INTO t (v) VALUES ('b')")?;
                c.execute("INSERT INTO t (v) VALUES ('a')")
            })
            .unwrap_err();
        assert!(err.is_engine());
        assert_eq!(count(&conn), 1);
        assert!(!conn.in_transaction());
    }

    #[test]
    fn nesting_is_rejected() {
        let conn = conn();
        let err = conn
            .transaction(|c| c.transaction(|_| Ok::<_, Error>(())))
            .unwrap_err();
        assert_eq!(err.misuse(), Some(&Misuse::NestedTransaction));

        let mut begin = conn.prepare("BEGIN").unwrap();
        conn.perform(&mut begin).unwrap();
        let err = conn.transaction(|_| Ok::<_, Error>(())).unwrap_err();
        assert_eq!(err.misuse(), Some(&Misuse::NestedTransaction));
        assert!(conn.in_transaction());
    }

    #[test]
    fn panic_rolls_back() {
        let conn = conn();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = conn.transaction(|c| -> Result<()> {
                c.execute("INSERT INTO t (v) VALUES ('x')")?;
                panic!("block failed");
            });
        }));
        assert!(result.is_err());
        assert!(!conn.in_transaction());
        assert_eq!(count(&conn), 0);
    }
}
