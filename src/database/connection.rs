//! # Connection
//!
//! [`Connection`] owns one engine handle and the serialized context that
//! guards it. Everything that reaches the engine, directly or through a
//! [`Statement`] or [`Row`], enters that context first.
//!
//! ## Driving a Statement
//!
//! ```text
//!  perform / perform_with            step
//!  ──────────────────────            ────
//!  loop {                            advance once
//!    advance                           Row  -> Some(Row)
//!      Row  -> callback (or error)     Done -> reset, None
//!      Done -> break                   Err  -> reset, Err
//!      Err  -> break
//!  }
//!  reset (always)
//! ```
//!
//! Bindings survive every reset, so a statement can be re-run with only the
//! changed parameters rebound.
//!
//! ## Ownership Check
//!
//! A statement remembers the connection that prepared it. Handing it to
//! another connection is rejected with [`Misuse::ForeignStatement`] before
//! any engine call is made.

use std::path::{Path, PathBuf};

use crate::database::builder::ConnectionBuilder;
use crate::database::context::{EngineState, SerialContext};
use crate::database::prepared::{ensure_parameterless, Statement};
use crate::database::row::Row;
use crate::database::transaction::TransactionBehavior;
use crate::engine::RawDb;
use crate::error::{Error, Misuse, Result};

/// A single SQLite connection with serialized access.
///
/// `Connection` is `Send + Sync`; share it across threads behind an `Arc`.
/// Calls from different threads never overlap inside the engine and are
/// served in arrival order.
pub struct Connection {
    pub(crate) context: SerialContext,
    path: Option<PathBuf>,
    behavior: TransactionBehavior,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    pub(crate) fn from_parts(db: RawDb, path: Option<PathBuf>, behavior: TransactionBehavior) -> Self {
        Self {
            context: SerialContext::new(db),
            path,
            behavior,
        }
    }

    /// Opens (creating if needed) the database at `path` with default
    /// settings. The literal path `":memory:"` opens a private in-memory
    /// database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        ConnectionBuilder::new().path(path).open()
    }

    pub fn open_in_memory() -> Result<Self> {
        ConnectionBuilder::new().in_memory().open()
    }

    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// File the connection was opened on; `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn behavior(&self) -> TransactionBehavior {
        self.behavior
    }

    /// Compiles exactly one statement.
    ///
    /// Blank SQL is [`Misuse::EmptyStatement`]; SQL holding a second
    /// statement is [`Misuse::TrailingSql`]; positional `?` parameters are
    /// [`Error::UnnamedParameter`].
    pub fn prepare(&self, sql: &str) -> Result<Statement<'_>> {
        self.context.run(|state| self.compile(state, sql))
    }

    fn compile(&self, state: &EngineState, sql: &str) -> Result<Statement<'_>> {
        let db = state.db()?;
        let (raw, rest) = db.prepare(sql).map_err(|failure| Error::Compile {
            code: failure.code,
            message: failure.message,
            sql: sql.to_owned(),
        })?;
        let Some(raw) = raw else {
            return Err(Misuse::EmptyStatement.into());
        };
        if !rest.trim().is_empty() {
            // A tail of comments compiles to nothing and is allowed.
            let extra = match db.prepare(rest) {
                Ok((None, _)) => false,
                Ok((Some(extra), _)) => {
                    extra.finalize();
                    true
                }
                Err(_) => true,
            };
            if extra {
                raw.finalize();
                return Err(Misuse::TrailingSql(rest.trim().to_owned()).into());
            }
        }
        let stmt = Statement::from_raw(self, raw, sql)?;
        tracing::trace!(sql, parameters = stmt.parameter_count(), "prepared statement");
        Ok(stmt)
    }

    /// Runs parameterless SQL, possibly several statements separated by `;`.
    /// Rows are discarded. A statement with a parameter of any kind fails
    /// before it runs: `?` as [`Error::UnnamedParameter`], named markers as
    /// [`Misuse::ParameterInExecute`].
    ///
    /// The whole text runs in one transaction. Inside an already active
    /// transaction it joins that transaction instead, so SQL that manages
    /// transactions itself (`BEGIN`, `VACUUM`) belongs in [`Self::prepare`].
    pub fn execute(&self, sql: &str) -> Result<()> {
        self.context.run(|state| -> Result<()> {
            let db = state.db()?;
            let run = || db.exec_with(sql, ensure_parameterless, Error::engine);
            if state.in_transaction() || !db.is_autocommit() {
                return run();
            }
            self.transaction(|_| run())
        })
    }

    /// Runs `stmt` to completion. A statement that produces a row fails
    /// with [`Misuse::UnexpectedRow`].
    pub fn perform(&self, stmt: &mut Statement<'_>) -> Result<()> {
        self.perform_with(stmt, |_| Err(Error::from(Misuse::UnexpectedRow)))
    }

    /// Runs `stmt` to completion, calling `on_row` for every row.
    ///
    /// The first error, from the engine or from `on_row`, ends the loop and
    /// is returned unchanged. The statement is reset either way.
    pub fn perform_with<E, F>(&self, stmt: &mut Statement<'_>, on_row: F) -> Result<(), E>
    where
        E: From<Error>,
        F: FnMut(&Row<'_>) -> Result<(), E>,
    {
        self.ensure_owned(stmt)?;
        self.context.run(|state| -> Result<(), E> {
            let outcome = drain(state, stmt, on_row);
            stmt.rewind();
            outcome
        })
    }

    /// Advances `stmt` by one step. Returns the current row, or `None` once
    /// the statement is done. The statement is reset on completion and on
    /// error, so the next call starts over.
    pub fn step<'s>(&self, stmt: &'s mut Statement<'_>) -> Result<Option<Row<'s>>> {
        self.ensure_owned(stmt)?;
        let has_row = self.context.run(|state| -> Result<bool> {
            state.db()?;
            let advanced = stmt.advance();
            if !matches!(advanced, Ok(true)) {
                stmt.rewind();
            }
            advanced
        })?;
        if has_row {
            Ok(Some(Row::new(stmt)))
        } else {
            Ok(None)
        }
    }

    fn ensure_owned(&self, stmt: &Statement<'_>) -> Result<()> {
        if std::ptr::eq(stmt.connection(), self) {
            Ok(())
        } else {
            Err(Misuse::ForeignStatement.into())
        }
    }
}

/// The closed check runs before every step: `on_row` may close the
/// connection.
fn drain<E, F>(state: &EngineState, stmt: &mut Statement<'_>, mut on_row: F) -> Result<(), E>
where
    E: From<Error>,
    F: FnMut(&Row<'_>) -> Result<(), E>,
{
    loop {
        state.db()?;
        if !stmt.advance()? {
            return Ok(());
        }
        on_row(&Row::new(stmt))?;
    }
}
