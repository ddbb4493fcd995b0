//! # Engine Boundary
//!
//! Thin handles over the SQLite C API, reached through `rusqlite::ffi` (the
//! bundled `libsqlite3-sys` build). This is the only module that contains
//! `unsafe` code or C types; everything above it works with [`RawDb`],
//! [`RawStmt`], [`StepOutcome`] and [`Failure`].
//!
//! ## Surface
//!
//! ```text
//! RawDb   open / close / busy_timeout / prepare / exec(_with) / query_integer / errmsg
//!         last_insert_rowid / changes / is_autocommit
//! RawStmt step / reset / clear_bindings / finalize
//!         parameter_count / parameter_name / bind
//!         column_count / column_name / column_value
//! ```
//!
//! ## Ownership
//!
//! Neither handle type closes or finalizes on drop. The database layer owns
//! that decision because it must happen inside the serialized context, and
//! because a closed connection still has to let statements finalize.
//!
//! Connections are closed with `sqlite3_close_v2`, which defers the actual
//! teardown until every outstanding statement has been finalized.

use std::ffi::{c_char, c_int, CStr};
use std::ptr;

use rusqlite::ffi;

use crate::error::unrecoverable;
use crate::types::{ValueKind, ValueRef};

/// A non-OK engine result with the engine's diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Failure {
    pub code: i32,
    pub message: String,
}

impl Failure {
    pub fn from_code(code: c_int) -> Self {
        Self {
            code,
            message: errstr(code),
        }
    }

    /// The engine ended the transaction on its own before COMMIT was issued.
    pub fn rolled_back() -> Self {
        Self {
            code: ffi::SQLITE_ABORT,
            message: "transaction was rolled back by the engine before commit".to_owned(),
        }
    }
}

/// Classification of one `sqlite3_step` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    Row,
    Done,
    Ok,
    Error(c_int),
    Unhandled(c_int),
}

pub(crate) fn classify(rc: c_int) -> StepOutcome {
    match rc {
        ffi::SQLITE_ROW => StepOutcome::Row,
        ffi::SQLITE_DONE => StepOutcome::Done,
        ffi::SQLITE_OK => StepOutcome::Ok,
        rc if is_error_code(rc) => StepOutcome::Error(rc),
        rc => StepOutcome::Unhandled(rc),
    }
}

fn is_error_code(rc: c_int) -> bool {
    let primary = rc & 0xff;
    (ffi::SQLITE_ERROR..=ffi::SQLITE_WARNING).contains(&primary)
}

pub(crate) fn errstr(code: c_int) -> String {
    // SAFETY: sqlite3_errstr returns a static string for every input.
    unsafe {
        let msg = ffi::sqlite3_errstr(code);
        if msg.is_null() {
            format!("engine error {code}")
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }
}

pub(crate) fn open_flags(read_only: bool, create: bool) -> c_int {
    let mode = if read_only {
        ffi::SQLITE_OPEN_READONLY
    } else if create {
        ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE
    } else {
        ffi::SQLITE_OPEN_READWRITE
    };
    // Access is serialized above this layer, so the engine's own mutex is
    // redundant.
    mode | ffi::SQLITE_OPEN_URI | ffi::SQLITE_OPEN_NOMUTEX
}

fn c_len(len: usize) -> Option<c_int> {
    c_int::try_from(len).ok()
}

/// Raw connection handle. `Copy` so it can live in a `Cell`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawDb(*mut ffi::sqlite3);

// SAFETY: the handle is only dereferenced inside the connection's serialized
// context, which never lets two threads call into it at once.
unsafe impl Send for RawDb {}

impl RawDb {
    pub const NULL: RawDb = RawDb(ptr::null_mut());

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    pub fn open(path: &CStr, flags: c_int) -> Result<RawDb, Failure> {
        let mut db = ptr::null_mut();
        // SAFETY: path is NUL-terminated, db is a valid out-pointer.
        let rc = unsafe { ffi::sqlite3_open_v2(path.as_ptr(), &mut db, flags, ptr::null()) };
        if rc == ffi::SQLITE_OK {
            return Ok(RawDb(db));
        }
        if db.is_null() {
            return Err(Failure::from_code(rc));
        }
        let failure = RawDb(db).failure(rc);
        // SAFETY: open allocated a handle even though it failed.
        unsafe { ffi::sqlite3_close(db) };
        Err(failure)
    }

    pub fn close(self) -> Result<(), Failure> {
        // SAFETY: close_v2 on a live handle; statements may still be open.
        let rc = unsafe { ffi::sqlite3_close_v2(self.0) };
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(Failure::from_code(rc))
        }
    }

    pub fn busy_timeout(self, millis: c_int) -> c_int {
        // SAFETY: live handle.
        unsafe { ffi::sqlite3_busy_timeout(self.0, millis) }
    }

    pub fn failure(self, code: c_int) -> Failure {
        Failure {
            code,
            message: self.errmsg(),
        }
    }

    pub fn errmsg(self) -> String {
        // SAFETY: the message is owned by the handle and copied out at once.
        unsafe {
            let msg = ffi::sqlite3_errmsg(self.0);
            if msg.is_null() {
                errstr(ffi::SQLITE_ERROR)
            } else {
                CStr::from_ptr(msg).to_string_lossy().into_owned()
            }
        }
    }

    /// Compiles the first statement of `sql`. Returns `None` for text that
    /// holds no statement (whitespace, comments) plus the uncompiled tail.
    pub fn prepare(self, sql: &str) -> Result<(Option<RawStmt>, &str), Failure> {
        let Some(len) = c_len(sql.len()) else {
            return Err(Failure::from_code(ffi::SQLITE_TOOBIG));
        };
        let mut stmt = ptr::null_mut();
        let mut tail: *const c_char = ptr::null();
        // SAFETY: sql is valid for len bytes; the engine reads no further
        // because nByte is given.
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(self.0, sql.as_ptr().cast(), len, &mut stmt, &mut tail)
        };
        if rc != ffi::SQLITE_OK {
            return Err(self.failure(rc));
        }
        let consumed = if tail.is_null() {
            sql.len()
        } else {
            tail as usize - sql.as_ptr() as usize
        };
        let rest = sql.get(consumed..).unwrap_or("");
        let stmt = (!stmt.is_null()).then_some(RawStmt(stmt));
        Ok((stmt, rest))
    }

    /// Reads the first column of the first row `sql` produces.
    pub fn query_integer(self, sql: &str) -> Result<Option<i64>, Failure> {
        let (stmt, _) = self.prepare(sql)?;
        let Some(mut stmt) = stmt else {
            return Err(Failure::from_code(ffi::SQLITE_MISUSE));
        };
        let result = match classify(stmt.step()) {
            StepOutcome::Row => match stmt.column_value(0) {
                ValueRef::Integer(i) => Ok(Some(i)),
                _ => Ok(None),
            },
            StepOutcome::Done | StepOutcome::Ok => Ok(None),
            StepOutcome::Error(rc) | StepOutcome::Unhandled(rc) => Err(self.failure(rc)),
        };
        stmt.finalize();
        result
    }

    /// Runs every statement in `sql`, discarding produced rows.
    pub fn exec(self, sql: &str) -> Result<(), Failure> {
        self.exec_with(sql, |_, _| Ok(()), |failure| failure)
    }

    /// [`Self::exec`] with `check` run on each compiled statement, and its
    /// SQL text, before the statement is stepped. A failed check stops the
    /// loop; statements already run stay run.
    pub fn exec_with<E>(
        self,
        sql: &str,
        mut check: impl FnMut(&RawStmt, &str) -> Result<(), E>,
        lift: impl Fn(Failure) -> E,
    ) -> Result<(), E> {
        let mut remaining = sql;
        loop {
            let (stmt, rest) = self.prepare(remaining).map_err(&lift)?;
            if let Some(mut stmt) = stmt {
                let text = remaining[..remaining.len() - rest.len()].trim();
                if let Err(err) = check(&stmt, text) {
                    stmt.finalize();
                    return Err(err);
                }
                let result = loop {
                    match classify(stmt.step()) {
                        StepOutcome::Row => continue,
                        StepOutcome::Done | StepOutcome::Ok => break Ok(()),
                        StepOutcome::Error(rc) => break Err(self.failure(rc)),
                        StepOutcome::Unhandled(rc) => {
                            unrecoverable("exec", rc, &self.errmsg())
                        }
                    }
                };
                stmt.finalize();
                result.map_err(&lift)?;
            }
            if rest.len() == remaining.len() || rest.trim().is_empty() {
                return Ok(());
            }
            remaining = rest;
        }
    }

    pub fn last_insert_rowid(self) -> i64 {
        // SAFETY: live handle.
        unsafe { ffi::sqlite3_last_insert_rowid(self.0) }
    }

    pub fn changes(self) -> u64 {
        // SAFETY: live handle.
        let n = unsafe { ffi::sqlite3_changes(self.0) };
        u64::try_from(n).unwrap_or(0)
    }

    pub fn is_autocommit(self) -> bool {
        // SAFETY: live handle.
        unsafe { ffi::sqlite3_get_autocommit(self.0) != 0 }
    }
}

/// Raw compiled statement handle.
#[derive(Debug)]
pub(crate) struct RawStmt(*mut ffi::sqlite3_stmt);

impl RawStmt {
    pub fn step(&mut self) -> c_int {
        // SAFETY: live statement.
        unsafe { ffi::sqlite3_step(self.0) }
    }

    pub fn reset(&mut self) -> c_int {
        // SAFETY: live statement.
        unsafe { ffi::sqlite3_reset(self.0) }
    }

    pub fn clear_bindings(&mut self) -> c_int {
        // SAFETY: live statement.
        unsafe { ffi::sqlite3_clear_bindings(self.0) }
    }

    pub fn finalize(self) -> c_int {
        // SAFETY: consumes the handle, so it cannot be used again.
        unsafe { ffi::sqlite3_finalize(self.0) }
    }

    /// Connection that compiled this statement, used for error text.
    pub fn db(&self) -> RawDb {
        // SAFETY: live statement.
        RawDb(unsafe { ffi::sqlite3_db_handle(self.0) })
    }

    pub fn parameter_count(&self) -> usize {
        // SAFETY: live statement.
        let n = unsafe { ffi::sqlite3_bind_parameter_count(self.0) };
        usize::try_from(n).unwrap_or(0)
    }

    /// Name of the 1-based parameter slot, marker included (`:id`, `?2`).
    pub fn parameter_name(&self, index: usize) -> Option<&str> {
        let index = c_len(index)?;
        // SAFETY: the name lives as long as the statement.
        unsafe {
            let name = ffi::sqlite3_bind_parameter_name(self.0, index);
            if name.is_null() {
                None
            } else {
                CStr::from_ptr(name).to_str().ok()
            }
        }
    }

    pub fn column_count(&self) -> usize {
        // SAFETY: live statement.
        let n = unsafe { ffi::sqlite3_column_count(self.0) };
        usize::try_from(n).unwrap_or(0)
    }

    pub fn column_name(&self, index: usize) -> Option<&str> {
        let index = c_len(index)?;
        // SAFETY: the name lives until the statement is finalized or
        // re-prepared; the borrow is tied to &self.
        unsafe {
            let name = ffi::sqlite3_column_name(self.0, index);
            if name.is_null() {
                None
            } else {
                CStr::from_ptr(name).to_str().ok()
            }
        }
    }

    /// Binds `value` at the 1-based slot `index`.
    pub fn bind(&mut self, index: usize, value: ValueRef<'_>) -> Result<(), Failure> {
        match self.bind_code(index, value) {
            ffi::SQLITE_OK => Ok(()),
            rc => Err(self.db().failure(rc)),
        }
    }

    fn bind_code(&mut self, index: usize, value: ValueRef<'_>) -> c_int {
        let Some(index) = c_len(index) else {
            return ffi::SQLITE_RANGE;
        };
        // SAFETY: live statement; text and blob are copied by the engine
        // (SQLITE_TRANSIENT) before the call returns.
        unsafe {
            match value {
                ValueRef::Null => ffi::sqlite3_bind_null(self.0, index),
                ValueRef::Integer(i) => ffi::sqlite3_bind_int64(self.0, index, i),
                ValueRef::Real(f) => ffi::sqlite3_bind_double(self.0, index, f),
                ValueRef::Text(t) => match c_len(t.len()) {
                    Some(len) => ffi::sqlite3_bind_text(
                        self.0,
                        index,
                        t.as_ptr().cast(),
                        len,
                        ffi::SQLITE_TRANSIENT(),
                    ),
                    None => ffi::SQLITE_TOOBIG,
                },
                ValueRef::Blob([]) => ffi::sqlite3_bind_zeroblob(self.0, index, 0),
                ValueRef::Blob(b) => match c_len(b.len()) {
                    Some(len) => ffi::sqlite3_bind_blob(
                        self.0,
                        index,
                        b.as_ptr().cast(),
                        len,
                        ffi::SQLITE_TRANSIENT(),
                    ),
                    None => ffi::SQLITE_TOOBIG,
                },
            }
        }
    }

    pub fn column_kind(&self, index: usize) -> ValueKind {
        let Some(index) = c_len(index) else {
            return ValueKind::Null;
        };
        // SAFETY: live statement positioned on a row.
        match unsafe { ffi::sqlite3_column_type(self.0, index) } {
            ffi::SQLITE_INTEGER => ValueKind::Integer,
            ffi::SQLITE_FLOAT => ValueKind::Real,
            ffi::SQLITE_TEXT => ValueKind::Text,
            ffi::SQLITE_BLOB => ValueKind::Blob,
            _ => ValueKind::Null,
        }
    }

    /// Reads the 0-based column of the current row without converting its
    /// storage class, so earlier borrowed values stay valid.
    pub fn column_value(&self, index: usize) -> ValueRef<'_> {
        let kind = self.column_kind(index);
        let Some(col) = c_len(index) else {
            return ValueRef::Null;
        };
        // SAFETY: live statement positioned on a row; pointers returned for
        // text and blob stay valid until the next step, reset or finalize,
        // all of which need &mut self.
        unsafe {
            match kind {
                ValueKind::Null => ValueRef::Null,
                ValueKind::Integer => ValueRef::Integer(ffi::sqlite3_column_int64(self.0, col)),
                ValueKind::Real => ValueRef::Real(ffi::sqlite3_column_double(self.0, col)),
                ValueKind::Text => {
                    let data = ffi::sqlite3_column_text(self.0, col);
                    let len = ffi::sqlite3_column_bytes(self.0, col);
                    ValueRef::Text(raw_slice(data.cast(), len))
                }
                ValueKind::Blob => {
                    let data = ffi::sqlite3_column_blob(self.0, col);
                    let len = ffi::sqlite3_column_bytes(self.0, col);
                    ValueRef::Blob(raw_slice(data.cast(), len))
                }
            }
        }
    }
}

/// # Safety
/// `data` must be null or valid for `len` bytes for the returned lifetime.
unsafe fn raw_slice<'a>(data: *const u8, len: c_int) -> &'a [u8] {
    match usize::try_from(len) {
        Ok(len) if len > 0 && !data.is_null() => std::slice::from_raw_parts(data, len),
        _ => &[],
    }
}
