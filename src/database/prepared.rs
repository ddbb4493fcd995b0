//! # Prepared Statements
//!
//! A [`Statement`] is one compiled SQL statement plus the lookup tables built
//! when it was prepared. Values are bound by parameter name only; positional
//! `?` markers are refused at prepare time.
//!
//! ## Parameter Names
//!
//! SQLite accepts three named markers. They are interchangeable here: the
//! marker is stripped and the rest lowercased before lookup.
//!
//! | Written in SQL | Bound as                     |
//! |----------------|------------------------------|
//! | `:id`          | `"id"`, `":id"`, `"@ID"`     |
//! | `$id`          | same                         |
//! | `@id`          | same                         |
//!
//! SQLite gives `:id` and `@id` separate slots. Both map to the key `id`;
//! binding `id` writes every slot and [`Statement::parameter_index`] reports
//! the slot of the first occurrence.
//!
//! ## Lifecycle
//!
//! ```text
//! prepare ─► bind* ─► perform/step ─► (reset ─► bind* ─► perform/step)* ─► finalize
//! ```
//!
//! Bindings persist across resets. [`Statement::clear_bindings`] puts every
//! slot back to NULL. Dropping a statement finalizes it.

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::config::{INLINE_PARAMETER_SLOTS, PARAMETER_MARKERS, POSITIONAL_MARKER};
use crate::database::connection::Connection;
use crate::engine::{classify, RawStmt, StepOutcome};
use crate::error::{unrecoverable, Error, Misuse, Result};
use crate::types::Value;

type Slots = SmallVec<[usize; INLINE_PARAMETER_SLOTS]>;

/// A compiled statement bound to the connection that prepared it.
pub struct Statement<'conn> {
    conn: &'conn Connection,
    raw: Option<RawStmt>,
    sql: String,
    parameters: HashMap<String, Slots>,
    parameter_names: Vec<String>,
    columns: Vec<String>,
    column_lookup: HashMap<String, usize>,
}

impl std::fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("parameters", &self.parameter_names)
            .field("columns", &self.columns)
            .field("finalized", &self.raw.is_none())
            .finish()
    }
}

/// Canonical key for a parameter name, with or without its marker.
pub(crate) fn parameter_key(name: &str) -> String {
    let bare = name.strip_prefix(PARAMETER_MARKERS).unwrap_or(name);
    bare.to_lowercase()
}

/// Key for a name reported by the engine; `None` for anything that is not
/// a marker followed by an identifier.
fn engine_parameter_key(name: &str) -> Option<String> {
    if name.starts_with(POSITIONAL_MARKER) {
        return None;
    }
    let bare = name.strip_prefix(PARAMETER_MARKERS)?;
    (!bare.is_empty()).then(|| bare.to_lowercase())
}

/// Refuses a compiled statement with any parameter slot. A positional slot
/// is [`Error::UnnamedParameter`]; otherwise the first named one is
/// reported as [`Misuse::ParameterInExecute`].
pub(crate) fn ensure_parameterless(raw: &RawStmt, sql: &str) -> Result<()> {
    let mut first_named = None;
    for index in 1..=raw.parameter_count() {
        match raw.parameter_name(index).and_then(engine_parameter_key) {
            Some(key) => {
                first_named.get_or_insert(key);
            }
            None => {
                return Err(Error::UnnamedParameter {
                    index,
                    sql: sql.to_owned(),
                })
            }
        }
    }
    match first_named {
        Some(name) => Err(Misuse::ParameterInExecute(name).into()),
        None => Ok(()),
    }
}

impl<'conn> Statement<'conn> {
    /// Builds the lookup tables. Finalizes `raw` when a parameter is
    /// positional. Must be called inside the connection's context.
    pub(crate) fn from_raw(conn: &'conn Connection, raw: RawStmt, sql: &str) -> Result<Self> {
        let mut parameters: HashMap<String, Slots> = HashMap::new();
        let mut parameter_names = Vec::new();
        for index in 1..=raw.parameter_count() {
            let Some(key) = raw.parameter_name(index).and_then(engine_parameter_key) else {
                raw.finalize();
                return Err(Error::UnnamedParameter {
                    index,
                    sql: sql.to_owned(),
                });
            };
            if !parameters.contains_key(&key) {
                parameter_names.push(key.clone());
            }
            parameters.entry(key).or_default().push(index);
        }

        let mut columns = Vec::with_capacity(raw.column_count());
        let mut column_lookup = HashMap::new();
        for index in 0..raw.column_count() {
            let name = raw.column_name(index).unwrap_or_default().to_owned();
            column_lookup.entry(name.to_lowercase()).or_insert(index);
            columns.push(name);
        }

        Ok(Self {
            conn,
            raw: Some(raw),
            sql: sql.to_owned(),
            parameters,
            parameter_names,
            columns,
            column_lookup,
        })
    }

    pub(crate) fn connection(&self) -> &'conn Connection {
        self.conn
    }

    pub(crate) fn raw(&self) -> Result<&RawStmt> {
        self.raw.as_ref().ok_or_else(|| Misuse::Finalized.into())
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn is_finalized(&self) -> bool {
        self.raw.is_none()
    }

    /// Number of distinct parameter names.
    pub fn parameter_count(&self) -> usize {
        self.parameter_names.len()
    }

    /// Parameter names without markers, lowercased, in order of first use.
    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    /// 1-based engine slot of the first occurrence of `name`.
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameters
            .get(&parameter_key(name))
            .and_then(|slots| slots.first().copied())
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// 0-based ordinal of the first result column called `name`, compared
    /// case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_lookup.get(&name.to_lowercase()).copied()
    }

    /// Binds `value` to the parameter `name`, replacing any earlier value.
    ///
    /// ```ignore
    /// stmt.bind(":id", 7)?.bind("name", "seven")?;
    /// ```
    pub fn bind(&mut self, name: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let value = value.into();
        self.bind_value(name, &value)?;
        Ok(self)
    }

    pub fn bind_value(&mut self, name: &str, value: &Value) -> Result<()> {
        let slots = self
            .parameters
            .get(&parameter_key(name))
            .ok_or_else(|| Misuse::UnknownParameter(name.to_owned()))?;
        let raw = &mut self.raw;
        self.conn.context.run(|state| -> Result<()> {
            state.db()?;
            let raw = raw.as_mut().ok_or(Misuse::Finalized)?;
            for &slot in slots {
                raw.bind(slot, value.as_value_ref()).map_err(Error::engine)?;
            }
            Ok(())
        })
    }

    /// Binds several parameters; stops at the first failure.
    pub fn bind_all(&mut self, values: &[(&str, Value)]) -> Result<()> {
        for (name, value) in values {
            self.bind_value(name, value)?;
        }
        Ok(())
    }

    /// Rewinds to the first row. Bindings are kept.
    pub fn reset(&mut self) -> Result<()> {
        let raw = &mut self.raw;
        self.conn.context.run(|state| -> Result<()> {
            state.db()?;
            raw.as_mut().ok_or(Misuse::Finalized)?.reset();
            Ok(())
        })
    }

    /// Returns every parameter to NULL.
    pub fn clear_bindings(&mut self) -> Result<()> {
        let raw = &mut self.raw;
        self.conn.context.run(|state| -> Result<()> {
            state.db()?;
            raw.as_mut().ok_or(Misuse::Finalized)?.clear_bindings();
            Ok(())
        })
    }

    /// Releases the compiled statement. Works on a closed connection; a
    /// second call is [`Misuse::Finalized`].
    pub fn finalize(&mut self) -> Result<()> {
        let raw = self.raw.take().ok_or(Misuse::Finalized)?;
        self.conn.context.run(|_| raw.finalize());
        tracing::trace!(sql = %self.sql, "finalized statement");
        Ok(())
    }

    /// One engine step. `Ok(true)` when a row is available. Must be called
    /// inside the connection's context.
    pub(crate) fn advance(&mut self) -> Result<bool> {
        let raw = self.raw.as_mut().ok_or(Misuse::Finalized)?;
        match classify(raw.step()) {
            StepOutcome::Row => Ok(true),
            StepOutcome::Done | StepOutcome::Ok => Ok(false),
            StepOutcome::Error(code) => Err(Error::engine(raw.db().failure(code))),
            StepOutcome::Unhandled(code) => {
                unrecoverable("step returned an unknown result", code, &raw.db().errmsg())
            }
        }
    }

    /// Reset without the closed check, for use inside the context.
    pub(crate) fn rewind(&mut self) {
        if let Some(raw) = self.raw.as_mut() {
            raw.reset();
        }
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            self.conn.context.run(|_| raw.finalize());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE kv (k TEXT PRIMARY KEY, v)").unwrap();
        conn
    }

    #[test]
    fn parameter_keys_strip_one_marker_and_fold_case() {
        assert_eq!(parameter_key(":Name"), "name");
        assert_eq!(parameter_key("$name"), "name");
        assert_eq!(parameter_key("@NAME"), "name");
        assert_eq!(parameter_key("name"), "name");
        assert_eq!(engine_parameter_key("?1"), None);
        assert_eq!(engine_parameter_key("?"), None);
        assert_eq!(engine_parameter_key(":"), None);
        assert_eq!(engine_parameter_key(":k"), Some("k".to_owned()));
    }

    #[test]
    fn positional_parameters_fail_to_prepare() {
        let conn = conn();
        for sql in ["SELECT ?", "SELECT ?1", "SELECT :a, ?"] {
            let err = conn.prepare(sql).unwrap_err();
            assert!(matches!(err, Error::UnnamedParameter { .. }), "{sql}");
            assert!(err.is_compile());
        }
    }

    #[test]
    fn maps_are_built_at_prepare_time() {
        let conn = conn();
        let stmt = conn
            .prepare("SELECT k AS Key, v AS Value, v AS value FROM kv WHERE k = :K OR v = $v")
            .unwrap();
        assert_eq!(stmt.parameter_names(), ["k", "v"]);
        assert_eq!(stmt.parameter_index("k"), Some(1));
        assert_eq!(stmt.parameter_index("@V"), Some(2));
        assert_eq!(stmt.parameter_index("missing"), None);

        assert_eq!(stmt.column_count(), 3);
        assert_eq!(stmt.column_names(), ["Key", "Value", "value"]);
        assert_eq!(stmt.column_index("KEY"), Some(0));
        assert_eq!(stmt.column_index("value"), Some(1));
        assert_eq!(stmt.column_index("nope"), None);
    }

    #[test]
    fn repeated_names_share_one_entry() {
        let conn = conn();
        let mut stmt = conn.prepare("SELECT :x, @x, :x").unwrap();
        assert_eq!(stmt.parameter_count(), 1);
        assert_eq!(stmt.parameter_index("x"), Some(1));
        assert_eq!(conn.prepare("SELECT @x, :y, :x").unwrap().parameter_index(":X"), Some(1));

        stmt.bind("x", 5).unwrap();
        let row = conn.step(&mut stmt).unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 5);
        assert_eq!(row.get::<i64>(1).unwrap(), 5);
        assert_eq!(row.get::<i64>(2).unwrap(), 5);
    }

    #[test]
    fn unknown_parameter_is_a_contract_error() {
        let conn = conn();
        let mut stmt = conn.prepare("SELECT :a").unwrap();
        let err = stmt.bind("b", 1).unwrap_err();
        assert_eq!(err.misuse(), Some(&Misuse::UnknownParameter("b".into())));
    }

    #[test]
    fn finalize_twice_and_use_after_finalize() {
        let conn = conn();
        let mut stmt = conn.prepare("SELECT :a").unwrap();
        stmt.finalize().unwrap();
        assert!(stmt.is_finalized());
        assert_eq!(stmt.finalize().unwrap_err().misuse(), Some(&Misuse::Finalized));
        assert_eq!(stmt.bind("a", 1).unwrap_err().misuse(), Some(&Misuse::Finalized));
        assert_eq!(stmt.reset().unwrap_err().misuse(), Some(&Misuse::Finalized));
        assert_eq!(
            conn.perform(&mut stmt).unwrap_err().misuse(),
            Some(&Misuse::Finalized)
        );
    }

    #[test]
    fn clear_bindings_reads_back_null() {
        let conn = conn();
        let mut stmt = conn.prepare("SELECT :a").unwrap();
        stmt.bind("a", "set").unwrap();
        stmt.clear_bindings().unwrap();
        let row = conn.step(&mut stmt).unwrap().unwrap();
        assert!(row.is_null(0).unwrap());
    }

    #[test]
    fn bind_all_binds_every_pair() {
        let conn = conn();
        let mut stmt = conn.prepare("INSERT INTO kv (k, v) VALUES (:k, :v)").unwrap();
        stmt.bind_all(&[("k", Value::from("a")), ("v", Value::Blob(vec![1, 2]))])
            .unwrap();
        conn.perform(&mut stmt).unwrap();

        let mut read = conn.prepare("SELECT v FROM kv WHERE k = 'a'").unwrap();
        let row = conn.step(&mut read).unwrap().unwrap();
        assert_eq!(row.get::<Vec<u8>>("v").unwrap(), vec![1, 2]);
    }
}
