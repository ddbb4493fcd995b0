//! # Connection Lifecycle Test Suite
//!
//! Open options, explicit close, use after close, and interoperability with
//! databases written by other SQLite clients.
//!
//! ## Usage
//!
//! ```sh
//! cargo test --test lifecycle
//! ```

use std::time::Duration;

use sqlgate::{Connection, Misuse, Value};
use tempfile::tempdir;

mod close_tests {
    use super::*;

    #[test]
    fn second_close_reports_closed() -> eyre::Result<()> {
        let dir = tempdir()?;
        let conn = Connection::open(dir.path().join("close.db"))?;
        conn.close()?;
        let err = conn.close().unwrap_err();
        assert!(err.is_contract());
        assert_eq!(err.misuse(), Some(&Misuse::Closed));
        Ok(())
    }

    #[test]
    fn everything_after_close_is_closed() -> eyre::Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute("CREATE TABLE t (v)")?;
        let mut stmt = conn.prepare("SELECT v FROM t WHERE v = :v")?;
        conn.close()?;

        let closed = Some(&Misuse::Closed);
        assert_eq!(conn.prepare("SELECT 1").unwrap_err().misuse(), closed);
        assert_eq!(conn.execute("DELETE FROM t").unwrap_err().misuse(), closed);
        assert_eq!(stmt.bind("v", 1).unwrap_err().misuse(), closed);
        assert_eq!(stmt.reset().unwrap_err().misuse(), closed);
        assert_eq!(conn.step(&mut stmt).unwrap_err().misuse(), closed);
        assert_eq!(
            conn.transaction(|_| Ok::<_, sqlgate::Error>(())).unwrap_err().misuse(),
            closed
        );
        assert_eq!(
            conn.migrate(1, |_| Ok::<_, sqlgate::Error>(())).unwrap_err().misuse(),
            closed
        );
        assert_eq!(conn.set_user_version(1).unwrap_err().misuse(), closed);
        assert_eq!(conn.changes(), 0);
        assert!(conn.is_closed());

        stmt.finalize()?;
        Ok(())
    }

    #[test]
    fn close_inside_row_callback_ends_the_loop() -> eyre::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("callback_close.db");
        let conn = Connection::open(&path)?;
        conn.execute("CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1), (2), (3)")?;
        let mut select = conn.prepare("SELECT v FROM t ORDER BY v")?;

        let mut seen = Vec::new();
        let err = conn
            .perform_with(&mut select, |row| {
                seen.push(row.get::<i64>("v")?);
                if seen.len() == 1 {
                    conn.close()?;
                }
                Ok::<_, sqlgate::Error>(())
            })
            .unwrap_err();
        assert_eq!(err.misuse(), Some(&Misuse::Closed));
        assert_eq!(seen, [1]);
        assert_eq!(conn.perform(&mut select).unwrap_err().misuse(), Some(&Misuse::Closed));
        select.finalize()?;

        let check = rusqlite::Connection::open(&path)?;
        let n: i64 = check.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))?;
        assert_eq!(n, 3);
        Ok(())
    }

    #[test]
    fn drop_releases_the_file() -> eyre::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("dropped.db");
        {
            let conn = Connection::open(&path)?;
            conn.execute("CREATE TABLE t (v); INSERT INTO t VALUES ('kept')")?;
        }
        let check = rusqlite::Connection::open(&path)?;
        let v: String = check.query_row("SELECT v FROM t", [], |r| r.get(0))?;
        assert_eq!(v, "kept");
        Ok(())
    }
}

mod open_tests {
    use super::*;

    #[test]
    fn reads_data_written_by_rusqlite() -> eyre::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("foreign.db");
        {
            let writer = rusqlite::Connection::open(&path)?;
            writer.execute_batch(
                "CREATE TABLE kv (k TEXT PRIMARY KEY, v);
                 INSERT INTO kv VALUES ('int', 7), ('real', 1.5), ('text', 'seven'),
                                       ('blob', x'0102'), ('null', NULL);",
            )?;
        }

        let conn = Connection::open(&path)?;
        assert_eq!(conn.path(), Some(path.as_path()));
        let mut select = conn.prepare("SELECT v FROM kv WHERE k = :k")?;
        let expected = [
            ("int", Value::Integer(7)),
            ("real", Value::Real(1.5)),
            ("text", Value::Text("seven".into())),
            ("blob", Value::Blob(vec![1, 2])),
            ("null", Value::Null),
        ];
        for (key, value) in expected {
            select.bind("k", key)?;
            let row = conn.step(&mut select)?.expect("key present");
            assert_eq!(row.get::<Value>("v")?, value, "{key}");
            select.reset()?;
        }
        Ok(())
    }

    #[test]
    fn read_only_rejects_writes() -> eyre::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("ro.db");
        Connection::open(&path)?.execute("CREATE TABLE t (v)")?;

        let conn = Connection::builder().path(&path).read_only(true).open()?;
        let mut insert = conn.prepare("INSERT INTO t VALUES (:v)")?;
        insert.bind("v", 1)?;
        let err = conn.perform(&mut insert).unwrap_err();
        assert!(err.is_engine());
        assert!(err.to_string().contains("readonly"), "{err}");
        Ok(())
    }

    #[test]
    fn missing_file_without_create_is_an_engine_error() -> eyre::Result<()> {
        let dir = tempdir()?;
        let err = Connection::builder()
            .path(dir.path().join("nope.db"))
            .create_if_missing(false)
            .open()
            .unwrap_err();
        assert!(err.is_engine());
        Ok(())
    }

    #[test]
    fn memory_databases_are_private() -> eyre::Result<()> {
        let a = Connection::open(":memory:")?;
        let b = Connection::builder()
            .in_memory()
            .busy_timeout(Duration::from_millis(10))
            .open()?;
        a.execute("CREATE TABLE only_in_a (v)")?;
        assert!(b.prepare("SELECT v FROM only_in_a").unwrap_err().is_compile());
        assert!(a.path().is_none());
        Ok(())
    }
}
