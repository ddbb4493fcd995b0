//! # Concurrent Access Test Suite
//!
//! One `Connection` shared by several threads. Work submitted from different
//! threads must never interleave inside the engine: a transaction or a
//! statement run by one thread is observed as a single unit by the others.
//!
//! ## Test Categories
//!
//! 1. **Ordering**: transactions from many threads land as contiguous blocks
//! 2. **Blocking**: a thread inside a transaction holds everyone else off
//! 3. **Shared statements**: per-thread statements on one connection
//!
//! ## Usage
//!
//! ```sh
//! cargo test --test concurrent_access --release
//! ```

use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use sqlgate::{Connection, Error};
use tempfile::tempdir;

const THREADS: i64 = 4;
const BATCHES: i64 = 40;
const BATCH_SIZE: i64 = 5;

fn create_shared_db() -> eyre::Result<(tempfile::TempDir, Arc<Connection>)> {
    let dir = tempdir()?;
    let conn = Connection::open(dir.path().join("shared.db"))?;
    conn.execute(
        "CREATE TABLE events (
            seq INTEGER PRIMARY KEY,
            worker INTEGER NOT NULL,
            batch INTEGER NOT NULL,
            slot INTEGER NOT NULL
        )",
    )?;
    Ok((dir, Arc::new(conn)))
}

fn read_events(conn: &Connection) -> Result<Vec<(i64, i64, i64)>, Error> {
    let mut select = conn.prepare("SELECT worker, batch, slot FROM events ORDER BY seq")?;
    let mut events = Vec::new();
    conn.perform_with(&mut select, |row| {
        events.push((row.get("worker")?, row.get("batch")?, row.get("slot")?));
        Ok::<_, Error>(())
    })?;
    Ok(events)
}

mod ordering_tests {
    use super::*;

    #[test]
    fn transactions_from_many_threads_do_not_interleave() -> eyre::Result<()> {
        let (_dir, conn) = create_shared_db()?;
        let barrier = Arc::new(Barrier::new(THREADS as usize));

        let handles: Vec<_> = (0..THREADS)
            .map(|worker| {
                let conn = Arc::clone(&conn);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || -> Result<(), Error> {
                    barrier.wait();
                    for batch in 0..BATCHES {
                        conn.transaction(|c| {
                            let mut insert = c.prepare(
                                "INSERT INTO events (worker, batch, slot) VALUES (:worker, :batch, :slot)",
                            )?;
                            insert.bind("worker", worker)?.bind("batch", batch)?;
                            for slot in 0..BATCH_SIZE {
                                insert.bind("slot", slot)?;
                                c.perform(&mut insert)?;
                                thread::yield_now();
                            }
                            Ok::<_, Error>(())
                        })?;
                    }
                    Ok(())
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker panicked")?;
        }

        let events = read_events(&conn)?;
        assert_eq!(events.len() as i64, THREADS * BATCHES * BATCH_SIZE);

        let mut next_batch = vec![0_i64; THREADS as usize];
        for block in events.chunks(BATCH_SIZE as usize) {
            let (worker, batch, _) = block[0];
            for (slot, event) in block.iter().enumerate() {
                assert_eq!(*event, (worker, batch, slot as i64), "interleaved block {block:?}");
            }
            // each worker's own batches stay in program order
            assert_eq!(next_batch[worker as usize], batch);
            next_batch[worker as usize] += 1;
        }
        assert!(next_batch.iter().all(|&n| n == BATCHES));
        Ok(())
    }

    #[test]
    fn single_thread_order_is_preserved() -> eyre::Result<()> {
        let (_dir, conn) = create_shared_db()?;
        let mut insert =
            conn.prepare("INSERT INTO events (worker, batch, slot) VALUES (0, 0, :slot)")?;
        for slot in 0..50 {
            insert.bind("slot", slot)?;
            conn.perform(&mut insert)?;
        }
        let slots: Vec<i64> = read_events(&conn)?.into_iter().map(|(_, _, s)| s).collect();
        assert_eq!(slots, (0..50).collect::<Vec<_>>());
        Ok(())
    }
}

mod blocking_tests {
    use super::*;

    #[test]
    fn open_transaction_blocks_other_threads() -> eyre::Result<()> {
        let (_dir, conn) = create_shared_db()?;
        let (entered_tx, entered_rx) = mpsc::channel();

        let holder = {
            let conn = Arc::clone(&conn);
            thread::spawn(move || {
                conn.transaction(|c| {
                    c.execute("INSERT INTO events (worker, batch, slot) VALUES (1, 0, 0)")?;
                    entered_tx.send(()).expect("test thread alive");
                    thread::sleep(Duration::from_millis(150));
                    c.execute("INSERT INTO events (worker, batch, slot) VALUES (1, 0, 1)")
                })
            })
        };

        entered_rx.recv()?;
        let waiter = {
            let conn = Arc::clone(&conn);
            thread::spawn(move || {
                conn.execute("INSERT INTO events (worker, batch, slot) VALUES (2, 0, 0)")
            })
        };

        holder.join().expect("holder panicked")?;
        waiter.join().expect("waiter panicked")?;

        let events = read_events(&conn)?;
        assert_eq!(events, [(1, 0, 0), (1, 0, 1), (2, 0, 0)]);
        Ok(())
    }
}

mod statement_tests {
    use super::*;

    #[test]
    fn per_thread_statements_share_one_connection() -> eyre::Result<()> {
        let (_dir, conn) = create_shared_db()?;
        let handles: Vec<_> = (0..THREADS)
            .map(|worker| {
                let conn = Arc::clone(&conn);
                thread::spawn(move || -> Result<i64, Error> {
                    let mut insert = conn.prepare(
                        "INSERT INTO events (worker, batch, slot) VALUES (:worker, :batch, 0)",
                    )?;
                    insert.bind("worker", worker)?;
                    for batch in 0..BATCHES {
                        insert.bind("batch", batch)?;
                        conn.perform(&mut insert)?;
                    }

                    let mut count =
                        conn.prepare("SELECT COUNT(*) FROM events WHERE worker = :worker")?;
                    count.bind("worker", worker)?;
                    let row = conn.step(&mut count)?.expect("aggregate row");
                    row.get(0)
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().expect("worker panicked")?, BATCHES);
        }
        assert_eq!(read_events(&conn)?.len() as i64, THREADS * BATCHES);
        Ok(())
    }
}
