//! # Serialized Execution Context
//!
//! Every call into the engine for one connection runs inside this context.
//! It is the single logical worker the rest of the crate relies on: no two
//! threads ever touch the same `sqlite3*` at once, and calls are served in
//! arrival order.
//!
//! ## Mechanism
//!
//! ```text
//!  thread A ──run(f)──┐
//!                     ▼
//!           ┌───────────────────────┐        thread B ──run(g)── parks
//!           │ ReentrantMutex<State> │◄──────────────────────────────┘
//!           └───────────────────────┘
//!                     │ f calls conn.prepare()  ──► same thread: re-enters inline
//!                     │ f returns
//!                     ▼
//!              unlock_fair() ──► lock handed directly to B
//! ```
//!
//! - **Reentrancy**: `parking_lot::ReentrantMutex` records the owning thread.
//!   Code already inside (a transaction block, a row callback) re-enters
//!   without deadlocking.
//! - **Ordering**: the outermost release uses `unlock_fair`, which hands the
//!   lock to the longest-waiting thread instead of letting the releasing
//!   thread barge back in.
//! - **Blocking**: callers outside the context park until it is free. There is
//!   no timeout or cancellation.
//!
//! ## State
//!
//! The guarded [`EngineState`] only holds `Cell`s: the mutex hands out shared
//! references, and nothing in it is borrowed across a call back into user
//! code.

use std::cell::Cell;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::engine::RawDb;
use crate::error::{Misuse, Result};

pub(crate) struct EngineState {
    db: Cell<RawDb>,
    in_transaction: Cell<bool>,
    depth: Cell<u32>,
}

impl EngineState {
    fn new(db: RawDb) -> Self {
        Self {
            db: Cell::new(db),
            in_transaction: Cell::new(false),
            depth: Cell::new(0),
        }
    }

    /// The live handle, or `Misuse::Closed`.
    pub fn db(&self) -> Result<RawDb> {
        let db = self.db.get();
        if db.is_null() {
            return Err(Misuse::Closed.into());
        }
        Ok(db)
    }

    pub fn is_closed(&self) -> bool {
        self.db.get().is_null()
    }

    /// Detaches the handle; later calls see a closed connection.
    pub fn take_db(&self) -> Option<RawDb> {
        let db = self.db.replace(RawDb::NULL);
        (!db.is_null()).then_some(db)
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction.get()
    }

    pub fn set_in_transaction(&self, active: bool) {
        self.in_transaction.set(active);
    }
}

pub(crate) struct SerialContext {
    state: ReentrantMutex<EngineState>,
}

impl SerialContext {
    pub fn new(db: RawDb) -> Self {
        Self {
            state: ReentrantMutex::new(EngineState::new(db)),
        }
    }

    /// Runs `f` inside the context, inline when the calling thread is
    /// already inside, otherwise after every earlier caller has finished.
    pub fn run<R>(&self, f: impl FnOnce(&EngineState) -> R) -> R {
        let guard = self.state.lock();
        let depth = guard.depth.get();
        if depth > 0 {
            tracing::trace!(depth, "re-entering serialized context");
        }
        guard.depth.set(depth + 1);
        let exit = DepthGuard(&*guard);
        let out = f(&*guard);
        drop(exit);
        ReentrantMutexGuard::unlock_fair(guard);
        out
    }
}

/// Restores the nesting depth even when `f` unwinds.
struct DepthGuard<'a>(&'a EngineState);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        let depth = self.0.depth.get();
        self.0.depth.set(depth.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn closed_state_reports_misuse() {
        let ctx = SerialContext::new(RawDb::NULL);
        let err = ctx.run(|state| state.db()).unwrap_err();
        assert_eq!(err.misuse(), Some(&Misuse::Closed));
        assert!(ctx.run(|state| state.is_closed()));
    }

    #[test]
    fn reentry_runs_inline() {
        let ctx = SerialContext::new(RawDb::NULL);
        let inner = ctx.run(|outer| {
            let outer_depth = outer.depth.get();
            ctx.run(|inner| (outer_depth, inner.depth.get()))
        });
        assert_eq!(inner, (1, 2));
        assert_eq!(ctx.run(|state| state.depth.get()), 1);
    }

    #[test]
    fn depth_recovers_after_panic() {
        let ctx = SerialContext::new(RawDb::NULL);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            ctx.run(|_| panic!("boom"));
        }));
        assert!(result.is_err());
        assert_eq!(ctx.run(|state| state.depth.get()), 1);
    }

    #[test]
    fn callers_do_not_overlap() {
        let ctx = Arc::new(SerialContext::new(RawDb::NULL));
        let inside = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ctx = Arc::clone(&ctx);
                let inside = Arc::clone(&inside);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..20 {
                        ctx.run(|_| {
                            let before = inside.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                            assert_eq!(before, 0);
                            thread::sleep(Duration::from_micros(50));
                            inside.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
