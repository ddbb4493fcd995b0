//! # sqlgate Configuration Constants
//!
//! Centralizes the values the connection, statement, and migration layers
//! agree on. Values that depend on each other are co-located and checked at
//! compile time.
//!
//! ## Dependency Graph
//!
//! ```text
//! PARAMETER_MARKERS (':', '$', '@')
//!       │
//!       └─> POSITIONAL_MARKER ('?') must not be one of them
//!             Any slot whose engine name starts with '?' (or has no name at
//!             all) is positional and fails preparation.
//!
//! DEFAULT_BUSY_TIMEOUT (5s)
//!       │
//!       └─> MAX_BUSY_TIMEOUT_MS (i32::MAX)
//!             The engine takes the timeout as a C int of milliseconds.
//!
//! INLINE_PARAMETER_SLOTS (2)
//!       └─> Slots stored inline per parameter name before spilling to heap.
//!           Almost every name maps to exactly one engine slot.
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use crate::config::{MEMORY_PATH, DEFAULT_BUSY_TIMEOUT};
//! ```

use std::time::Duration;

// ============================================================================
// CONNECTION
// ============================================================================

/// Location marker that asks the engine for a private, non-persisted database.
pub const MEMORY_PATH: &str = ":memory:";

/// How long the engine retries a locked database file before reporting BUSY.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound accepted by `sqlite3_busy_timeout`.
pub const MAX_BUSY_TIMEOUT_MS: u128 = i32::MAX as u128;

const _: () = assert!(
    DEFAULT_BUSY_TIMEOUT.as_millis() <= MAX_BUSY_TIMEOUT_MS,
    "DEFAULT_BUSY_TIMEOUT must fit in a C int of milliseconds"
);

// ============================================================================
// PARAMETERS
// ============================================================================

/// Prefixes accepted for named parameters. All three are equivalent: `:id`,
/// `$id` and `@id` resolve to the same logical name `id`.
pub const PARAMETER_MARKERS: [char; 3] = [':', '$', '@'];

/// Prefix the engine reports for positional (`?` / `?NNN`) parameters.
pub const POSITIONAL_MARKER: char = '?';

const _: () = {
    let mut i = 0;
    while i < PARAMETER_MARKERS.len() {
        assert!(
            PARAMETER_MARKERS[i] != POSITIONAL_MARKER,
            "POSITIONAL_MARKER must not be a named parameter marker"
        );
        i += 1;
    }
};

/// Engine slots kept inline per parameter name.
pub const INLINE_PARAMETER_SLOTS: usize = 2;

// ============================================================================
// TRANSACTIONS
// ============================================================================

pub const COMMIT_SQL: &str = "COMMIT";
pub const ROLLBACK_SQL: &str = "ROLLBACK";
pub const USER_VERSION_PRAGMA: &str = "PRAGMA user_version";
