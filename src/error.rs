//! Core error taxonomy. Component boundaries inside the core only ever
//! surface success or one of these — the scan tick is the only place that
//! decides what to do about it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetprocError {
    /// A kernel proc file failed to open or could not be read this tick.
    /// Transient: the caller reuses last-known state and retries next tick.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A connection-table line did not match the expected column shape.
    /// The whole update is abandoned; already-inserted records this round
    /// are kept, aging proceeds as normal next tick.
    #[error("malformed line in {path}: {line:?}")]
    Parse { path: String, line: String },

    /// Another user's `/proc/<pid>/fd` directory couldn't be read. Not
    /// surfaced as a failure — the process simply yields no connections.
    #[error("permission denied reading {path}")]
    PermissionDenied { path: String },

    /// An invariant the core relies on (dual-index agreement, refcount
    /// bookkeeping) was violated. Indicates a bug in the core itself.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, NetprocError>;
