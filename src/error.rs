//! Error taxonomy for loop and handle operations.
//!
//! Every failure is surfaced synchronously at the offending call site.
//! Finalizer-driven cleanup never returns errors; anomalies on that path are
//! reported through the `log` facade instead.

use thiserror::Error;

/// Errors surfaced by loop and handle operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The operation is not valid for the handle's or loop's current state:
    /// the handle is closed, the state machine forbids the transition, the
    /// owning loop has been dropped, or `run` was re-entered.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// The OS-level polling primitive reported an error.
    #[error("event loop failure: {0}")]
    Native(#[from] std::io::Error),

    /// An operation argument is malformed or out of the schedulable range.
    #[error("invalid argument: {0}")]
    Argument(&'static str),
}

/// Result type for loop and handle operations.
pub type Result<T> = std::result::Result<T, Error>;
