//! Error types for the reactivity runtime.
//!
//! Argument-contract violations are reported synchronously by the call that
//! received the bad argument. Reaction-body failures are surfaced by the run
//! that executed them (`observe`, `exec`, or a flush).

use thiserror::Error;

use crate::reactive::ReactionId;

/// Boxed error returned from a failing reaction body.
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Errors produced by the runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// A non-object value was passed where an object is required.
    #[error("expected an object, got {0}")]
    NotAnObject(&'static str),

    /// A non-callable value was passed where a reaction is required.
    #[error("reactions must be functions, got {0}")]
    NotCallable(&'static str),

    /// Weak collections only accept objects as keys.
    #[error("invalid value used as weak collection key: {0}")]
    InvalidWeakKey(&'static str),

    /// The reaction handle was created by a different runtime.
    #[error("reaction {0:?} does not belong to this runtime")]
    ForeignReaction(ReactionId),

    /// A reaction body returned an error or panicked.
    #[error("reaction {id:?} failed: {message}")]
    Reaction {
        /// The failing reaction.
        id: ReactionId,
        /// Rendered failure message.
        message: String,
    },

    /// One or more reactions failed during a flush.
    ///
    /// Sibling reactions in the same flush still ran.
    #[error("{} reaction(s) failed during flush", failures.len())]
    Flush {
        /// Every failure collected during the pass, in run order.
        failures: Vec<Error>,
    },

    /// A flush exceeded its run budget, usually a reaction that keeps
    /// re-triggering itself.
    #[error("flush exceeded {limit} reaction runs; {dropped} pending reaction(s) dropped")]
    CascadeLimit {
        /// The configured budget.
        limit: usize,
        /// Reactions still pending when the flush gave up.
        dropped: usize,
    },

    /// Configuration could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, Error>;
