//! Error types for the fixpoint engine
//!
//! All engine errors are fatal: unsoundness in one property propagates
//! through dependency edges into every other property, so there is no
//! "skip this analysis and continue" mode. A run either reaches a complete,
//! sound fixpoint or aborts with one of the errors below.

use thiserror::Error;

use crate::domain::epk::Epk;

/// Fatal error taxonomy for a fixpoint run
#[derive(Debug, Error)]
pub enum EngineError {
    /// A registered analysis broke the engine contract: a non-monotonic
    /// update, an update to an already-Final EPK, an undeclared dependency,
    /// or a fallback value below the current value.
    #[error("contract violation at {epk} ({kind}): {detail}")]
    ContractViolation {
        /// Offending entity/kind pair
        epk: Epk,
        /// Property kind name (for diagnosis)
        kind: String,
        /// What was violated
        detail: String,
    },

    /// An analysis computation itself raised an error.
    #[error("computation for {epk} ({kind}) failed: {message}")]
    Computation { epk: Epk, kind: String, message: String },

    /// A kind was queried with neither a registered computation nor a
    /// declared fallback. This is a configuration error.
    #[error("property kind {kind} has neither a registered computation nor a fallback")]
    Unresolvable { kind: String },

    /// The configured resolving-round safety limit was exceeded: interim
    /// EPKs keep appearing across rounds, so the entity set is likely
    /// unbounded.
    #[error("resolve round limit ({limit}) exceeded with {interim} interim EPKs remaining")]
    ResolveLimitExceeded { limit: usize, interim: usize },
}

impl EngineError {
    /// Contract violation helper
    pub(crate) fn contract(epk: Epk, kind: impl Into<String>, detail: impl Into<String>) -> Self {
        EngineError::ContractViolation {
            epk,
            kind: kind.into(),
            detail: detail.into(),
        }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;
