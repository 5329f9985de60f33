//! # Error taxonomy
//!
//! Two layers of errors flow through the SDK:
//!
//! - [`SourceError`]: what a source adapter reports for a single lookup. A call
//!   that reverted or returned junk is distinguished from a call that could not
//!   be executed at all.
//! - [`SugarError`]: what an aggregator operation returns to its caller.
//!
//! Failures on a single element of a batch never become a `SugarError`. They are
//! converted to sentinel values and carried as [`Degradation`] annotations on the
//! record they affected.

use serde::Serialize;

use crate::chain::{Capability, ChainTopology};

/// Result alias used by every aggregator operation.
pub type Result<T> = std::result::Result<T, SugarError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SugarError {
    /// Malformed arguments (bad pagination, misuse of a sentinel).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Direct lookup of an entity that does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },
    /// The primary indexed source could not execute the lookup.
    #[error("upstream {origin} unavailable: {reason}")]
    UpstreamUnavailable { origin: &'static str, reason: String },
    /// Operation gated to another chain topology.
    #[error("{capability:?} is not supported on {topology:?} chains")]
    Unsupported {
        capability: Capability,
        topology: ChainTopology,
    },
    /// Owner-gated registry mutation attempted by someone else.
    #[error("caller {0} is not the registry owner")]
    Unauthorized(String),
}

impl SugarError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        SugarError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Wraps a primary-source failure. Used where the whole call must abort.
    pub fn upstream(origin: &'static str, err: SourceError) -> Self {
        crate::metrics::record_upstream_failure(origin);
        SugarError::UpstreamUnavailable {
            origin,
            reason: err.to_string(),
        }
    }
}

/// Failure of a single external lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The call executed and reverted.
    #[error("call reverted: {0}")]
    Reverted(String),
    /// The call returned data that could not be decoded.
    #[error("malformed return data: {0}")]
    Malformed(String),
    /// The call could not be executed (transport error, timeout).
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SourceError::Unavailable(_))
    }
}

/// Annotation recording that one field fell back to its sentinel value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Degradation {
    pub field: &'static str,
    pub reason: String,
}

impl Degradation {
    pub fn new(field: &'static str, reason: impl ToString) -> Self {
        crate::metrics::record_degraded(field);
        Self {
            field,
            reason: reason.to_string(),
        }
    }
}
