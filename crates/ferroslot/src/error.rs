//! Error types for slot-backed ID issuance.
//!
//! Every fallible operation in this crate reports one [`Error`]. The variants
//! differ in how a caller should react:
//!
//! - [`Error::Configuration`] and [`Error::InvalidBatchSize`]: the input is
//!   wrong. Fix the call site; retrying is pointless.
//! - [`Error::Registration`]: the coordination service refused a worker slot
//!   for this attempt. Recovery is driven by a later reconnect, not a retry
//!   loop.
//! - [`Error::ClockRegression`]: the wall clock moved backwards. Treat as an
//!   operational incident and never retry automatically, since doing so can
//!   hand out duplicate IDs.
//! - [`Error::NotWorking`]: issuance is suspended or not started. Back off and
//!   retry once connectivity resumes.

/// A result type defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors that `ferroslot` can produce.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A constructor or call received an invalid value (business flag, worker
    /// id, missing sequence source, registry settings).
    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    /// A batch request asked for zero, negative, or too many IDs.
    #[error("Invalid batch size {size}: must be within 1..={max}", max = crate::MAX_BATCH_SIZE)]
    InvalidBatchSize { size: i64 },

    /// The coordination service did not hand out a usable worker slot.
    #[error("Worker slot registration failed: {reason}")]
    Registration { reason: String },

    /// The clock reads earlier than the last issued timestamp.
    #[error(
        "Clock moved backwards, refusing to generate ids for {} milliseconds",
        behind_ms(.last_ms, .now_ms)
    )]
    ClockRegression {
        /// Timestamp of the last issued ID.
        last_ms: u64,
        /// The regressed reading.
        now_ms: u64,
    },

    /// Issuance is not active: the generator was never started, lost its
    /// registry connection, or was closed.
    #[error("Worker isn't working, registry connection may be down")]
    NotWorking,
}

fn behind_ms(last_ms: &u64, now_ms: &u64) -> u64 {
    last_ms.saturating_sub(*now_ms)
}

impl Error {
    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub(crate) fn registration(reason: impl Into<String>) -> Self {
        Self::Registration {
            reason: reason.into(),
        }
    }

    /// Returns `true` when waiting for connectivity and calling again may
    /// succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NotWorking)
    }
}
