use portable_atomic::{AtomicU64, Ordering};

/// An externally supplied counter feeding [`FlaggedCounterId`].
///
/// Typically backed by a database sequence or a shared counter. Only the
/// lower bits are used, see [`FlaggedCounterId::SEQUENCE_MASK`].
///
/// Closures work out of the box:
///
/// ```
/// use ferroslot::SequenceSource;
///
/// let source = || 41_u64;
/// assert_eq!(source.next_sequence(), 41);
/// ```
///
/// [`FlaggedCounterId`]: crate::FlaggedCounterId
/// [`FlaggedCounterId::SEQUENCE_MASK`]: crate::FlaggedCounterId::SEQUENCE_MASK
pub trait SequenceSource: Send + Sync {
    /// Returns the next counter value.
    fn next_sequence(&self) -> u64;
}

impl<F> SequenceSource for F
where
    F: Fn() -> u64 + Send + Sync,
{
    fn next_sequence(&self) -> u64 {
        self()
    }
}

/// An in-process [`SequenceSource`] backed by an atomic counter.
///
/// Unique within one process only. Use it for tests, or when a single process
/// owns the business flag.
#[derive(Debug, Default)]
pub struct AtomicSequence {
    next: AtomicU64,
}

impl AtomicSequence {
    /// Creates a counter whose first value is `start`.
    pub const fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }
}

impl SequenceSource for AtomicSequence {
    fn next_sequence(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}
