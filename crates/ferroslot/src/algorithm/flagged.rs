use alloc::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Error, Result,
    algorithm::{IdAlgorithm, SequenceSource, SequenceWindow},
    time::TimeSource,
};

/// Largest accepted business flag.
pub const MAX_BUSINESS_FLAG: u8 = 100;

/// A compact decimal counter partitioned by business flag.
///
/// ```text
/// value = (sequence_source() & SEQUENCE_MASK) + business_flag * 10^(SIZE - 1)
/// ```
///
/// With a 22-bit mask the counter never exceeds 7 decimal digits, so each
/// business flag owns the disjoint range
/// `[flag * 10^7, flag * 10^7 + 2^22)`. Ranges are decimal, not bit fields,
/// which keeps the IDs short and readable.
///
/// The clock does not feed the value. It is still checked on every call, so
/// a backwards clock surfaces as [`Error::ClockRegression`] the same way it
/// does for [`ClassicSnowflake`].
///
/// Uniqueness is only as good as the [`SequenceSource`]: it must never hand
/// out the same value twice within one business flag.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use ferroslot::{AtomicSequence, FlaggedCounterId, IdAlgorithm, SystemClock};
///
/// let source = Arc::new(AtomicSequence::new(1));
/// let mut algorithm = FlaggedCounterId::new(source, 7, SystemClock::default()).unwrap();
/// assert_eq!(algorithm.next_id().unwrap(), 70_000_001);
/// ```
///
/// [`ClassicSnowflake`]: crate::ClassicSnowflake
pub struct FlaggedCounterId<T>
where
    T: TimeSource,
{
    business_flag: u8,
    offset: u64,
    window: SequenceWindow,
    sequence: Arc<dyn SequenceSource>,
    time: T,
}

impl<T> FlaggedCounterId<T>
where
    T: TimeSource,
{
    /// Bits kept from the sequence source.
    pub const SEQUENCE_BITS: u32 = 22;

    /// Mask applied to every value from the sequence source.
    pub const SEQUENCE_MASK: u64 = (1 << Self::SEQUENCE_BITS) - 1;

    /// Decimal width of the counter part plus one digit for the flag.
    pub const SIZE: usize = 8;

    /// Creates an algorithm for `business_flag`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `business_flag` exceeds
    /// [`MAX_BUSINESS_FLAG`].
    pub fn new(sequence: Arc<dyn SequenceSource>, business_flag: u8, time: T) -> Result<Self> {
        if business_flag > MAX_BUSINESS_FLAG {
            return Err(Error::configuration(format!(
                "business flag {business_flag} can't be greater than {MAX_BUSINESS_FLAG}"
            )));
        }
        Ok(Self {
            business_flag,
            offset: u64::from(business_flag) * 10_u64.pow(Self::SIZE as u32 - 1),
            window: SequenceWindow::new(),
            sequence,
            time,
        })
    }

    /// The business flag folded into every value.
    pub const fn business_flag(&self) -> u8 {
        self.business_flag
    }

    /// Resumes clock checking from a previous algorithm's window.
    #[must_use]
    pub fn with_window(mut self, window: SequenceWindow) -> Self {
        self.window = window;
        self
    }
}

impl<T> IdAlgorithm for FlaggedCounterId<T>
where
    T: TimeSource + Send,
{
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self), fields(business_flag = self.business_flag)))]
    fn next_id(&mut self) -> Result<u64> {
        self.window.observe(self.time.current_millis())?;
        let counter = self.sequence.next_sequence() & Self::SEQUENCE_MASK;
        Ok(counter + self.offset)
    }

    fn size(&self) -> usize {
        Self::SIZE
    }

    fn window(&self) -> SequenceWindow {
        self.window
    }
}
