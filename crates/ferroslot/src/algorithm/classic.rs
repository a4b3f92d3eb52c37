#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Error, Result,
    algorithm::{IdAlgorithm, SequenceWindow},
    id::SnowflakeId,
    time::TimeSource,
};

/// The classic 41/10/12 Snowflake encoding.
///
/// Each ID packs `(now - epoch)` in milliseconds, the worker ID leased from
/// the registry, and a per-millisecond sequence. See [`SnowflakeId`] for the
/// bit layout.
///
/// ## Guarantees
/// - IDs from one instance are unique and strictly increasing as long as the
///   clock never moves backwards.
/// - A backwards clock fails the call with [`Error::ClockRegression`] and
///   leaves the state untouched; the call is never retried internally.
/// - When 4096 IDs were issued in the current millisecond, the next call
///   spins until the clock advances.
///
/// # Example
/// ```
/// use ferroslot::{ClassicSnowflake, IdAlgorithm, SnowflakeId, SystemClock};
///
/// let mut algorithm = ClassicSnowflake::new(7, SystemClock::default()).unwrap();
/// let id = SnowflakeId::from_raw(algorithm.next_id().unwrap());
/// assert_eq!(id.worker_id(), 7);
/// ```
pub struct ClassicSnowflake<T>
where
    T: TimeSource,
{
    worker_id: u64,
    window: SequenceWindow,
    time: T,
}

impl<T> ClassicSnowflake<T>
where
    T: TimeSource,
{
    /// Decimal width of a zero-padded classic ID.
    pub const SIZE: usize = SnowflakeId::DECIMAL_WIDTH;

    /// Creates an algorithm bound to `worker_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `worker_id` exceeds
    /// [`SnowflakeId::MAX_WORKER_ID`].
    pub fn new(worker_id: u16, time: T) -> Result<Self> {
        let worker_id = u64::from(worker_id);
        if worker_id > SnowflakeId::MAX_WORKER_ID {
            return Err(Error::configuration(format!(
                "worker id {worker_id} can't be greater than {}",
                SnowflakeId::MAX_WORKER_ID
            )));
        }
        Ok(Self {
            worker_id,
            window: SequenceWindow::new(),
            time,
        })
    }

    /// Resumes from a window left behind by a previous algorithm, so a
    /// re-acquired slot can't reuse a `(timestamp, sequence)` pair.
    #[must_use]
    pub fn with_window(mut self, window: SequenceWindow) -> Self {
        self.window = window;
        self
    }

    /// The worker ID encoded into every ID.
    pub const fn worker_id(&self) -> u64 {
        self.worker_id
    }

    /// Generates the next ID as a structured [`SnowflakeId`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClockRegression`] if the clock moved backwards.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self), fields(worker_id = self.worker_id)))]
    pub fn next_snowflake(&mut self) -> Result<SnowflakeId> {
        let now = self.time.current_millis();
        let (timestamp, sequence) = self
            .window
            .advance(now, SnowflakeId::SEQUENCE_MASK, &self.time)?;
        Ok(SnowflakeId::from_components(
            timestamp,
            self.worker_id,
            sequence,
        ))
    }
}

impl<T> IdAlgorithm for ClassicSnowflake<T>
where
    T: TimeSource + Send,
{
    fn next_id(&mut self) -> Result<u64> {
        self.next_snowflake().map(u64::from)
    }

    fn size(&self) -> usize {
        Self::SIZE
    }

    fn window(&self) -> SequenceWindow {
        self.window
    }
}
