use crate::{Error, Result, algorithm::SequenceWindow};

/// Upper bound (inclusive) for a single batch request.
pub const MAX_BATCH_SIZE: usize = 100_000;

/// A pure ID encoding strategy with its own clock-safety bookkeeping.
///
/// Implementations never perform I/O. They are driven by
/// [`IdGeneratorService`], which owns exactly one algorithm per acquired
/// worker slot and serializes every call on its lock, so methods take
/// `&mut self`.
///
/// [`IdGeneratorService`]: crate::IdGeneratorService
pub trait IdAlgorithm: Send {
    /// Generates the next ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClockRegression`] if the clock reads earlier than the
    /// last issued timestamp. The internal state is left untouched in that
    /// case.
    fn next_id(&mut self) -> Result<u64>;

    /// Generates `size` IDs in order, each one individually clock-checked.
    ///
    /// This is not one atomic multi-ID step: the IDs are produced by repeated
    /// [`IdAlgorithm::next_id`] calls.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBatchSize`] unless `size` is within
    /// `1..=`[`MAX_BATCH_SIZE`], or the first error raised by `next_id`.
    fn next_ids(&mut self, size: i64) -> Result<Vec<u64>> {
        let len = check_batch_size(size)?;
        let mut ids = Vec::with_capacity(len);
        for _ in 0..len {
            ids.push(self.next_id()?);
        }
        Ok(ids)
    }

    /// Decimal width used for zero-padded string output.
    fn size(&self) -> usize;

    /// The clock-check state, so a replacement algorithm can resume from it.
    fn window(&self) -> SequenceWindow;
}

/// Validates a batch size and converts it to a length.
///
/// # Errors
///
/// Returns [`Error::InvalidBatchSize`] for `size <= 0` or
/// `size > MAX_BATCH_SIZE`.
pub fn check_batch_size(size: i64) -> Result<usize> {
    match usize::try_from(size) {
        Ok(len) if (1..=MAX_BATCH_SIZE).contains(&len) => Ok(len),
        _ => Err(Error::InvalidBatchSize { size }),
    }
}
