use crate::{Error, Result, time::TimeSource};

/// The `(last timestamp, sequence)` pair that every algorithm tracks.
///
/// Within one millisecond, sequence values are strictly increasing and never
/// reused. When the sequence wraps, [`SequenceWindow::advance`] spins until the
/// clock moves past the exhausted millisecond.
///
/// Both algorithms share [`SequenceWindow::check_clock`], so a clock that
/// moves backwards is reported the same way regardless of encoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequenceWindow {
    last_timestamp: Option<u64>,
    sequence: u64,
}

impl SequenceWindow {
    /// An empty window: nothing issued yet.
    pub const fn new() -> Self {
        Self {
            last_timestamp: None,
            sequence: 0,
        }
    }

    /// Timestamp of the last issued ID, if any.
    pub const fn last_timestamp(&self) -> Option<u64> {
        self.last_timestamp
    }

    /// Sequence value of the last issued ID.
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Fails if `now` is earlier than the last issued timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClockRegression`] when the clock went backwards.
    pub fn check_clock(&self, now: u64) -> Result<()> {
        match self.last_timestamp {
            Some(last) if now < last => Err(Self::cold_clock_behind(last, now)),
            _ => Ok(()),
        }
    }

    /// Adopts `now` without touching the sequence. Used by algorithms whose
    /// value doesn't depend on the clock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClockRegression`] when the clock went backwards.
    pub fn observe(&mut self, now: u64) -> Result<()> {
        self.check_clock(now)?;
        self.last_timestamp = Some(now);
        Ok(())
    }

    /// Moves the window to the next `(timestamp, sequence)` slot.
    ///
    /// - `now` equal to the last timestamp increments the sequence (masked by
    ///   `sequence_mask`). On wrap, spins on `time` until the clock passes the
    ///   last timestamp and restarts at sequence 0.
    /// - `now` later than the last timestamp restarts at sequence 0.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClockRegression`] when the clock went backwards. The
    /// window is unchanged in that case.
    pub fn advance<T>(&mut self, now: u64, sequence_mask: u64, time: &T) -> Result<(u64, u64)>
    where
        T: TimeSource + ?Sized,
    {
        self.check_clock(now)?;

        let (timestamp, sequence) = match self.last_timestamp {
            Some(last) if now == last => match (self.sequence + 1) & sequence_mask {
                0 => (Self::wait_past(last, time), 0),
                next => (now, next),
            },
            _ => (now, 0),
        };

        self.last_timestamp = Some(timestamp);
        self.sequence = sequence;
        Ok((timestamp, sequence))
    }

    /// Busy-waits until `time` reads later than `last`.
    ///
    /// Worst case is the remainder of the current millisecond.
    fn wait_past<T>(last: u64, time: &T) -> u64
    where
        T: TimeSource + ?Sized,
    {
        loop {
            let now = time.current_millis();
            if now > last {
                break now;
            }
            core::hint::spin_loop();
        }
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(last_ms: u64, now_ms: u64) -> Error {
        #[cfg(feature = "tracing")]
        tracing::error!(
            last_ms,
            now_ms,
            "Clock moved backwards, refusing to generate ids for {} milliseconds",
            last_ms - now_ms
        );
        Error::ClockRegression { last_ms, now_ms }
    }
}
