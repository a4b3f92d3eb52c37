use alloc::sync::Arc;
use core::{fmt, str::FromStr};

use crate::{
    Error, Result,
    algorithm::{ClassicSnowflake, FlaggedCounterId, IdAlgorithm, SequenceSource, SequenceWindow},
    registry::WorkerSlot,
    time::TimeSource,
};

/// Names the encoding a deployment uses.
///
/// The two encodings are not bit-compatible. Pick one per deployment and
/// never mix them within one ID namespace.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AlgorithmKind {
    /// [`ClassicSnowflake`]: 41-bit time, 10-bit worker, 12-bit sequence.
    #[default]
    ClassicSnowflake,
    /// [`FlaggedCounterId`]: external counter offset by business flag.
    FlaggedCounter,
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ClassicSnowflake => "classic",
            Self::FlaggedCounter => "flagged",
        })
    }
}

impl FromStr for AlgorithmKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classic" | "snowflake" | "classic-snowflake" => Ok(Self::ClassicSnowflake),
            "flagged" | "flagged-counter" | "counter" => Ok(Self::FlaggedCounter),
            other => Err(Error::configuration(format!("unknown algorithm: {other:?}"))),
        }
    }
}

/// Everything needed to rebuild an [`IdAlgorithm`] after each slot
/// acquisition, except the slot itself.
#[derive(Clone)]
pub enum Strategy {
    /// Build a [`ClassicSnowflake`] for the acquired worker ID.
    ClassicSnowflake,
    /// Build a [`FlaggedCounterId`] for the acquired business flag.
    FlaggedCounter {
        /// Counter shared by every algorithm built from this strategy.
        sequence: Arc<dyn SequenceSource>,
    },
}

impl Strategy {
    /// Resolves a configured [`AlgorithmKind`] into a strategy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `kind` is
    /// [`AlgorithmKind::FlaggedCounter`] and no sequence source is given.
    pub fn new(kind: AlgorithmKind, sequence: Option<Arc<dyn SequenceSource>>) -> Result<Self> {
        match (kind, sequence) {
            (AlgorithmKind::ClassicSnowflake, _) => Ok(Self::ClassicSnowflake),
            (AlgorithmKind::FlaggedCounter, Some(sequence)) => Ok(Self::FlaggedCounter { sequence }),
            (AlgorithmKind::FlaggedCounter, None) => Err(Error::configuration(
                "flagged counter ids require a sequence source",
            )),
        }
    }

    /// The kind of algorithm this strategy builds.
    pub const fn kind(&self) -> AlgorithmKind {
        match self {
            Self::ClassicSnowflake => AlgorithmKind::ClassicSnowflake,
            Self::FlaggedCounter { .. } => AlgorithmKind::FlaggedCounter,
        }
    }

    /// Builds a fresh algorithm for an acquired worker slot, resuming clock
    /// checks from `window`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the slot's business flag is out of
    /// range for the chosen algorithm.
    pub fn build<T>(
        &self,
        slot: &WorkerSlot,
        window: SequenceWindow,
        time: T,
    ) -> Result<Box<dyn IdAlgorithm>>
    where
        T: TimeSource + Send + 'static,
    {
        Ok(match self {
            Self::ClassicSnowflake => {
                Box::new(ClassicSnowflake::new(slot.slot_id(), time)?.with_window(window))
            }
            Self::FlaggedCounter { sequence } => Box::new(
                FlaggedCounterId::new(Arc::clone(sequence), slot.business_flag(), time)?
                    .with_window(window),
            ),
        })
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Self::ClassicSnowflake
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClassicSnowflake => f.write_str("ClassicSnowflake"),
            Self::FlaggedCounter { .. } => f
                .debug_struct("FlaggedCounter")
                .finish_non_exhaustive(),
        }
    }
}
