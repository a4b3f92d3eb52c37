use core::fmt;

/// Lifecycle of an [`IdGeneratorService`].
///
/// ```text
/// Uninitialized --init--> Connecting --acquired--> Working
///                         Connecting --failed----> Suspended
///                         Working    --lost------> Suspended
///                         Suspended  --reconnect-> Connecting
/// Working | Suspended     --close----------------> Closed
///                         Closed     --init------> Connecting
/// ```
///
/// Only [`IssuanceState::Working`] issues IDs.
///
/// [`IdGeneratorService`]: crate::IdGeneratorService
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IssuanceState {
    #[default]
    Uninitialized,
    /// A worker slot is being acquired.
    Connecting,
    Working,
    /// Connectivity was lost or the last acquisition failed.
    Suspended,
    /// Shut down by the owner; the slot has been released.
    Closed,
}

impl IssuanceState {
    /// Whether connectivity events are acted upon in this state.
    pub(crate) const fn accepts_events(self) -> bool {
        !matches!(self, Self::Uninitialized | Self::Closed)
    }
}

impl fmt::Display for IssuanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Working => "working",
            Self::Suspended => "suspended",
            Self::Closed => "closed",
        })
    }
}
