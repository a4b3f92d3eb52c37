use alloc::sync::Arc;
use core::fmt;

use crate::Result;

/// Connectivity changes reported by a coordination-service client.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionEvent {
    /// The first successful connection.
    Connected,
    /// A connection was re-established after a suspension.
    Reconnected,
    /// The connection is interrupted; the session may still be alive.
    SuspendedLocally,
    /// The session is gone. Any slot held under it must be assumed lost.
    LostPermanently,
    /// The client itself was shut down.
    Closed,
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connected => "connected",
            Self::Reconnected => "reconnected",
            Self::SuspendedLocally => "suspended",
            Self::LostPermanently => "lost",
            Self::Closed => "closed",
        })
    }
}

/// Receives [`ConnectionEvent`]s on whatever thread the client delivers them.
///
/// Implementations must return quickly and must not block on the generator's
/// lock.
pub trait ConnectionListener: Send + Sync {
    fn state_changed(&self, event: ConnectionEvent);
}

/// The slice of a coordination service that ID issuance consumes.
///
/// How slots are allocated (sequential nodes, leases, ...) is up to the
/// implementation. The only requirement is that one slot is held by at most
/// one live client at a time.
pub trait WorkerRegistry: Send + Sync {
    /// Claims a worker slot for this client and returns its ID.
    ///
    /// Calling this again while a slot is held may return the same slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Registration`] if the service refuses or can't be
    /// reached. A negative return value is treated the same way by callers.
    ///
    /// [`Error::Registration`]: crate::Error::Registration
    fn register(&self) -> Result<i64>;

    /// The business-group name the slot was registered under. Its numeric
    /// suffix after the last `_` is the business flag.
    fn assigned_group_name(&self) -> Option<String>;

    /// Subscribes `listener` to connectivity changes. There is no
    /// unsubscribe; the listener lives as long as the registry.
    fn add_connection_listener(&self, listener: Arc<dyn ConnectionListener>);

    /// Releases the held slot, if any.
    ///
    /// # Errors
    ///
    /// Implementations report release failures; callers shutting down log
    /// them and carry on.
    fn logout(&self) -> Result<()>;
}

impl<R> WorkerRegistry for Arc<R>
where
    R: WorkerRegistry + ?Sized,
{
    fn register(&self) -> Result<i64> {
        (**self).register()
    }

    fn assigned_group_name(&self) -> Option<String> {
        (**self).assigned_group_name()
    }

    fn add_connection_listener(&self, listener: Arc<dyn ConnectionListener>) {
        (**self).add_connection_listener(listener);
    }

    fn logout(&self) -> Result<()> {
        (**self).logout()
    }
}
