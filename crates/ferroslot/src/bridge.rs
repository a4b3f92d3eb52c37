//! Translates coordination-service connectivity into issuance transitions.
//!
//! Coordination clients deliver events on their own threads. The listener
//! handed to the registry only pushes each [`ConnectionEvent`] into an
//! unbounded channel; a dedicated dispatcher thread drains it and applies the
//! mapping below. The client's delivery thread therefore never waits on the
//! generator's lock.
//!
//! | Event                | Action                                  |
//! |----------------------|-----------------------------------------|
//! | `Connected`          | re-acquire a slot                       |
//! | `Reconnected`        | re-acquire a slot                       |
//! | `SuspendedLocally`   | suspend issuance                        |
//! | `LostPermanently`    | suspend issuance, raise a fatal alert   |
//! | `Closed`             | suspend issuance                        |

use alloc::sync::{Arc, Weak};
use core::time::Duration;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::{
    Error, Result,
    registry::{ConnectionEvent, ConnectionListener},
};

/// The transitions the bridge is allowed to drive.
pub trait IssuanceControl: Send + Sync {
    /// Runs slot acquisition again.
    ///
    /// # Errors
    ///
    /// Returns the acquisition error; the bridge logs it and waits for the
    /// next event.
    fn reconnect(&self) -> Result<()>;

    /// Stops issuance until the next successful acquisition.
    fn suspend(&self);
}

// How long the dispatcher waits for an event before checking whether its
// target is still alive.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Receives operational signals that need a human.
pub trait AlertSink: Send + Sync {
    /// The worker slot can't be assumed recoverable.
    fn fatal(&self, reason: &str);
}

/// Reports alerts as `error`-level log events.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn fatal(&self, _reason: &str) {
        #[cfg(feature = "tracing")]
        tracing::error!(reason = _reason, "Worker slot lost, manual intervention may be required");
    }
}

/// Maps [`ConnectionEvent`]s onto an [`IssuanceControl`].
#[derive(Clone)]
pub struct ConnectionStateBridge {
    alert: Arc<dyn AlertSink>,
}

impl Default for ConnectionStateBridge {
    fn default() -> Self {
        Self::new(Arc::new(LogAlertSink))
    }
}

impl ConnectionStateBridge {
    pub fn new(alert: Arc<dyn AlertSink>) -> Self {
        Self { alert }
    }

    /// Applies one event to `control` on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the error of a failed re-acquisition.
    pub fn apply<C>(&self, control: &C, event: ConnectionEvent) -> Result<()>
    where
        C: IssuanceControl + ?Sized,
    {
        #[cfg(feature = "tracing")]
        tracing::info!(%event, "Registry connection state changed");

        match event {
            ConnectionEvent::Connected | ConnectionEvent::Reconnected => control.reconnect(),
            ConnectionEvent::SuspendedLocally | ConnectionEvent::Closed => {
                control.suspend();
                Ok(())
            }
            ConnectionEvent::LostPermanently => {
                control.suspend();
                self.alert
                    .fatal("registry session lost, worker slot ownership can't be confirmed");
                Ok(())
            }
        }
    }

    /// Starts the dispatcher thread and returns the listener to register with
    /// the coordination client.
    ///
    /// The thread only holds a [`Weak`] reference to `control`. It exits once
    /// `control` is dropped, even if the registry keeps the listener and no
    /// event ever arrives, or once every clone of the returned listener is
    /// gone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the OS refuses to spawn the thread.
    pub fn spawn<C>(self, control: Weak<C>) -> Result<Arc<dyn ConnectionListener>>
    where
        C: IssuanceControl + 'static,
    {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.spawn_dispatcher(control, rx)?;
        Ok(Arc::new(ChannelListener { tx }))
    }

    fn spawn_dispatcher<C>(
        self,
        control: Weak<C>,
        rx: Receiver<ConnectionEvent>,
    ) -> Result<JoinHandle<()>>
    where
        C: IssuanceControl + 'static,
    {
        thread::Builder::new()
            .name(String::from("ferroslot-bridge"))
            .spawn(move || self.dispatch(&control, &rx))
            .map_err(|e| Error::configuration(format!("failed to spawn connection bridge: {e}")))
    }

    fn dispatch<C>(&self, control: &Weak<C>, rx: &Receiver<ConnectionEvent>)
    where
        C: IssuanceControl,
    {
        loop {
            let event = match rx.recv_timeout(IDLE_CHECK_INTERVAL) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) if control.strong_count() > 0 => continue,
                Err(_) => break,
            };
            let Some(control) = control.upgrade() else {
                break;
            };
            if let Err(_e) = self.apply(&*control, event) {
                #[cfg(feature = "tracing")]
                tracing::warn!(%event, error = %_e, "Failed to re-acquire worker slot, waiting for next connection event");
            }
        }

        #[cfg(feature = "tracing")]
        tracing::trace!("Connection bridge stopped");
    }
}

struct ChannelListener {
    tx: Sender<ConnectionEvent>,
}

impl ConnectionListener for ChannelListener {
    fn state_changed(&self, event: ConnectionEvent) {
        if self.tx.send(event).is_err() {
            #[cfg(feature = "tracing")]
            tracing::trace!(%event, "Connection bridge is gone, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Reconnect,
        Suspend,
    }

    #[derive(Default)]
    struct RecordingControl {
        calls: Mutex<Vec<Call>>,
        fail_reconnect: bool,
    }

    impl IssuanceControl for RecordingControl {
        fn reconnect(&self) -> Result<()> {
            self.calls.lock().push(Call::Reconnect);
            if self.fail_reconnect {
                Err(Error::registration("refused"))
            } else {
                Ok(())
            }
        }

        fn suspend(&self) {
            self.calls.lock().push(Call::Suspend);
        }
    }

    #[derive(Default)]
    struct RecordingAlerts(Mutex<Vec<String>>);

    impl AlertSink for RecordingAlerts {
        fn fatal(&self, reason: &str) {
            self.0.lock().push(reason.to_owned());
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn maps_events_to_transitions() {
        let alerts = Arc::new(RecordingAlerts::default());
        let bridge = ConnectionStateBridge::new(alerts.clone());
        let control = RecordingControl::default();

        for event in [
            ConnectionEvent::Connected,
            ConnectionEvent::SuspendedLocally,
            ConnectionEvent::Reconnected,
            ConnectionEvent::Closed,
        ] {
            bridge.apply(&control, event).unwrap();
        }

        assert_eq!(
            *control.calls.lock(),
            [Call::Reconnect, Call::Suspend, Call::Reconnect, Call::Suspend]
        );
        assert!(alerts.0.lock().is_empty());
    }

    #[test]
    fn lost_session_suspends_and_alerts() {
        let alerts = Arc::new(RecordingAlerts::default());
        let bridge = ConnectionStateBridge::new(alerts.clone());
        let control = RecordingControl::default();

        bridge
            .apply(&control, ConnectionEvent::LostPermanently)
            .unwrap();

        assert_eq!(*control.calls.lock(), [Call::Suspend]);
        assert_eq!(alerts.0.lock().len(), 1);
    }

    #[test]
    fn reconnect_failure_is_reported() {
        let bridge = ConnectionStateBridge::default();
        let control = RecordingControl {
            fail_reconnect: true,
            ..RecordingControl::default()
        };

        assert!(matches!(
            bridge.apply(&control, ConnectionEvent::Reconnected),
            Err(Error::Registration { .. })
        ));
    }

    #[test]
    fn dispatcher_delivers_events_in_order() {
        let control = Arc::new(RecordingControl::default());
        let listener = ConnectionStateBridge::default()
            .spawn(Arc::downgrade(&control))
            .unwrap();

        listener.state_changed(ConnectionEvent::SuspendedLocally);
        listener.state_changed(ConnectionEvent::Reconnected);
        listener.state_changed(ConnectionEvent::SuspendedLocally);

        wait_for(|| control.calls.lock().len() == 3);
        assert_eq!(
            *control.calls.lock(),
            [Call::Suspend, Call::Reconnect, Call::Suspend]
        );
    }

    #[test]
    fn dispatcher_stops_once_control_is_dropped() {
        let control = Arc::new(RecordingControl::default());
        let weak = Arc::downgrade(&control);
        let listener = ConnectionStateBridge::default().spawn(weak.clone()).unwrap();
        drop(control);

        // Delivery after the target is gone is silently discarded.
        listener.state_changed(ConnectionEvent::Reconnected);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn idle_dispatcher_exits_once_control_is_dropped() {
        let control = Arc::new(RecordingControl::default());
        // Sender kept alive, as a registry that never drops its listeners would.
        let (_tx, rx) = crossbeam_channel::unbounded();
        let handle = ConnectionStateBridge::default()
            .spawn_dispatcher(Arc::downgrade(&control), rx)
            .unwrap();

        thread::sleep(IDLE_CHECK_INTERVAL * 2);
        assert!(!handle.is_finished());

        drop(control);
        wait_for(|| handle.is_finished());
        handle.join().unwrap();
    }
}
