use alloc::sync::Arc;

use parking_lot::Mutex;
use portable_atomic::{AtomicBool, Ordering};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    AlertSink, ConnectionStateBridge, Error, IdAlgorithm, IssuanceControl, IssuanceState,
    LogAlertSink, Result, SequenceWindow, Strategy, TimeSource, WorkerRegistry, WorkerSlot,
};

/// Issues IDs for one process from a worker slot leased through a
/// [`WorkerRegistry`].
///
/// The service owns the issuance state machine (see [`IssuanceState`]) and
/// the active [`IdAlgorithm`]. Every mutating call serializes on one lock;
/// [`is_working`](Self::is_working) and
/// [`is_connecting`](Self::is_connecting) read atomic mirrors and never
/// block.
///
/// Handles are cheap to clone and share the same instance.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use ferroslot::{IdGeneratorService, MemoryCoordinator, NodePath, Strategy, SystemClock};
///
/// let coordinator = MemoryCoordinator::new();
/// let registry = Arc::new(coordinator.client(NodePath::new("ferroslot", "orders")));
/// let service = IdGeneratorService::new(registry, Strategy::ClassicSnowflake, SystemClock::default());
///
/// service.init().unwrap();
/// let a = service.next_id().unwrap();
/// let b = service.next_id().unwrap();
/// assert!(a < b);
///
/// service.close();
/// assert!(service.next_id().is_err());
/// ```
pub struct IdGeneratorService<R, T>
where
    R: WorkerRegistry + 'static,
    T: TimeSource + Clone + Send + Sync + 'static,
{
    shared: Arc<Shared<R, T>>,
}

impl<R, T> Clone for IdGeneratorService<R, T>
where
    R: WorkerRegistry + 'static,
    T: TimeSource + Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<R, T> {
    registry: R,
    strategy: Strategy,
    time: T,
    bridge: ConnectionStateBridge,
    #[cfg(feature = "cache-padded")]
    core: crossbeam_utils::CachePadded<Mutex<Core>>,
    #[cfg(not(feature = "cache-padded"))]
    core: Mutex<Core>,
    working: AtomicBool,
    connecting: AtomicBool,
}

#[derive(Default)]
struct Core {
    state: IssuanceState,
    // Set by the first successful acquisition, cleared by close.
    initialized: bool,
    // Never cleared: one listener per service lifetime.
    listener_registered: bool,
    algorithm: Option<Box<dyn IdAlgorithm>>,
    slot: Option<WorkerSlot>,
    // Clock-check state of the last retired algorithm.
    window: SequenceWindow,
}

impl Core {
    fn working_algorithm(&mut self) -> Result<&mut (dyn IdAlgorithm + 'static)> {
        match (self.state, self.algorithm.as_deref_mut()) {
            (IssuanceState::Working, Some(algorithm)) => Ok(algorithm),
            _ => Err(Error::NotWorking),
        }
    }

    fn retire_algorithm(&mut self) {
        if let Some(algorithm) = self.algorithm.take() {
            self.window = algorithm.window();
        }
        self.slot = None;
    }
}

impl<R, T> IdGeneratorService<R, T>
where
    R: WorkerRegistry + 'static,
    T: TimeSource + Clone + Send + Sync + 'static,
{
    /// Creates an uninitialized service. Nothing is registered until
    /// [`init`](Self::init).
    pub fn new(registry: R, strategy: Strategy, time: T) -> Self {
        Self::with_alert_sink(registry, strategy, time, Arc::new(LogAlertSink))
    }

    /// Like [`new`](Self::new), reporting lost sessions to `alert` instead of
    /// the log.
    pub fn with_alert_sink(
        registry: R,
        strategy: Strategy,
        time: T,
        alert: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry,
                strategy,
                time,
                bridge: ConnectionStateBridge::new(alert),
                #[cfg(feature = "cache-padded")]
                core: crossbeam_utils::CachePadded::new(Mutex::new(Core::default())),
                #[cfg(not(feature = "cache-padded"))]
                core: Mutex::new(Core::default()),
                working: AtomicBool::new(false),
                connecting: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribes to connectivity changes (once per service) and acquires a
    /// worker slot. A no-op once initialized.
    ///
    /// # Errors
    ///
    /// Returns the acquisition error. The service is left
    /// [`Suspended`](IssuanceState::Suspended) and retries on the next
    /// reconnect event or [`init`](Self::init) call.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn init(&self) -> Result<()> {
        let mut core = self.shared.core.lock();
        if core.initialized {
            #[cfg(feature = "tracing")]
            tracing::debug!(state = %core.state, "Already initialized");
            return Ok(());
        }

        if !core.listener_registered {
            let listener = self
                .shared
                .bridge
                .clone()
                .spawn(Arc::downgrade(&self.shared))?;
            self.shared.registry.add_connection_listener(listener);
            core.listener_registered = true;
        }

        self.shared.connect_locked(&mut core)
    }

    /// Re-acquires a worker slot and rebuilds the algorithm.
    ///
    /// # Errors
    ///
    /// - [`Error::NotWorking`] if the service was never initialized or is
    ///   closed.
    /// - The acquisition error otherwise; the service is left suspended.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn connect(&self) -> Result<()> {
        let mut core = self.shared.core.lock();
        if !core.state.accepts_events() {
            return Err(Error::NotWorking);
        }
        self.shared.connect_locked(&mut core)
    }

    /// Stops issuance until the next successful acquisition. Ignored unless
    /// the service is initialized.
    pub fn suspend(&self) {
        self.shared.suspend();
    }

    /// Stops issuance and releases the worker slot.
    ///
    /// Issuance is switched off before the registry is asked to release the
    /// slot, so no ID is issued after another process may have claimed it.
    /// The lock is held until the release returns: an [`init`](Self::init)
    /// or [`connect`](Self::connect) racing with `close` acquires a slot only
    /// after the old one is gone. A failed release is logged, not returned.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn close(&self) {
        let mut core = self.shared.core.lock();
        if !core.state.accepts_events() {
            #[cfg(feature = "tracing")]
            tracing::debug!(state = %core.state, "Nothing to close");
            return;
        }
        core.retire_algorithm();
        core.state = IssuanceState::Closed;
        core.initialized = false;
        self.shared.publish(&core);

        match self.shared.registry.logout() {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::info!("Worker slot released");
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "Failed to release worker slot");
            }
        }
    }

    /// Generates the next ID.
    ///
    /// # Errors
    ///
    /// - [`Error::NotWorking`] unless the service is
    ///   [`Working`](IssuanceState::Working).
    /// - [`Error::ClockRegression`] if the clock moved backwards.
    pub fn next_id(&self) -> Result<u64> {
        if !self.is_working() {
            return Err(Error::NotWorking);
        }
        self.shared.core.lock().working_algorithm()?.next_id()
    }

    /// Generates `size` IDs in order, each one clock-checked on its own.
    ///
    /// # Errors
    ///
    /// - [`Error::NotWorking`] unless the service is working. Checked first.
    /// - [`Error::InvalidBatchSize`] unless `size` is within
    ///   `1..=`[`MAX_BATCH_SIZE`](crate::MAX_BATCH_SIZE).
    /// - [`Error::ClockRegression`] from any of the IDs; nothing is returned
    ///   for the batch in that case.
    pub fn next_ids(&self, size: i64) -> Result<Vec<u64>> {
        if !self.is_working() {
            return Err(Error::NotWorking);
        }
        self.shared.core.lock().working_algorithm()?.next_ids(size)
    }

    /// The next ID in decimal.
    ///
    /// # Errors
    ///
    /// Same as [`next_id`](Self::next_id).
    pub fn next_string_id(&self) -> Result<String> {
        self.next_id().map(|id| id.to_string())
    }

    /// The next ID in decimal, zero padded to the algorithm's size plus one
    /// digit for business flags of 10 and above.
    ///
    /// The extra digit is `min(flag, 10) / 10`: flags 10 through 100 all pad
    /// to `size() + 1`. It does not grow with `flag / 10`, so flag 100 pads
    /// to 9 digits for [`FlaggedCounterId`](crate::FlaggedCounterId), not 18.
    ///
    /// # Errors
    ///
    /// Same as [`next_id`](Self::next_id).
    pub fn next_fixed_string_id(&self) -> Result<String> {
        if !self.is_working() {
            return Err(Error::NotWorking);
        }
        let mut core = self.shared.core.lock();
        let flag = core.slot.as_ref().map_or(0, WorkerSlot::business_flag);
        let algorithm = core.working_algorithm()?;
        let width = algorithm.size() + usize::from(flag.min(10)) / 10;
        let id = algorithm.next_id()?;
        Ok(format!("{id:0width$}"))
    }

    /// Whether IDs can be issued right now. Lock-free.
    pub fn is_working(&self) -> bool {
        self.shared.working.load(Ordering::Acquire)
    }

    /// Whether a worker slot acquisition is in progress. Lock-free.
    pub fn is_connecting(&self) -> bool {
        self.shared.connecting.load(Ordering::Acquire)
    }

    pub fn state(&self) -> IssuanceState {
        self.shared.core.lock().state
    }

    /// The slot currently held, if working.
    pub fn worker_slot(&self) -> Option<WorkerSlot> {
        self.shared.core.lock().slot.clone()
    }

    pub fn registry(&self) -> &R {
        &self.shared.registry
    }
}

impl<R, T> Shared<R, T>
where
    R: WorkerRegistry,
    T: TimeSource + Clone + Send + Sync + 'static,
{
    fn publish(&self, core: &Core) {
        self.connecting
            .store(core.state == IssuanceState::Connecting, Ordering::Release);
        self.working
            .store(core.state == IssuanceState::Working, Ordering::Release);
    }

    fn connect_locked(&self, core: &mut Core) -> Result<()> {
        core.retire_algorithm();
        core.state = IssuanceState::Connecting;
        self.publish(core);

        match self.acquire(core.window) {
            Ok((slot, algorithm)) => {
                #[cfg(feature = "tracing")]
                tracing::info!(slot = %slot, strategy = %self.strategy.kind(), "Worker slot acquired, issuing ids");
                core.slot = Some(slot);
                core.algorithm = Some(algorithm);
                core.state = IssuanceState::Working;
                core.initialized = true;
                self.publish(core);
                Ok(())
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "Worker slot acquisition failed, issuance suspended");
                core.state = IssuanceState::Suspended;
                self.publish(core);
                Err(e)
            }
        }
    }

    fn acquire(&self, window: SequenceWindow) -> Result<(WorkerSlot, Box<dyn IdAlgorithm>)> {
        let slot_id = self.registry.register()?;
        let group = self.registry.assigned_group_name().unwrap_or_default();
        let slot = WorkerSlot::new(slot_id, group)?;
        let algorithm = self.strategy.build(&slot, window, self.time.clone())?;
        Ok((slot, algorithm))
    }
}

impl<R, T> IssuanceControl for Shared<R, T>
where
    R: WorkerRegistry,
    T: TimeSource + Clone + Send + Sync + 'static,
{
    fn reconnect(&self) -> Result<()> {
        let mut core = self.core.lock();
        if !core.state.accepts_events() {
            #[cfg(feature = "tracing")]
            tracing::debug!(state = %core.state, "Ignoring reconnect");
            return Ok(());
        }
        self.connect_locked(&mut core)
    }

    fn suspend(&self) {
        let mut core = self.core.lock();
        if !core.state.accepts_events() {
            #[cfg(feature = "tracing")]
            tracing::debug!(state = %core.state, "Ignoring suspend");
            return;
        }
        core.retire_algorithm();
        core.state = IssuanceState::Suspended;
        self.publish(&core);

        #[cfg(feature = "tracing")]
        tracing::warn!("Issuance suspended until the worker slot is re-acquired");
    }
}
