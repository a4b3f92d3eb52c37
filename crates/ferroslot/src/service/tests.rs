use crate::{
    AlertSink, AtomicSequence, ConnectionEvent, ConnectionListener, Error, IdGeneratorService,
    IssuanceState, MemoryCoordinator, MemoryRegistry, NodePath, Result, SnowflakeId, Strategy,
    SystemClock, TimeSource, WorkerRegistry,
};
use alloc::sync::Arc;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use portable_atomic::{AtomicBool, AtomicU64, Ordering};
use std::collections::HashSet;
use std::thread::{self, scope};
use std::time::{Duration, Instant};

type Service<T = SystemClock> = IdGeneratorService<Arc<MemoryRegistry>, T>;

/// A clock the test moves by hand.
#[derive(Clone)]
struct ManualTime {
    millis: Arc<AtomicU64>,
}

impl ManualTime {
    fn at(millis: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(millis)),
        }
    }

    fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTime {
    fn current_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct RecordingAlerts(Mutex<Vec<String>>);

impl AlertSink for RecordingAlerts {
    fn fatal(&self, reason: &str) {
        self.0.lock().push(reason.to_owned());
    }
}

type Observer = Box<dyn Fn() -> (bool, bool) + Send + Sync>;

/// Wraps a session and holds the first `logout` until the test resumes it.
struct PausingLogout {
    inner: Arc<MemoryRegistry>,
    armed: AtomicBool,
    entered: Sender<()>,
    resume: Receiver<()>,
    // Reports `(is_working, is_connecting)` as seen on entry to `logout`.
    observer: Mutex<Option<Observer>>,
    observed: Mutex<Vec<(bool, bool)>>,
}

impl PausingLogout {
    fn new(inner: Arc<MemoryRegistry>) -> (Arc<Self>, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (resume_tx, resume_rx) = crossbeam_channel::unbounded();
        let registry = Arc::new(Self {
            inner,
            armed: AtomicBool::new(true),
            entered: entered_tx,
            resume: resume_rx,
            observer: Mutex::new(None),
            observed: Mutex::new(Vec::new()),
        });
        (registry, entered_rx, resume_tx)
    }
}

impl WorkerRegistry for PausingLogout {
    fn register(&self) -> Result<i64> {
        self.inner.register()
    }

    fn assigned_group_name(&self) -> Option<String> {
        self.inner.assigned_group_name()
    }

    fn add_connection_listener(&self, listener: Arc<dyn ConnectionListener>) {
        self.inner.add_connection_listener(listener);
    }

    fn logout(&self) -> Result<()> {
        if let Some(observe) = self.observer.lock().as_ref() {
            self.observed.lock().push(observe());
        }
        if self.armed.swap(false, Ordering::AcqRel) {
            self.entered.send(()).unwrap();
            self.resume.recv().unwrap();
        }
        self.inner.logout()
    }
}

fn paused_classic(
    registry: &Arc<PausingLogout>,
) -> IdGeneratorService<Arc<PausingLogout>, SystemClock> {
    IdGeneratorService::new(
        Arc::clone(registry),
        Strategy::ClassicSnowflake,
        SystemClock::default(),
    )
}

fn registry(coordinator: &MemoryCoordinator, group: &str) -> Arc<MemoryRegistry> {
    Arc::new(coordinator.client(NodePath::new("ferroslot", group)))
}

fn classic(registry: &Arc<MemoryRegistry>) -> Service {
    IdGeneratorService::new(
        Arc::clone(registry),
        Strategy::ClassicSnowflake,
        SystemClock::default(),
    )
}

fn flagged(registry: &Arc<MemoryRegistry>) -> Service {
    let strategy = Strategy::FlaggedCounter {
        sequence: Arc::new(AtomicSequence::new(1)),
    };
    IdGeneratorService::new(Arc::clone(registry), strategy, SystemClock::default())
}

/// Connectivity events are applied on the bridge thread.
fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn uninitialized_service_refuses_every_call() {
    let coordinator = MemoryCoordinator::new();
    let service = classic(&registry(&coordinator, "orders"));

    assert_eq!(service.state(), IssuanceState::Uninitialized);
    assert!(!service.is_working());
    assert!(!service.is_connecting());
    assert_eq!(service.next_id(), Err(Error::NotWorking));
    assert_eq!(service.next_ids(10), Err(Error::NotWorking));
    assert_eq!(service.next_string_id(), Err(Error::NotWorking));
    assert_eq!(service.next_fixed_string_id(), Err(Error::NotWorking));
    assert_eq!(service.connect(), Err(Error::NotWorking));
    assert!(service.worker_slot().is_none());
}

#[test]
fn init_acquires_slot_and_is_idempotent() {
    let coordinator = MemoryCoordinator::new();
    let registry = registry(&coordinator, "orders");
    let service = classic(&registry);

    service.init().unwrap();
    service.init().unwrap();

    assert_eq!(service.state(), IssuanceState::Working);
    assert!(service.is_working());
    assert!(!service.is_connecting());
    assert_eq!(registry.listener_count(), 1);
    assert_eq!(registry.register_calls(), 1);

    let slot = service.worker_slot().unwrap();
    assert_eq!(slot.slot_id(), 0);
    assert_eq!(slot.group_name(), "orders");
    assert_eq!(slot.business_flag(), 0);

    let id = SnowflakeId::from_raw(service.next_id().unwrap());
    assert_eq!(id.worker_id(), 0);
}

#[test]
fn ids_are_strictly_increasing() {
    let coordinator = MemoryCoordinator::new();
    let service = classic(&registry(&coordinator, "orders"));
    service.init().unwrap();

    let mut last = 0;
    for _ in 0..10_000 {
        let id = service.next_id().unwrap();
        assert!(id > last);
        last = id;
    }
}

#[test]
fn connectivity_loss_suspends_and_reconnect_resumes() {
    let coordinator = MemoryCoordinator::new();
    let registry = registry(&coordinator, "orders");
    let service = classic(&registry);
    service.init().unwrap();
    let before = service.next_id().unwrap();

    registry.emit(ConnectionEvent::SuspendedLocally);
    wait_for(|| !service.is_working());
    assert_eq!(service.state(), IssuanceState::Suspended);
    assert_eq!(service.next_id(), Err(Error::NotWorking));
    assert!(service.worker_slot().is_none());

    registry.emit(ConnectionEvent::Reconnected);
    wait_for(|| service.is_working());
    assert_eq!(registry.register_calls(), 2);
    assert!(service.next_id().unwrap() > before);
}

#[test]
fn client_shutdown_suspends() {
    let coordinator = MemoryCoordinator::new();
    let registry = registry(&coordinator, "orders");
    let service = classic(&registry);
    service.init().unwrap();

    registry.emit(ConnectionEvent::Closed);
    wait_for(|| service.state() == IssuanceState::Suspended);
}

#[test]
fn lost_session_suspends_and_raises_alert() {
    let coordinator = MemoryCoordinator::new();
    let registry = registry(&coordinator, "orders");
    let alerts = Arc::new(RecordingAlerts::default());
    let service = IdGeneratorService::with_alert_sink(
        Arc::clone(&registry),
        Strategy::ClassicSnowflake,
        SystemClock::default(),
        alerts.clone(),
    );
    service.init().unwrap();

    registry.expire_session();
    wait_for(|| alerts.0.lock().len() == 1);
    assert_eq!(service.state(), IssuanceState::Suspended);
    assert!(coordinator.held_slots(registry.path()).is_empty());

    service.connect().unwrap();
    assert_eq!(service.worker_slot().unwrap().slot_id(), 0);
}

#[test]
fn explicit_suspend_and_connect() {
    let coordinator = MemoryCoordinator::new();
    let service = classic(&registry(&coordinator, "orders"));
    service.init().unwrap();

    service.suspend();
    assert!(!service.is_working());
    assert_eq!(service.next_ids(5), Err(Error::NotWorking));

    service.connect().unwrap();
    assert!(service.is_working());
    assert_eq!(service.next_ids(5).unwrap().len(), 5);
}

#[test]
fn close_flips_flags_then_releases_slot() {
    let coordinator = MemoryCoordinator::new();
    let registry = registry(&coordinator, "orders");
    let service = classic(&registry);
    service.init().unwrap();
    assert_eq!(coordinator.held_slots(registry.path()), [0]);

    service.close();

    assert_eq!(service.state(), IssuanceState::Closed);
    assert!(!service.is_working());
    assert_eq!(service.next_id(), Err(Error::NotWorking));
    assert_eq!(registry.logout_calls(), 1);
    assert!(coordinator.held_slots(registry.path()).is_empty());

    // Closing twice doesn't release twice.
    service.close();
    assert_eq!(registry.logout_calls(), 1);
}

#[test]
fn close_stops_issuance_before_releasing_slot() {
    let coordinator = MemoryCoordinator::new();
    let inner = registry(&coordinator, "orders");
    let (registry, entered, resume) = PausingLogout::new(Arc::clone(&inner));
    let service = paused_classic(&registry);
    service.init().unwrap();

    let observed = service.clone();
    *registry.observer.lock() = Some(Box::new(move || {
        (observed.is_working(), observed.is_connecting())
    }));

    scope(|s| {
        s.spawn(|| service.close());
        entered.recv().unwrap();

        // Release pending: the slot is still held but nothing is issued.
        assert_eq!(inner.held_slot(), Some(0));
        assert!(!service.is_working());
        assert_eq!(service.next_id(), Err(Error::NotWorking));
        resume.send(()).unwrap();
    });

    assert_eq!(*registry.observed.lock(), [(false, false)]);
    assert_eq!(service.state(), IssuanceState::Closed);
    assert_eq!(inner.held_slot(), None);
    registry.observer.lock().take();
}

#[test]
fn init_racing_close_acquires_after_release() {
    let coordinator = MemoryCoordinator::new();
    let inner = registry(&coordinator, "orders");
    let (registry, entered, resume) = PausingLogout::new(Arc::clone(&inner));
    let service = paused_classic(&registry);
    service.init().unwrap();

    scope(|s| {
        s.spawn(|| service.close());
        entered.recv().unwrap();

        let init = s.spawn(|| service.init());
        thread::sleep(Duration::from_millis(20));
        resume.send(()).unwrap();
        init.join().unwrap().unwrap();
    });

    // Working again, on a slot the coordinator still assigns to this session.
    assert!(service.is_working());
    let slot = service.worker_slot().unwrap().slot_id();
    assert_eq!(inner.held_slot(), Some(slot));

    let other = coordinator.client(inner.path().clone());
    assert_ne!(other.register().unwrap(), i64::from(slot));
    assert!(service.next_id().is_ok());
}

#[test]
fn events_after_close_are_ignored() {
    let coordinator = MemoryCoordinator::new();
    let registry = registry(&coordinator, "orders");
    let service = classic(&registry);
    service.init().unwrap();
    service.close();

    registry.emit(ConnectionEvent::Reconnected);
    registry.emit(ConnectionEvent::SuspendedLocally);
    thread::sleep(Duration::from_millis(20));

    assert_eq!(service.state(), IssuanceState::Closed);
    assert_eq!(registry.register_calls(), 1);
    assert_eq!(service.connect(), Err(Error::NotWorking));
}

#[test]
fn reinit_after_close_reacquires_without_new_listener() {
    let coordinator = MemoryCoordinator::new();
    let registry = registry(&coordinator, "orders");
    let service = classic(&registry);
    service.init().unwrap();
    let before = service.next_id().unwrap();
    service.close();

    service.init().unwrap();

    assert!(service.is_working());
    assert_eq!(registry.listener_count(), 1);
    assert_eq!(registry.register_calls(), 2);
    assert_eq!(coordinator.held_slots(registry.path()), [0]);
    assert!(service.next_id().unwrap() > before);
}

#[test]
fn failed_release_does_not_fail_close() {
    let coordinator = MemoryCoordinator::new();
    let registry = registry(&coordinator, "orders");
    let service = classic(&registry);
    service.init().unwrap();
    registry.fail_logout(true);

    service.close();

    assert_eq!(service.state(), IssuanceState::Closed);
    assert_eq!(registry.logout_calls(), 1);
}

#[test]
fn rejected_registration_leaves_service_suspended() {
    let coordinator = MemoryCoordinator::new();
    let registry = registry(&coordinator, "orders");
    let service = classic(&registry);
    registry.reject_registrations(true);

    assert!(matches!(service.init(), Err(Error::Registration { .. })));
    assert_eq!(service.state(), IssuanceState::Suspended);
    assert!(!service.is_working());
    assert!(!service.is_connecting());
    assert_eq!(service.next_id(), Err(Error::NotWorking));

    // Not retried internally; a reconnect event tries again.
    assert_eq!(registry.register_calls(), 1);
    registry.reject_registrations(false);
    registry.emit(ConnectionEvent::Reconnected);
    wait_for(|| service.is_working());

    // Initialized by the successful reconnect.
    service.init().unwrap();
    assert_eq!(registry.register_calls(), 2);
}

#[test]
fn malformed_group_suffix_fails_acquisition() {
    let coordinator = MemoryCoordinator::new();
    let service = flagged(&registry(&coordinator, "orders_abc"));

    assert!(matches!(service.init(), Err(Error::Configuration { .. })));
    assert_eq!(service.state(), IssuanceState::Suspended);
}

#[test]
fn flagged_ids_carry_business_flag_offset() {
    let coordinator = MemoryCoordinator::new();
    let service = flagged(&registry(&coordinator, "orders_7"));
    service.init().unwrap();

    assert_eq!(service.worker_slot().unwrap().business_flag(), 7);
    assert_eq!(service.next_id(), Ok(70_000_001));
    assert_eq!(service.next_string_id().unwrap(), "70000002");
    assert_eq!(service.next_fixed_string_id().unwrap(), "70000003");
}

#[test]
fn fixed_width_grows_by_one_digit_from_flag_ten() {
    let coordinator = MemoryCoordinator::new();

    let plain = flagged(&registry(&coordinator, "orders"));
    plain.init().unwrap();
    assert_eq!(plain.next_fixed_string_id().unwrap(), "00000001");

    let nine = flagged(&registry(&coordinator, "orders_9"));
    nine.init().unwrap();
    assert_eq!(nine.next_fixed_string_id().unwrap().len(), 8);

    let twelve = flagged(&registry(&coordinator, "orders_12"));
    twelve.init().unwrap();
    assert_eq!(twelve.next_fixed_string_id().unwrap(), "120000001");

    let hundred = flagged(&registry(&coordinator, "orders_100"));
    hundred.init().unwrap();
    assert_eq!(hundred.next_fixed_string_id().unwrap(), "1000000001");
}

#[test]
fn classic_fixed_strings_are_nineteen_digits() {
    let coordinator = MemoryCoordinator::new();
    let service = classic(&registry(&coordinator, "orders"));
    service.init().unwrap();

    let a = service.next_fixed_string_id().unwrap();
    let b = service.next_fixed_string_id().unwrap();
    assert_eq!(a.len(), 19);
    assert_eq!(b.len(), 19);
    assert!(a < b);
}

#[test]
fn batch_bounds_are_enforced() {
    let coordinator = MemoryCoordinator::new();
    let service = classic(&registry(&coordinator, "orders"));
    service.init().unwrap();

    for size in [0, -1, 100_001] {
        assert_eq!(service.next_ids(size), Err(Error::InvalidBatchSize { size }));
    }

    let ids = service.next_ids(100_000).unwrap();
    assert_eq!(ids.len(), 100_000);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn clock_regression_surfaces_and_recovers() {
    let coordinator = MemoryCoordinator::new();
    let time = ManualTime::at(1_000);
    let service: Service<ManualTime> = IdGeneratorService::new(
        registry(&coordinator, "orders"),
        Strategy::ClassicSnowflake,
        time.clone(),
    );
    service.init().unwrap();
    let first = service.next_id().unwrap();

    time.set(990);
    assert_eq!(
        service.next_id(),
        Err(Error::ClockRegression {
            last_ms: 1_000,
            now_ms: 990
        })
    );
    assert!(service.is_working());

    time.set(1_000);
    assert!(service.next_id().unwrap() > first);
}

#[test]
fn reacquisition_keeps_clock_checks() {
    let coordinator = MemoryCoordinator::new();
    let time = ManualTime::at(1_000);
    let service: Service<ManualTime> = IdGeneratorService::new(
        registry(&coordinator, "orders"),
        Strategy::ClassicSnowflake,
        time.clone(),
    );
    service.init().unwrap();
    let first = SnowflakeId::from_raw(service.next_id().unwrap());

    service.suspend();
    service.connect().unwrap();

    // Same slot and millisecond: the sequence continues instead of restarting.
    let second = SnowflakeId::from_raw(service.next_id().unwrap());
    assert_eq!(second.timestamp(), first.timestamp());
    assert_eq!(second.sequence(), first.sequence() + 1);

    time.set(999);
    assert!(matches!(
        service.next_id(),
        Err(Error::ClockRegression { .. })
    ));
}

#[test]
fn services_in_one_group_hold_distinct_slots() {
    let coordinator = MemoryCoordinator::new();
    let a = classic(&registry(&coordinator, "orders"));
    let b = classic(&registry(&coordinator, "orders"));
    let other = classic(&registry(&coordinator, "billing"));
    a.init().unwrap();
    b.init().unwrap();
    other.init().unwrap();

    assert_eq!(a.worker_slot().unwrap().slot_id(), 0);
    assert_eq!(b.worker_slot().unwrap().slot_id(), 1);
    assert_eq!(other.worker_slot().unwrap().slot_id(), 0);

    let ids: HashSet<u64> = (0..1_000)
        .flat_map(|_| [a.next_id().unwrap(), b.next_id().unwrap()])
        .collect();
    assert_eq!(ids.len(), 2_000);
}

#[test]
fn threaded_ids_are_unique() {
    const IDS_PER_THREAD: usize = 1_000;
    let threads = num_cpus::get().max(2);

    let coordinator = MemoryCoordinator::new();
    let service = classic(&registry(&coordinator, "orders"));
    service.init().unwrap();

    let seen = Mutex::new(HashSet::with_capacity(threads * IDS_PER_THREAD));
    scope(|s| {
        for _ in 0..threads {
            s.spawn(|| {
                let ids: Vec<u64> = (0..IDS_PER_THREAD)
                    .map(|_| service.next_id().unwrap())
                    .collect();
                let mut seen = seen.lock();
                for id in ids {
                    assert!(seen.insert(id), "duplicate id {id}");
                }
            });
        }
    });

    assert_eq!(seen.lock().len(), threads * IDS_PER_THREAD);
}

#[test]
fn close_during_issuance_is_safe() {
    let coordinator = MemoryCoordinator::new();
    let registry = registry(&coordinator, "orders");
    let service = classic(&registry);
    service.init().unwrap();

    let started = AtomicBool::new(false);
    let issued = Mutex::new(Vec::new());
    scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let mut local = Vec::new();
                loop {
                    match service.next_id() {
                        Ok(id) => {
                            local.push(id);
                            started.store(true, Ordering::Release);
                        }
                        Err(e) => {
                            assert_eq!(e, Error::NotWorking);
                            break;
                        }
                    }
                }
                issued.lock().extend(local);
            });
        }

        wait_for(|| started.load(Ordering::Acquire));
        service.close();
    });

    let issued = issued.into_inner();
    let unique: HashSet<u64> = issued.iter().copied().collect();
    assert_eq!(unique.len(), issued.len());
    assert_eq!(service.next_id(), Err(Error::NotWorking));
    assert!(coordinator.held_slots(registry.path()).is_empty());
}

#[test]
fn clones_share_one_instance() {
    let coordinator = MemoryCoordinator::new();
    let service = classic(&registry(&coordinator, "orders"));
    let handle = service.clone();

    service.init().unwrap();
    assert!(handle.is_working());

    handle.close();
    assert_eq!(service.state(), IssuanceState::Closed);
}
