use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use beacon_core::config::RegistryConfig;
use beacon_core::error::{BeaconError, Result};
use beacon_core::registry::{Descriptor, InstanceEnvironment, RegistryState, RegistryStore};

use super::lease::LeaseScheduler;

/// Registers this instance in the backing store and keeps its lease alive.
///
/// Lifecycle is construct, [`start`](Self::start), [`stop`](Self::stop).
/// Registration failures are returned to the caller; renewal failures are
/// only logged. Each client owns its own renewal task, so independent
/// clients can coexist in one process.
pub struct RegistryClient {
    inner: Arc<ClientInner>,
    lease: LeaseScheduler,
    deregister_on_shutdown: bool,
}

struct ClientInner {
    descriptor: Descriptor,
    store: Arc<dyn RegistryStore>,
    state: watch::Sender<RegistryState>,
    last_write: Mutex<Option<DateTime<Utc>>>,
}

impl RegistryClient {
    /// Capture the descriptor from `env` and arm the renewal scheduler.
    ///
    /// Fails if the host or port cannot be determined, or if `config` is
    /// invalid.
    pub fn new(
        env: &dyn InstanceEnvironment,
        store: Arc<dyn RegistryStore>,
        config: &RegistryConfig,
    ) -> Result<Self> {
        config.validate()?;
        let descriptor = Descriptor::capture(env)?;
        Self::with_descriptor(descriptor, store, config)
    }

    /// Create a client for an already captured descriptor.
    ///
    /// A zero renewal period is rejected.
    pub fn with_descriptor(
        descriptor: Descriptor,
        store: Arc<dyn RegistryStore>,
        config: &RegistryConfig,
    ) -> Result<Self> {
        config.validate()?;
        let (state, _) = watch::channel(RegistryState::Unregistered);
        Ok(Self {
            inner: Arc::new(ClientInner {
                descriptor,
                store,
                state,
                last_write: Mutex::new(None),
            }),
            lease: LeaseScheduler::new(config.renew_interval(), config.stop_timeout()),
            deregister_on_shutdown: config.deregister_on_shutdown,
        })
    }

    /// The registered identity.
    pub fn descriptor(&self) -> &Descriptor {
        &self.inner.descriptor
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RegistryState {
        *self.inner.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<RegistryState> {
        self.inner.state.subscribe()
    }

    /// Whether the renewal task is running.
    pub fn is_renewing(&self) -> bool {
        self.lease.is_active()
    }

    /// Register this instance, replacing any leftover record at the same
    /// address, then start lease renewal.
    ///
    /// Calling `start` on a registered client registers again and keeps the
    /// existing renewal task. Calling it after `stop` or after a failed
    /// registration returns [`BeaconError::InvalidState`].
    pub async fn start(&self) -> Result<()> {
        let mut was_registered = false;
        let mut rejected = None;
        self.inner.state.send_if_modified(|state| match *state {
            RegistryState::Unregistered => {
                *state = RegistryState::Registering;
                true
            }
            RegistryState::Registered | RegistryState::Renewing => {
                was_registered = true;
                false
            }
            other => {
                rejected = Some(other);
                false
            }
        });
        if let Some(state) = rejected {
            return Err(BeaconError::InvalidState(format!(
                "Cannot start registry client in state {}",
                state
            )));
        }

        let (host, port) = self.inner.descriptor.key();
        if let Err(e) = self.inner.register().await {
            if !was_registered {
                self.inner.transition(
                    RegistryState::Registering,
                    RegistryState::RegistrationFailed,
                );
            }
            return Err(BeaconError::registration(host, port, e));
        }

        if !was_registered
            && !self
                .inner
                .transition(RegistryState::Registering, RegistryState::Registered)
        {
            // stop() ran while the record was being written
            return Err(BeaconError::InvalidState(
                "Registry client stopped during registration".into(),
            ));
        }

        let inner = Arc::clone(&self.inner);
        let span = tracing::info_span!("lease_renewal", host = %host, port = port);
        if self.lease.activate(
            move || {
                let inner = Arc::clone(&inner);
                async move { inner.renew().await }
            },
            span,
        ) {
            tracing::debug!(period = ?self.lease.period(), "Lease renewal scheduled");
        }

        tracing::info!(
            host = %host,
            port = port,
            project = %self.inner.descriptor.project_name(),
            "Instance registered"
        );
        Ok(())
    }

    /// Cancel lease renewal. Never fails.
    ///
    /// The registry record is left in place for readers to age out, unless
    /// `deregister_on_shutdown` is set.
    pub async fn stop(&self) {
        let previous = self.inner.state.send_replace(RegistryState::Stopped);
        let (host, port) = self.inner.descriptor.key();

        if previous == RegistryState::Stopped {
            tracing::debug!(host = %host, port = port, "Registry client already stopped");
            return;
        }

        if let Err(e) = self.lease.cancel().await {
            tracing::warn!(
                host = %host,
                port = port,
                error = %e,
                "Failed to cancel lease renewal"
            );
        }

        if self.deregister_on_shutdown && previous.is_registered() {
            if let Err(e) = self.deregister().await {
                tracing::warn!(host = %host, port = port, error = %e, "Failed to deregister");
            }
        }

        tracing::info!(
            host = %host,
            port = port,
            previous = %previous,
            "Registry client stopped"
        );
    }

    /// Delete this instance's record from the store.
    pub async fn deregister(&self) -> Result<()> {
        let (host, port) = self.inner.descriptor.key();
        self.inner.store.delete(host, port).await?;
        tracing::info!(host = %host, port = port, "Instance deregistered");
        Ok(())
    }
}

impl Drop for RegistryClient {
    fn drop(&mut self) {
        if self.lease.is_active() {
            tracing::debug!(
                instance = %self.inner.descriptor,
                "RegistryClient dropped while renewing (stop should be called explicitly)"
            );
        }
    }
}

impl ClientInner {
    /// Delete then insert. Not atomic: a crash in between leaves no record,
    /// never two.
    async fn register(&self) -> Result<()> {
        let (host, port) = self.descriptor.key();
        self.store.delete(host, port).await?;
        self.store.insert(&self.descriptor, self.stamp()).await?;
        Ok(())
    }

    /// Refresh the record's timestamp. Called by the renewal task only.
    async fn renew(&self) -> Result<()> {
        self.transition(RegistryState::Registered, RegistryState::Renewing);
        let result = self.store.update(&self.descriptor, self.stamp()).await;
        self.transition(RegistryState::Renewing, RegistryState::Registered);

        result.map_err(|e| match e {
            BeaconError::NotFound(_) => BeaconError::NotFound(format!(
                "Registry record for {} is missing; it is recreated on the next start",
                self.descriptor
            )),
            other => other,
        })
    }

    /// Move from `from` to `to`; returns whether the state was `from`.
    fn transition(&self, from: RegistryState, to: RegistryState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Timestamp for the next write, never earlier than the previous one.
    fn stamp(&self) -> DateTime<Utc> {
        let mut last = self.last_write.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        let stamp = match *last {
            Some(previous) if previous > now => previous,
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use beacon_core::config::InstanceConfig;
    use beacon_core::registry::{RegistryRecord, StoreFuture};
    use beacon_core::testing::{MemoryRegistryStore, StoreOp};
    use tokio::time::Instant;

    const PERIOD: Duration = Duration::from_secs(60);

    fn env() -> InstanceConfig {
        InstanceConfig {
            host: Some("10.0.0.7".into()),
            port: Some(8080),
            install_dir: Some("/opt/billing".into()),
            profiles: vec!["prod".into()],
            project_name: Some("billing".into()),
            build_version: Some("1.4.2".into()),
            build_time: Some("2026-10-01T12:00:00Z".into()),
        }
    }

    fn config() -> RegistryConfig {
        RegistryConfig {
            renew_interval_secs: PERIOD.as_secs(),
            ..Default::default()
        }
    }

    fn client(store: &Arc<MemoryRegistryStore>) -> RegistryClient {
        RegistryClient::new(&env(), store.clone(), &config()).unwrap()
    }

    #[tokio::test]
    async fn test_construction_requires_addressable_descriptor() {
        let store = Arc::new(MemoryRegistryStore::new());
        let env = InstanceConfig {
            port: Some(0),
            ..env()
        };

        let result = RegistryClient::new(&env, store.clone(), &config());
        assert!(matches!(result, Err(BeaconError::Descriptor(_))));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_construction_rejects_zero_period() {
        let store = Arc::new(MemoryRegistryStore::new());
        let config = RegistryConfig {
            renew_interval_secs: 0,
            ..config()
        };

        let result = RegistryClient::new(&env(), store.clone(), &config);
        assert!(matches!(result, Err(BeaconError::Config(_))));

        let descriptor = Descriptor::capture(&env()).unwrap();
        let result = RegistryClient::with_descriptor(descriptor, store.clone(), &config);
        assert!(matches!(result, Err(BeaconError::Config(_))));
        assert!(store.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_deletes_then_inserts() {
        let store = Arc::new(MemoryRegistryStore::new());
        let client = client(&store);
        assert_eq!(client.state(), RegistryState::Unregistered);

        tokio_test::assert_ok!(client.start().await);

        let ops: Vec<StoreOp> = store.calls().iter().map(|c| c.op).collect();
        assert_eq!(ops, vec![StoreOp::Delete, StoreOp::Insert]);
        assert_eq!(client.state(), RegistryState::Registered);
        assert!(client.is_renewing());

        let record = store.record("10.0.0.7", 8080).unwrap();
        assert_eq!(record.descriptor.profile(), Some("prod"));
        assert_eq!(record.descriptor.install_dir(), Some("/opt/billing"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_failure_is_fatal_and_never_renews() {
        let store = Arc::new(MemoryRegistryStore::new());
        store.fail_next(StoreOp::Delete, 1);
        let client = client(&store);

        let err = client.start().await.unwrap_err();
        assert!(matches!(err, BeaconError::Registration { port: 8080, .. }));
        assert_eq!(store.count(StoreOp::Insert), 0);
        assert_eq!(client.state(), RegistryState::RegistrationFailed);

        tokio::time::sleep(PERIOD * 10).await;
        assert_eq!(store.count(StoreOp::Update), 0);
        assert!(!client.is_renewing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_failure_is_fatal_and_never_renews() {
        let store = Arc::new(MemoryRegistryStore::new());
        store.fail_next(StoreOp::Insert, 1);
        let client = client(&store);

        let err = client.start().await.unwrap_err();
        assert!(err.to_string().contains("injected Insert failure"));
        assert_eq!(store.count(StoreOp::Delete), 1);
        assert!(store.records().is_empty());

        tokio::time::sleep(PERIOD * 10).await;
        assert_eq!(store.count(StoreOp::Update), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_registration_is_terminal() {
        let store = Arc::new(MemoryRegistryStore::new());
        store.fail_next(StoreOp::Insert, 1);
        let client = client(&store);

        assert!(client.start().await.is_err());
        let err = client.start().await.unwrap_err();
        assert!(matches!(err, BeaconError::InvalidState(_)));
        assert_eq!(store.count(StoreOp::Insert), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renewals_are_fixed_delay() {
        let store = Arc::new(MemoryRegistryStore::new());
        let client = client(&store);

        client.start().await.unwrap();
        let started = Instant::now();
        tokio::time::sleep(PERIOD * 3 + Duration::from_secs(5)).await;

        let updates = store.calls_of(StoreOp::Update);
        assert_eq!(updates.len(), 3);
        assert!(updates[0].at - started >= PERIOD);
        for pair in updates.windows(2) {
            assert!(pair[1].at - pair[0].at >= PERIOD);
        }

        let inserted = store.calls_of(StoreOp::Insert)[0].registry_time.unwrap();
        let mut previous = inserted;
        for update in &updates {
            let time = update.registry_time.unwrap();
            assert!(time >= previous);
            previous = time;
        }
    }

    /// Delegates to a memory store after a fixed delay on every update.
    struct SlowStore {
        inner: MemoryRegistryStore,
        delay: Duration,
    }

    impl RegistryStore for SlowStore {
        fn delete<'a>(&'a self, host: &'a str, port: u16) -> StoreFuture<'a> {
            self.inner.delete(host, port)
        }

        fn insert<'a>(
            &'a self,
            descriptor: &'a Descriptor,
            registry_time: DateTime<Utc>,
        ) -> StoreFuture<'a> {
            self.inner.insert(descriptor, registry_time)
        }

        fn update<'a>(
            &'a self,
            descriptor: &'a Descriptor,
            registry_time: DateTime<Utc>,
        ) -> StoreFuture<'a> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                self.inner.update(descriptor, registry_time).await
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_renewal_pushes_next_renewal_back() {
        let delay = Duration::from_secs(20);
        let store = Arc::new(SlowStore {
            inner: MemoryRegistryStore::new(),
            delay,
        });
        let client = RegistryClient::new(&env(), store.clone(), &config()).unwrap();

        client.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(300)).await;

        let updates = store.inner.calls_of(StoreOp::Update);
        assert_eq!(updates.len(), 3);
        for pair in updates.windows(2) {
            assert!(pair[1].at - pair[0].at >= PERIOD + delay);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_renewal_keeps_loop_running() {
        let store = Arc::new(MemoryRegistryStore::new());
        let client = client(&store);
        client.start().await.unwrap();

        tokio::time::sleep(PERIOD + Duration::from_secs(1)).await;
        store.fail_next(StoreOp::Update, 1);
        tokio::time::sleep(PERIOD * 2).await;

        let outcomes: Vec<bool> = store
            .calls_of(StoreOp::Update)
            .iter()
            .map(|c| c.succeeded)
            .collect();
        assert_eq!(outcomes, vec![true, false, true]);
        assert_eq!(client.state(), RegistryState::Registered);
        assert!(client.is_renewing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_record_is_logged_not_fatal() {
        let store = Arc::new(MemoryRegistryStore::new());
        let client = client(&store);
        client.start().await.unwrap();

        // an external reaper removed the row
        store.delete("10.0.0.7", 8080).await.unwrap();
        tokio::time::sleep(PERIOD * 2 + Duration::from_secs(1)).await;

        assert_eq!(store.count(StoreOp::Update), 2);
        assert!(store.calls_of(StoreOp::Update).iter().all(|c| !c.succeeded));
        assert!(client.is_renewing());
    }

    /// Panics on the first update, then behaves.
    struct PanickyStore {
        inner: MemoryRegistryStore,
        updates: AtomicUsize,
    }

    impl RegistryStore for PanickyStore {
        fn delete<'a>(&'a self, host: &'a str, port: u16) -> StoreFuture<'a> {
            self.inner.delete(host, port)
        }

        fn insert<'a>(
            &'a self,
            descriptor: &'a Descriptor,
            registry_time: DateTime<Utc>,
        ) -> StoreFuture<'a> {
            self.inner.insert(descriptor, registry_time)
        }

        fn update<'a>(
            &'a self,
            descriptor: &'a Descriptor,
            registry_time: DateTime<Utc>,
        ) -> StoreFuture<'a> {
            Box::pin(async move {
                if self.updates.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("driver bug");
                }
                self.inner.update(descriptor, registry_time).await
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_renewal_keeps_loop_running() {
        let store = Arc::new(PanickyStore {
            inner: MemoryRegistryStore::new(),
            updates: AtomicUsize::new(0),
        });
        let client = RegistryClient::new(&env(), store.clone(), &config()).unwrap();
        client.start().await.unwrap();

        tokio::time::sleep(PERIOD * 3 + Duration::from_secs(1)).await;

        assert_eq!(store.updates.load(Ordering::SeqCst), 3);
        assert_eq!(store.inner.count(StoreOp::Update), 2);
        assert!(client.is_renewing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_renewals() {
        let store = Arc::new(MemoryRegistryStore::new());
        let client = client(&store);
        client.start().await.unwrap();

        tokio::time::sleep(PERIOD + Duration::from_secs(1)).await;
        client.stop().await;
        tokio::time::sleep(PERIOD * 10).await;

        assert_eq!(store.count(StoreOp::Update), 1);
        assert_eq!(client.state(), RegistryState::Stopped);
        assert!(!client.is_renewing());
        // stale-by-timestamp: the row stays for readers to age out
        assert!(store.record("10.0.0.7", 8080).is_some());

        let err = client.start().await.unwrap_err();
        assert!(matches!(err, BeaconError::InvalidState(_)));
    }

    /// Blocks the worker thread inside every update, so cancellation cannot
    /// interrupt it.
    struct BlockingStore {
        inner: MemoryRegistryStore,
        block_for: Duration,
        updates_started: AtomicUsize,
    }

    impl RegistryStore for BlockingStore {
        fn delete<'a>(&'a self, host: &'a str, port: u16) -> StoreFuture<'a> {
            self.inner.delete(host, port)
        }

        fn insert<'a>(
            &'a self,
            descriptor: &'a Descriptor,
            registry_time: DateTime<Utc>,
        ) -> StoreFuture<'a> {
            self.inner.insert(descriptor, registry_time)
        }

        fn update<'a>(
            &'a self,
            descriptor: &'a Descriptor,
            registry_time: DateTime<Utc>,
        ) -> StoreFuture<'a> {
            Box::pin(async move {
                self.updates_started.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(self.block_for);
                self.inner.update(descriptor, registry_time).await
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_survives_failed_cancellation() {
        let store = Arc::new(BlockingStore {
            inner: MemoryRegistryStore::new(),
            block_for: Duration::from_millis(800),
            updates_started: AtomicUsize::new(0),
        });
        let config = RegistryConfig {
            renew_interval_secs: 1,
            stop_timeout_secs: 0,
            ..Default::default()
        };
        let client = RegistryClient::new(&env(), store.clone(), &config).unwrap();
        client.start().await.unwrap();

        // land inside the first blocking renewal
        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert_eq!(store.updates_started.load(Ordering::SeqCst), 1);

        client.stop().await;
        assert_eq!(client.state(), RegistryState::Stopped);

        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(store.updates_started.load(Ordering::SeqCst), 1);
        assert!(!client.is_renewing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_keeps_one_record_and_one_lease() {
        let store = Arc::new(MemoryRegistryStore::new());
        let client = client(&store);

        client.start().await.unwrap();
        client.start().await.unwrap();

        assert_eq!(store.records().len(), 1);
        assert_eq!(store.count(StoreOp::Delete), 2);

        tokio::time::sleep(PERIOD + Duration::from_secs(1)).await;
        assert_eq!(store.count(StoreOp::Update), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_leftover_record() {
        let store = Arc::new(MemoryRegistryStore::new());
        let leftover_time = Utc::now() - chrono::Duration::hours(3);
        let descriptor = Descriptor::capture(&env()).unwrap();
        store.seed(RegistryRecord::new(descriptor, leftover_time));

        let first = client(&store);
        first.start().await.unwrap();
        // the process dies without stopping; a new process starts
        drop(first);
        let second = client(&store);
        second.start().await.unwrap();

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].registry_time > leftover_time);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timestamps_hold_when_wall_clock_steps_back() {
        let store = Arc::new(MemoryRegistryStore::new());
        let client = client(&store);
        // last write happened before the wall clock was set back an hour
        let ahead = Utc::now() + chrono::Duration::hours(1);
        *client.inner.last_write.lock().unwrap() = Some(ahead);

        client.start().await.unwrap();
        tokio::time::sleep(PERIOD + Duration::from_secs(1)).await;

        let written: Vec<DateTime<Utc>> = store
            .calls()
            .iter()
            .filter_map(|c| c.registry_time)
            .collect();
        assert_eq!(written, vec![ahead, ahead]);
        assert_eq!(store.record("10.0.0.7", 8080).unwrap().registry_time, ahead);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let store = Arc::new(MemoryRegistryStore::new());
        let client = client(&store);

        client.stop().await;
        client.stop().await;

        assert_eq!(client.state(), RegistryState::Stopped);
        assert!(store.calls().is_empty());
        assert!(client.start().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deregister_on_shutdown() {
        let store = Arc::new(MemoryRegistryStore::new());
        let config = RegistryConfig {
            deregister_on_shutdown: true,
            ..config()
        };
        let client = RegistryClient::new(&env(), store.clone(), &config).unwrap();

        client.start().await.unwrap();
        client.stop().await;

        assert!(store.records().is_empty());
        assert_eq!(store.count(StoreOp::Delete), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deregister_failure_does_not_escape_stop() {
        let store = Arc::new(MemoryRegistryStore::new());
        let config = RegistryConfig {
            deregister_on_shutdown: true,
            ..config()
        };
        let client = RegistryClient::new(&env(), store.clone(), &config).unwrap();

        client.start().await.unwrap();
        store.fail_always(StoreOp::Delete);
        client.stop().await;

        assert_eq!(client.state(), RegistryState::Stopped);
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_sees_lifecycle() {
        let store = Arc::new(MemoryRegistryStore::new());
        let client = client(&store);
        let mut rx = client.subscribe();

        client.start().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), RegistryState::Registered);

        client.stop().await;
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), RegistryState::Stopped);
    }
}
