use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::connector::Connector;
use super::store::{DocumentStore, StoreError};

/// Lifecycle of the single data-store link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Error,
    Disconnected,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Timing knobs for reconnection, liveness probing and shutdown.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retry_delay: Duration,
    pub probe_interval: Duration,
    pub close_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(5),
            probe_interval: Duration::from_secs(10),
            close_timeout: Duration::from_secs(10),
        }
    }
}

struct Link {
    state: ConnectionState,
    store: Option<Arc<dyn DocumentStore>>,
    /// Bumped on every successful connect and on close; retries and probes
    /// armed for an older generation are ignored.
    generation: u64,
}

struct Shared {
    uri: String,
    connector: Arc<dyn Connector>,
    policy: RetryPolicy,
    link: RwLock<Link>,
    retry_pending: AtomicBool,
    retries_scheduled: AtomicU64,
}

/// Owns the one data-store connection for the process: connects, notices
/// failures, schedules at most one reconnection at a time, and closes it on
/// shutdown.
pub struct ConnectionSupervisor {
    shared: Arc<Shared>,
}

/// Read-only view of the supervised connection handed to handlers.
///
/// Every access goes through [`ConnectionHandle::execute`], which fails fast
/// unless the link is `Connected` and reports connection-class failures back
/// to the supervisor.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, Link> {
        self.link.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Link> {
        self.link.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// One connection attempt. `armed_for` is the generation a retry was
    /// scheduled against; `None` for the initial connect.
    fn attempt(self: Arc<Self>, armed_for: Option<u64>) -> BoxFuture<'static, ConnectionState> {
        async move {
            {
                let mut link = self.write();
                if link.state == ConnectionState::Closed {
                    return ConnectionState::Closed;
                }
                if let Some(generation) = armed_for {
                    if generation != link.generation {
                        debug!("Ignoring stale reconnection for generation {}", generation);
                        return link.state;
                    }
                }
                link.state = ConnectionState::Connecting;
            }

            match self.connector.connect(&self.uri).await {
                Ok(store) => {
                    let installed = {
                        let mut link = self.write();
                        if link.state == ConnectionState::Closed {
                            None
                        } else {
                            link.generation += 1;
                            link.state = ConnectionState::Connected;
                            link.store = Some(store.clone());
                            Some(link.generation)
                        }
                    };

                    match installed {
                        Some(generation) => {
                            info!("Data store connection established (generation {})", generation);
                            self.clone().watch(generation);
                            ConnectionState::Connected
                        }
                        None => {
                            // Closed while connecting; release the late link.
                            if let Err(e) = store.close().await {
                                warn!("Failed to release connection opened during shutdown: {}", e);
                            }
                            ConnectionState::Closed
                        }
                    }
                }
                Err(err) => {
                    let generation = {
                        let mut link = self.write();
                        if link.state == ConnectionState::Closed {
                            return ConnectionState::Closed;
                        }
                        link.state = ConnectionState::Error;
                        link.store = None;
                        link.generation
                    };
                    error!("Data store connection failed: {}", err);
                    self.schedule_retry(generation);
                    ConnectionState::Error
                }
            }
        }
        .boxed()
    }

    /// Arm a single deferred reconnection. No-op while one is already pending.
    fn schedule_retry(self: &Arc<Self>, generation: u64) {
        if self
            .retry_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Reconnection already pending; not arming another");
            return;
        }
        self.retries_scheduled.fetch_add(1, Ordering::SeqCst);

        let delay = self.policy.retry_delay;
        info!("Reconnecting to data store in {:?}", delay);

        let shared = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.retry_pending.store(false, Ordering::Release);

            let live = {
                let link = shared.read();
                link.generation == generation
                    && matches!(link.state, ConnectionState::Error | ConnectionState::Disconnected)
            };
            if !live {
                debug!("Dropping superseded reconnection for generation {}", generation);
                return;
            }
            shared.attempt(Some(generation)).await;
        });
    }

    /// Periodic liveness probe for one connection generation.
    fn watch(self: Arc<Self>, generation: u64) {
        let interval = self.policy.probe_interval;
        if interval.is_zero() {
            return;
        }
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let store = {
                    let link = self.read();
                    if link.generation != generation || link.state != ConnectionState::Connected {
                        return;
                    }
                    link.store.clone()
                };
                let Some(store) = store else { return };
                if let Err(err) = store.ping().await {
                    self.lost(generation, &err);
                    return;
                }
            }
        });
    }

    /// Connected -> Disconnected for `generation`, then arm a reconnection.
    fn lost(self: &Arc<Self>, generation: u64, reason: &StoreError) {
        {
            let mut link = self.write();
            if link.generation != generation || link.state != ConnectionState::Connected {
                return;
            }
            link.state = ConnectionState::Disconnected;
            link.store = None;
        }
        warn!("Data store disconnected: {}", reason);
        self.schedule_retry(generation);
    }
}

impl ConnectionSupervisor {
    pub fn new(uri: impl Into<String>, connector: Arc<dyn Connector>, policy: RetryPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                uri: uri.into(),
                connector,
                policy,
                link: RwLock::new(Link {
                    state: ConnectionState::Connecting,
                    store: None,
                    generation: 0,
                }),
                retry_pending: AtomicBool::new(false),
                retries_scheduled: AtomicU64::new(0),
            }),
        }
    }

    /// Attempt the initial connection. Failure leaves the supervisor in
    /// `Error` with a reconnection armed; it is not returned as an error.
    pub async fn connect(&self) -> ConnectionState {
        self.shared.clone().attempt(None).await
    }

    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.read().state
    }

    pub fn generation(&self) -> u64 {
        self.shared.read().generation
    }

    pub fn retry_pending(&self) -> bool {
        self.shared.retry_pending.load(Ordering::Acquire)
    }

    /// Total reconnections armed since startup.
    pub fn retries_scheduled(&self) -> u64 {
        self.shared.retries_scheduled.load(Ordering::SeqCst)
    }

    /// Close the connection once. Outcome is logged, never returned.
    pub async fn close(&self) {
        let store = {
            let mut link = self.shared.write();
            if link.state == ConnectionState::Closed {
                return;
            }
            link.state = ConnectionState::Closed;
            link.generation += 1;
            link.store.take()
        };

        let Some(store) = store else {
            info!("Data store supervisor closed (no open connection)");
            return;
        };

        match tokio::time::timeout(self.shared.policy.close_timeout, store.close()).await {
            Ok(Ok(())) => info!("Data store connection closed"),
            Ok(Err(e)) => error!("Failed to close data store connection: {}", e),
            Err(_) => error!(
                "Timed out after {:?} closing data store connection",
                self.shared.policy.close_timeout
            ),
        }
    }
}

impl ConnectionHandle {
    pub fn state(&self) -> ConnectionState {
        self.shared.read().state
    }

    /// Current store and its generation, or `Unavailable` unless connected.
    fn lease(&self) -> Result<(Arc<dyn DocumentStore>, u64), StoreError> {
        let link = self.shared.read();
        match (&link.store, link.state) {
            (Some(store), ConnectionState::Connected) => Ok((store.clone(), link.generation)),
            (_, state) => Err(StoreError::Unavailable(state)),
        }
    }

    /// Run one data-store operation against the live connection.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(Arc<dyn DocumentStore>) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let (store, generation) = self.lease()?;
        let result = op(store).await;
        if let Err(err) = &result {
            if err.is_connection() {
                self.shared.lost(generation, err);
            }
        }
        result
    }
}
