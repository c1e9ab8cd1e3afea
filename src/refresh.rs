//! Background index-data refresh system
//!
//! Keeps a single cached chain summary up to date by calling an injected fetcher
//! on a recurring tokio schedule. Readers never wait on the node: they see
//! whatever the last successful refresh cycle stored, and discover staleness
//! only through [`Refresher::is_fresh`].

use std::fmt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Maximum age of the last successful fetch for which the cache counts as healthy
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Error type a fetcher may fail with
pub type FetchError = Box<dyn std::error::Error + Send + Sync>;

/// Future returned by a [`Fetcher`]
pub type FetchFuture<T> = BoxFuture<'static, Result<Option<T>, FetchError>>;

/// Source of the payload kept by a [`Refresher`]
///
/// Resolving to `Ok(None)` means the source had nothing to give; the refresher
/// treats that exactly like an error and never caches it.
pub trait Fetcher<T>: Send + Sync {
    fn fetch(&self, offset: u64, limit: u64) -> FetchFuture<T>;
}

impl<T, F, Fut> Fetcher<T> for F
where
    F: Fn(u64, u64) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<T>, FetchError>> + Send + 'static,
{
    fn fetch(&self, offset: u64, limit: u64) -> FetchFuture<T> {
        Box::pin(self(offset, limit))
    }
}

/// Configuration for the refresh schedule and the cached query shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Delay between the end of one cycle and the start of the next
    pub update_interval: Duration,
    /// Fetch attempts per cycle, first attempt included
    pub max_attempts: u32,
    /// Pause between two failed attempts of the same cycle
    pub retry_delay: Duration,
    /// Offset passed to every fetch
    pub query_offset: u64,
    /// Limit passed to every fetch
    pub query_limit: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(60),
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
            query_offset: 0,
            query_limit: 20,
        }
    }
}

/// Why a single fetch attempt did not produce a payload
#[derive(Debug, Error)]
pub enum CycleFailure {
    /// The fetcher returned an error
    #[error("fetch failed: {0}")]
    Fetch(FetchError),

    /// The fetcher resolved without a value
    #[error("fetch returned no data")]
    EmptyResult,

    /// The fetcher or its future panicked
    #[error("fetch panicked: {0}")]
    Panicked(String),
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// What a call to [`Refresher::run_cycle`] ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was already in flight; nothing was fetched
    Skipped,
    /// The payload was replaced after this many attempts
    Refreshed { attempts: u32 },
    /// Every attempt failed; the previous payload was kept
    Exhausted { attempts: u32 },
}

/// Point-in-time view of the cached payload
#[derive(Debug)]
pub struct Snapshot<T> {
    /// Last successfully fetched value, if any
    pub payload: Option<Arc<T>>,
    /// When that value was fetched
    pub last_success_at: Option<DateTime<Utc>>,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            payload: self.payload.clone(),
            last_success_at: self.last_success_at,
        }
    }
}

/// Operator-facing summary of the refresher's recent behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshStatus {
    pub refreshing: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Failed attempts since the last success
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

struct CacheState<T> {
    payload: Option<Arc<T>>,
    last_success_at: Option<DateTime<Utc>>,
    last_attempt_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    last_error: Option<String>,
}

impl<T> Default for CacheState<T> {
    fn default() -> Self {
        Self {
            payload: None,
            last_success_at: None,
            last_attempt_at: None,
            consecutive_failures: 0,
            last_error: None,
        }
    }
}

/// Clears the in-flight flag when a cycle ends, including when its future is dropped
struct RefreshGuard<'a>(&'a AtomicBool);

impl<'a> RefreshGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single-slot cache kept warm by a background schedule
///
/// The refresher is bound to one query shape (`query_offset`, `query_limit`) for
/// its whole lifetime. It owns its state exclusively; everything else observes
/// it through [`peek`](Self::peek), [`is_fresh`](Self::is_fresh) and
/// [`status`](Self::status).
pub struct Refresher<T> {
    config: RefreshConfig,
    fetcher: Box<dyn Fetcher<T>>,
    state: RwLock<CacheState<T>>,
    refreshing: AtomicBool,
}

impl<T> fmt::Debug for Refresher<T> {
    // Payload is left out on purpose; only `peek()` results get rendered.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Refresher")
            .field("config", &self.config)
            .field("refreshing", &self.refreshing.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> Refresher<T> {
    /// Creates an empty refresher. No fetch happens until [`start`](Self::start)
    /// or [`run_cycle`](Self::run_cycle) is called.
    pub fn new(config: RefreshConfig, fetcher: impl Fetcher<T> + 'static) -> Self {
        Self {
            config,
            fetcher: Box::new(fetcher),
            state: RwLock::new(CacheState::default()),
            refreshing: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    /// Runs one refresh cycle: up to `max_attempts` fetches separated by
    /// `retry_delay`. Returns immediately with [`CycleOutcome::Skipped`] if a
    /// cycle is already running. Failures are logged and absorbed.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(_guard) = RefreshGuard::acquire(&self.refreshing) else {
            debug!("Index refresh already in flight, skipping");
            return CycleOutcome::Skipped;
        };

        let max_attempts = self.config.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.attempt().await {
                Ok(payload) => {
                    self.store(payload);
                    info!(attempt, "Index data refreshed");
                    return CycleOutcome::Refreshed { attempts: attempt };
                }
                Err(failure) => {
                    warn!(attempt, max_attempts, error = %failure, "Index refresh attempt failed");
                    self.record_failure(&failure);
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        error!(
            attempts = max_attempts,
            "Index refresh gave up, keeping previous data"
        );
        CycleOutcome::Exhausted {
            attempts: max_attempts,
        }
    }

    async fn attempt(&self) -> Result<T, CycleFailure> {
        self.write_state().last_attempt_at = Some(Utc::now());
        // The call sits inside the async block so a panic while building the
        // future is caught the same way as one raised while polling it.
        let fetch = async {
            self.fetcher
                .fetch(self.config.query_offset, self.config.query_limit)
                .await
        };
        let fetched = AssertUnwindSafe(fetch)
            .catch_unwind()
            .await
            .map_err(|payload| CycleFailure::Panicked(panic_message(payload)))?
            .map_err(CycleFailure::Fetch)?;
        fetched.ok_or(CycleFailure::EmptyResult)
    }

    fn store(&self, payload: T) {
        let now = Utc::now();
        let mut state = self.write_state();
        state.payload = Some(Arc::new(payload));
        state.last_success_at = Some(state.last_success_at.map_or(now, |prev| prev.max(now)));
        state.consecutive_failures = 0;
        state.last_error = None;
    }

    fn record_failure(&self, failure: &CycleFailure) {
        let mut state = self.write_state();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_error = Some(failure.to_string());
    }

    /// Runs one cycle right away, then keeps refreshing every `update_interval`
    /// for as long as the process runs or until the handle is shut down.
    pub async fn start(self: &Arc<Self>) -> RefreshHandle {
        info!(
            offset = self.config.query_offset,
            limit = self.config.query_limit,
            interval_ms = self.config.update_interval.as_millis() as u64,
            "Starting index refresher"
        );
        self.run_cycle().await;
        self.schedule_next()
    }

    /// Spawns the self-rescheduling loop. Each tick waits a full interval after
    /// the previous cycle finished, so slow cycles push later ticks back.
    fn schedule_next(self: &Arc<Self>) -> RefreshHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let refresher = Arc::clone(self);
        let interval = self.config.update_interval;

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        refresher.run_cycle().await;
                    }
                    // A dropped handle closes the channel; that disables this
                    // branch instead of stopping the schedule.
                    Some(()) = shutdown_rx.recv() => {
                        debug!("Index refresher received shutdown");
                        break;
                    }
                }
            }
            info!("Index refresher stopped");
        });

        RefreshHandle { shutdown_tx, task }
    }

    /// Returns the cached payload and its timestamp. Never fetches.
    pub fn peek(&self) -> Snapshot<T> {
        let state = self.read_state();
        Snapshot {
            payload: state.payload.clone(),
            last_success_at: state.last_success_at,
        }
    }

    /// Whether the cache is bound to this query shape
    pub fn serves(&self, offset: u64, limit: u64) -> bool {
        offset == self.config.query_offset && limit == self.config.query_limit
    }

    /// Liveness predicate: a success within [`FRESHNESS_WINDOW`] for this exact
    /// query shape. Does not care whether a refresh is currently running.
    pub fn is_fresh(&self, offset: u64, limit: u64) -> bool {
        self.is_fresh_at(offset, limit, Utc::now())
    }

    pub fn is_fresh_at(&self, offset: u64, limit: u64, now: DateTime<Utc>) -> bool {
        if !self.serves(offset, limit) {
            return false;
        }
        let Some(last_success_at) = self.read_state().last_success_at else {
            return false;
        };
        match (now - last_success_at).to_std() {
            Ok(age) => age <= FRESHNESS_WINDOW,
            // Negative age: the success is newer than `now`
            Err(_) => true,
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    pub fn status(&self) -> RefreshStatus {
        let state = self.read_state();
        RefreshStatus {
            refreshing: self.is_refreshing(),
            last_success_at: state.last_success_at,
            last_attempt_at: state.last_attempt_at,
            consecutive_failures: state.consecutive_failures,
            last_error: state.last_error.clone(),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CacheState<T>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CacheState<T>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle for controlling the background refresh schedule
///
/// Dropping the handle leaves the schedule running for the rest of the process.
pub struct RefreshHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Cancels the pending timer and waits for the loop to exit. A cycle that
    /// is already running is allowed to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(err) = self.task.await {
            warn!(error = %err, "Index refresher task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
