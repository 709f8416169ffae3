//! Pool controller
//!
//! Owns the fixed set of workers, the free-worker stack, and the FIFO queue
//! of pending calls. Every mutation of that bookkeeping happens under one
//! lock, either from [`Pool::dispatch`], from [`Pool::dispose`], or from the
//! controller thread that drains worker notifications.

use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::call::{CallHandle, CallOutcome, PendingCall, Settler};
use crate::codec::Payload;
use crate::config::PoolConfig;
use crate::error::{ExecutionError, PoolError};
use crate::worker::{BoundFn, WorkerEvent, WorkerHandle, WorkerId, WorkerState};

/// Pool lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    /// Accepting and executing calls
    Running,
    /// Disposed; every call is rejected
    Disposed,
}

/// Point-in-time snapshot of pool bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub pool_id: Uuid,
    pub size: usize,
    pub free: usize,
    pub running: usize,
    pub waiting: usize,
    /// Calls whose worker returned a value
    pub completed: u64,
    /// Calls rejected with an execution error
    pub failed: u64,
    pub status: PoolStatus,
}

/// Produces a fresh copy of the bound function for a worker thread
type BoundFactory = Box<dyn FnMut() -> BoundFn + Send>;

/// Controller bookkeeping, guarded by [`Shared::state`]
struct PoolState {
    workers: Vec<WorkerHandle>,
    /// Free workers, most recently freed last
    free: Vec<WorkerId>,
    pending: VecDeque<PendingCall>,
    factory: BoundFactory,
    status: PoolStatus,
    completed: u64,
    failed: u64,
}

struct Shared {
    id: Uuid,
    config: PoolConfig,
    state: Mutex<PoolState>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    next_call_id: AtomicU64,
}

/// A bounded pool of worker threads running one bound function
///
/// Calls are executed on a free worker right away or queued in arrival order
/// until one frees up. The most recently freed worker is reused first.
///
/// # Example
///
/// ```
/// use fnpool::Pool;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pool = Pool::new(|(a, b): (i64, i64)| Ok::<_, String>(a + b), 2).unwrap();
///
/// let sum = pool.dispatch(&(2, 3)).await.unwrap();
/// assert_eq!(sum, 5);
///
/// pool.dispose();
/// # }
/// ```
pub struct Pool<A, R> {
    shared: Arc<Shared>,
    controller: Mutex<Option<JoinHandle<()>>>,
    _types: PhantomData<fn(A) -> R>,
}

impl<A, R> Pool<A, R>
where
    A: Serialize + DeserializeOwned + 'static,
    R: Serialize + DeserializeOwned + 'static,
{
    /// Create a pool of `size` workers, each running its own copy of `f`
    ///
    /// `f` must not rely on state outside its own definition: every worker
    /// receives a clone and runs it on a separate thread.
    pub fn new<F, E>(f: F, size: usize) -> Result<Self, PoolError>
    where
        F: Fn(A) -> Result<R, E> + Clone + Send + 'static,
        E: fmt::Display + 'static,
    {
        Self::with_config(f, PoolConfig::new(size))
    }

    /// Create a pool from a full configuration
    pub fn with_config<F, E>(f: F, config: PoolConfig) -> Result<Self, PoolError>
    where
        F: Fn(A) -> Result<R, E> + Clone + Send + 'static,
        E: fmt::Display + 'static,
    {
        config.validate()?;

        let id = Uuid::now_v7();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut factory = bind_factory(f);

        let mut workers = Vec::with_capacity(config.size);
        for worker_id in 0..config.size {
            match WorkerHandle::spawn(worker_id, &config, factory(), events_tx.clone()) {
                Ok(worker) => workers.push(worker),
                Err(err) => {
                    error!(pool_id = %id, worker = worker_id, "Failed to spawn worker: {}", err);
                    shutdown_workers(&mut workers);
                    return Err(PoolError::Spawn(err));
                }
            }
        }

        // Reversed so the first pop hands out worker 0
        let free = (0..config.size).rev().collect();

        let shared = Arc::new(Shared {
            id,
            config,
            state: Mutex::new(PoolState {
                workers,
                free,
                pending: VecDeque::new(),
                factory,
                status: PoolStatus::Running,
                completed: 0,
                failed: 0,
            }),
            events: events_tx,
            next_call_id: AtomicU64::new(1),
        });

        let controller = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("{}-controller", shared.config.thread_name_prefix))
                .spawn(move || run_controller(shared, events_rx))
        };
        let controller = match controller {
            Ok(handle) => handle,
            Err(err) => {
                error!(pool_id = %id, "Failed to spawn controller: {}", err);
                shutdown_workers(&mut shared.state.lock().workers);
                return Err(PoolError::Spawn(err));
            }
        };

        info!(pool_id = %id, size = shared.config.size, "Worker pool started");

        Ok(Self {
            shared,
            controller: Mutex::new(Some(controller)),
            _types: PhantomData,
        })
    }

    /// Submit a call
    ///
    /// Returns immediately. The handle resolves with the function's result, or
    /// rejects with the execution error or [`PoolError::Disposed`].
    pub fn dispatch(&self, args: &A) -> CallHandle<R> {
        let call_id = self.shared.next_call_id.fetch_add(1, Ordering::Relaxed);

        let payload = match Payload::encode(args) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(pool_id = %self.shared.id, call_id, "Failed to encode arguments: {}", err);
                return CallHandle::rejected(call_id, err.into());
            }
        };

        let (call, handle) = PendingCall::new(call_id, payload);
        if let Err(call) = self.shared.assign(call) {
            debug!(pool_id = %self.shared.id, call_id, "Rejecting call on disposed pool");
            call.settler.settle(Err(PoolError::Disposed));
        }
        handle
    }
}

impl<A, R> Pool<A, R> {
    /// Dispose the pool
    ///
    /// Terminates every worker, rejects queued and in-flight calls with
    /// [`PoolError::Disposed`], and leaves the pool empty. Calling it again
    /// has no effect.
    pub fn dispose(&self) {
        self.shared.dispose();

        if let Some(controller) = self.controller.lock().take() {
            let _ = self.shared.events.send(WorkerEvent::Shutdown);
            let _ = controller.join();
        }
    }

    /// Unique identifier of this pool
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Number of workers the pool was created with
    pub fn size(&self) -> usize {
        self.shared.config.size
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn status(&self) -> PoolStatus {
        self.shared.state.lock().status
    }

    /// Number of idle workers
    pub fn free_worker_count(&self) -> usize {
        self.shared.state.lock().free.len()
    }

    /// Number of workers executing a call
    pub fn running_worker_count(&self) -> usize {
        self.shared.state.lock().running()
    }

    /// Number of calls waiting for a worker
    pub fn waiting_event_count(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Consistent snapshot of every gauge and counter
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            pool_id: self.shared.id,
            size: self.shared.config.size,
            free: state.free.len(),
            running: state.running(),
            waiting: state.pending.len(),
            completed: state.completed,
            failed: state.failed,
            status: state.status,
        }
    }
}

impl<A, R> Drop for Pool<A, R> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<A, R> fmt::Debug for Pool<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.shared.id)
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl PoolState {
    fn running(&self) -> usize {
        self.workers.len() - self.free.len()
    }

    fn start(
        &mut self,
        worker: WorkerId,
        call: PendingCall,
        events: &mpsc::UnboundedSender<WorkerEvent>,
    ) {
        debug!(call_id = call.call_id(), worker, "Assigning call");
        self.workers[worker].send(call, events);
    }
}

impl Shared {
    /// Start `call` on a free worker or queue it
    ///
    /// Hands the call back if the pool is disposed.
    fn assign(&self, call: PendingCall) -> Result<(), PendingCall> {
        let mut state = self.state.lock();
        if state.status == PoolStatus::Disposed {
            return Err(call);
        }

        match state.free.pop() {
            Some(worker) => state.start(worker, call, &self.events),
            None => {
                debug!(
                    pool_id = %self.id,
                    call_id = call.call_id(),
                    waiting = state.pending.len() + 1,
                    "All workers busy, queueing call"
                );
                state.pending.push_back(call);
            }
        }
        Ok(())
    }

    /// Apply a worker's completion notification
    ///
    /// The caller is settled before the lock is released, so a concurrent
    /// [`dispose`](Self::dispose) either sees the call already settled or
    /// rejects it itself.
    fn on_worker_settled(&self, worker: WorkerId, outcome: Result<Payload, ExecutionError>) {
        let retired = {
            let mut state = self.state.lock();
            if state.status == PoolStatus::Disposed {
                return;
            }
            let Some(settler) = state.workers.get_mut(worker).and_then(WorkerHandle::detach)
            else {
                return;
            };

            let mut retired = None;
            if let Err(ExecutionError::WorkerLost(_)) = &outcome {
                let bound = (state.factory)();
                match state.workers[worker].respawn(&self.config, bound, self.events.clone()) {
                    Ok(old) => retired = old,
                    Err(err) => {
                        error!(pool_id = %self.id, worker, "Failed to respawn worker: {}", err);
                    }
                }
            }

            match state.pending.pop_front() {
                Some(next) => state.start(worker, next, &self.events),
                None => state.free.push(worker),
            }

            match &outcome {
                Ok(_) => state.completed += 1,
                Err(_) => state.failed += 1,
            }
            settle(self.id, settler, outcome.map_err(PoolError::from));
            retired
        };

        if let Some(thread) = retired {
            let _ = thread.join();
        }
    }

    /// Tear down all workers and reject every outstanding call
    fn dispose(&self) {
        let (rejected, idle_threads) = {
            let mut state = self.state.lock();
            if state.status == PoolStatus::Disposed {
                return;
            }
            state.status = PoolStatus::Disposed;

            let mut idle_threads = Vec::new();
            for worker in std::mem::take(&mut state.free) {
                let (thread, _) = state.workers[worker].terminate();
                idle_threads.extend(thread);
            }

            let mut rejected: Vec<Settler> =
                state.pending.drain(..).map(|call| call.settler).collect();

            for worker in state.workers.iter_mut() {
                if worker.state() == WorkerState::Busy {
                    let (_, settler) = worker.terminate();
                    rejected.extend(settler);
                }
            }
            state.workers.clear();

            (rejected, idle_threads)
        };

        info!(pool_id = %self.id, rejected = rejected.len(), "Disposing worker pool");

        for settler in rejected {
            settle(self.id, settler, Err(PoolError::Disposed));
        }
        for thread in idle_threads {
            let _ = thread.join();
        }
    }
}

fn settle(pool_id: Uuid, settler: Settler, outcome: CallOutcome) {
    match &outcome {
        Ok(_) => debug!(%pool_id, call_id = settler.call_id(), "Call completed"),
        Err(PoolError::Disposed) => debug!(%pool_id, call_id = settler.call_id(), "Call rejected"),
        Err(err) => warn!(%pool_id, call_id = settler.call_id(), "Call failed: {}", err),
    }
    settler.settle(outcome);
}

/// Drain worker notifications until shutdown
#[instrument(skip_all, fields(pool_id = %shared.id))]
fn run_controller(shared: Arc<Shared>, mut events: mpsc::UnboundedReceiver<WorkerEvent>) {
    while let Some(event) = events.blocking_recv() {
        match event {
            WorkerEvent::Settled { worker, outcome } => shared.on_worker_settled(worker, outcome),
            WorkerEvent::Shutdown => break,
        }
    }
    debug!("Controller exited");
}

/// Wrap `f` so every worker gets its own clone behind the payload codec
fn bind_factory<A, R, F, E>(f: F) -> BoundFactory
where
    A: DeserializeOwned + 'static,
    R: Serialize + 'static,
    F: Fn(A) -> Result<R, E> + Clone + Send + 'static,
    E: fmt::Display + 'static,
{
    Box::new(move || -> BoundFn {
        let f = f.clone();
        Box::new(move |args: Payload| -> Result<Payload, ExecutionError> {
            let args: A = args.decode()?;
            let result = f(args).map_err(|e| ExecutionError::Failed(e.to_string()))?;
            Payload::encode(&result)
        })
    })
}

fn shutdown_workers(workers: &mut Vec<WorkerHandle>) {
    for mut worker in workers.drain(..) {
        if let (Some(thread), _) = worker.terminate() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::time::Duration;

    use futures::FutureExt;

    use super::*;

    fn sleeper(size: usize) -> Pool<u64, u64> {
        Pool::new(
            |ms: u64| {
                std::thread::sleep(Duration::from_millis(ms));
                Ok::<_, String>(ms)
            },
            size,
        )
        .unwrap()
    }

    #[test]
    fn test_new_pool_is_idle() {
        let pool = sleeper(3);
        assert_eq!(pool.size(), 3);
        assert_eq!(pool.status(), PoolStatus::Running);

        let stats = pool.stats();
        assert_eq!(stats.pool_id, pool.id());
        assert_eq!((stats.free, stats.running, stats.waiting), (3, 0, 0));
        assert_eq!((stats.completed, stats.failed), (0, 0));
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let err = Pool::<u64, u64>::new(|n: u64| Ok::<_, String>(n), 0).unwrap_err();
        assert!(matches!(
            err,
            PoolError::Config(crate::error::ConfigError::InvalidSize(0))
        ));
    }

    #[test]
    fn test_workers_handed_out_in_lifo_order() {
        let pool = sleeper(3);
        let _a = pool.dispatch(&300);
        let _b = pool.dispatch(&300);

        let state = pool.shared.state.lock();
        assert_eq!(state.free, vec![2]);
        assert_eq!(state.workers[0].state(), WorkerState::Busy);
        assert_eq!(state.workers[1].state(), WorkerState::Busy);
        assert_eq!(state.workers[2].state(), WorkerState::Idle);
    }

    #[test]
    fn test_queue_only_when_all_busy() {
        let pool = sleeper(2);
        let _handles: Vec<_> = (0..5).map(|_| pool.dispatch(&300)).collect();

        assert_eq!(pool.free_worker_count(), 0);
        assert_eq!(pool.running_worker_count(), 2);
        assert_eq!(pool.waiting_event_count(), 3);
    }

    #[test]
    fn test_late_notification_after_dispose_is_dropped() {
        let pool = sleeper(1);
        let _handle = pool.dispatch(&300);
        pool.shared.dispose();

        pool.shared.on_worker_settled(0, Payload::encode(&300u64));
        let stats = pool.stats();
        assert_eq!(stats.status, PoolStatus::Disposed);
        assert_eq!(stats.completed, 0);
        assert_eq!((stats.free, stats.running, stats.waiting), (0, 0, 0));
    }

    #[test]
    fn test_call_is_settled_when_dispose_returns() {
        for _ in 0..64 {
            let pool = sleeper(1);
            let handle = pool.dispatch(&20);
            let barrier = Barrier::new(2);

            thread::scope(|scope| {
                scope.spawn(|| {
                    barrier.wait();
                    pool.shared.on_worker_settled(0, Payload::encode(&20u64));
                });
                scope.spawn(|| {
                    barrier.wait();
                    pool.shared.dispose();
                    // Completion and disposal are ordered by the lock; either
                    // way the caller has its verdict by now
                    match handle.now_or_never() {
                        Some(Ok(value)) => assert_eq!(value, 20),
                        Some(Err(err)) => assert!(err.is_disposed()),
                        None => panic!("call still pending after dispose"),
                    }
                });
            });
        }
    }

    #[test]
    fn test_unknown_worker_notification_is_ignored() {
        let pool = sleeper(1);
        pool.shared.on_worker_settled(7, Err(ExecutionError::WorkerLost(7)));
        // Idle worker: nothing in flight to detach
        pool.shared.on_worker_settled(0, Err(ExecutionError::WorkerLost(0)));

        let stats = pool.stats();
        assert_eq!((stats.free, stats.running, stats.failed), (1, 0, 0));
    }

    #[test]
    fn test_stats_serialization() {
        let pool = sleeper(1);
        let json = serde_json::to_value(pool.stats()).unwrap();
        assert_eq!(json["size"], 1);
        assert_eq!(json["status"], "running");
    }
}
