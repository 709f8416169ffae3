//! Worker handles and the worker thread loop
//!
//! Each worker is a dedicated OS thread that owns its own copy of the bound
//! function. The controller talks to it only through channels: serialized
//! arguments go in, one [`WorkerEvent`] per call comes back out.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::call::{PendingCall, Settler};
use crate::codec::Payload;
use crate::config::PoolConfig;
use crate::error::ExecutionError;

/// Index of a worker within its pool
pub type WorkerId = usize;

/// Bound function as seen from inside a worker thread
pub(crate) type BoundFn = Box<dyn FnMut(Payload) -> Result<Payload, ExecutionError> + Send>;

/// Worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Waiting for a call
    Idle,
    /// Executing exactly one call
    Busy,
    /// Shut down by pool disposal
    Terminated,
}

/// Notifications received by the controller
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    /// A worker finished its in-flight call
    Settled {
        worker: WorkerId,
        outcome: Result<Payload, ExecutionError>,
    },
    /// Stop the controller loop
    Shutdown,
}

/// Controller-side handle for one worker thread
#[derive(Debug)]
pub(crate) struct WorkerHandle {
    id: WorkerId,
    state: WorkerState,
    commands: Option<mpsc::UnboundedSender<Payload>>,
    thread: Option<JoinHandle<()>>,
    in_flight: Option<Settler>,
}

impl WorkerHandle {
    /// Spawn a worker thread running `bound`
    pub(crate) fn spawn(
        id: WorkerId,
        config: &PoolConfig,
        bound: BoundFn,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> io::Result<Self> {
        let mut handle = Self {
            id,
            state: WorkerState::Idle,
            commands: None,
            thread: None,
            in_flight: None,
        };
        handle.start_thread(config, bound, events)?;
        Ok(handle)
    }

    fn start_thread(
        &mut self,
        config: &PoolConfig,
        bound: BoundFn,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> io::Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.id;

        let mut builder =
            thread::Builder::new().name(format!("{}-{}", config.thread_name_prefix, id));
        if let Some(bytes) = config.stack_size {
            builder = builder.stack_size(bytes);
        }
        let thread = builder.spawn(move || run_worker(id, bound, rx, events))?;

        self.commands = Some(tx);
        self.thread = Some(thread);
        Ok(())
    }

    /// Replace a lost worker thread in place
    ///
    /// Returns the old thread's join handle; the caller decides when to join
    /// it.
    pub(crate) fn respawn(
        &mut self,
        config: &PoolConfig,
        bound: BoundFn,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> io::Result<Option<JoinHandle<()>>> {
        self.commands = None;
        let retired = self.thread.take();
        self.start_thread(config, bound, events)?;
        Ok(retired)
    }

    pub(crate) fn state(&self) -> WorkerState {
        self.state
    }

    /// Forward a call to the worker thread
    ///
    /// The worker must be idle. On success the call's settler stays attached
    /// until [`detach`](Self::detach). If the thread is gone, the failure is
    /// reported through `events` like any other outcome.
    pub(crate) fn send(&mut self, call: PendingCall, events: &mpsc::UnboundedSender<WorkerEvent>) {
        debug_assert_eq!(self.state, WorkerState::Idle, "worker {} is not idle", self.id);

        let PendingCall { args, settler } = call;
        self.state = WorkerState::Busy;
        self.in_flight = Some(settler);

        let delivered = self
            .commands
            .as_ref()
            .map(|tx| tx.send(args).is_ok())
            .unwrap_or(false);

        if !delivered {
            error!(worker = self.id, "Worker thread is not accepting calls");
            let _ = events.send(WorkerEvent::Settled {
                worker: self.id,
                outcome: Err(ExecutionError::WorkerLost(self.id)),
            });
        }
    }

    /// Detach the in-flight call, returning the worker to idle
    pub(crate) fn detach(&mut self) -> Option<Settler> {
        if self.state != WorkerState::Busy {
            return None;
        }
        self.state = WorkerState::Idle;
        self.in_flight.take()
    }

    /// Terminate the worker
    ///
    /// Closing the command channel stops an idle thread right away; its join
    /// handle is returned so the caller can wait for it. A busy thread is
    /// detached and its eventual result discarded; its in-flight settler is
    /// returned instead.
    pub(crate) fn terminate(&mut self) -> (Option<JoinHandle<()>>, Option<Settler>) {
        let was_busy = self.state == WorkerState::Busy;
        self.state = WorkerState::Terminated;
        self.commands = None;

        let settler = self.in_flight.take();
        let thread = self.thread.take();
        if was_busy {
            (None, settler)
        } else {
            (thread, settler)
        }
    }
}

fn run_worker(
    id: WorkerId,
    mut bound: BoundFn,
    mut commands: mpsc::UnboundedReceiver<Payload>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    debug!(worker = id, "Worker started");

    while let Some(args) = commands.blocking_recv() {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| bound(args))) {
            Ok(outcome) => outcome,
            Err(cause) => Err(ExecutionError::Panicked(panic_message(cause.as_ref()))),
        };

        if events
            .send(WorkerEvent::Settled {
                worker: id,
                outcome,
            })
            .is_err()
        {
            break;
        }
    }

    debug!(worker = id, "Worker exited");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
