//! Pending calls and the futures handed back to callers

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::de::DeserializeOwned;
use tokio::sync::oneshot;

use crate::codec::Payload;
use crate::error::PoolError;

/// Outcome delivered to a caller before decoding
pub(crate) type CallOutcome = Result<Payload, PoolError>;

/// Settles exactly one caller's future
#[derive(Debug)]
pub(crate) struct Settler {
    call_id: u64,
    tx: oneshot::Sender<CallOutcome>,
}

impl Settler {
    pub(crate) fn call_id(&self) -> u64 {
        self.call_id
    }

    /// Deliver the outcome; a caller that dropped its handle is ignored.
    pub(crate) fn settle(self, outcome: CallOutcome) {
        let _ = self.tx.send(outcome);
    }
}

/// A dispatch request waiting for a worker
#[derive(Debug)]
pub(crate) struct PendingCall {
    pub(crate) args: Payload,
    pub(crate) settler: Settler,
}

impl PendingCall {
    /// Create a pending call and the handle its caller awaits
    pub(crate) fn new<R>(call_id: u64, args: Payload) -> (Self, CallHandle<R>) {
        let (tx, rx) = oneshot::channel();
        let call = Self {
            args,
            settler: Settler { call_id, tx },
        };
        (call, CallHandle::new(call_id, rx))
    }

    pub(crate) fn call_id(&self) -> u64 {
        self.settler.call_id
    }
}

/// Future returned by [`Pool::dispatch`](crate::Pool::dispatch)
///
/// Resolves with the function's return value, or with the error that rejected
/// the call. Dropping the handle does not cancel the call.
#[must_use = "a call handle does nothing unless awaited"]
#[derive(Debug)]
pub struct CallHandle<R> {
    call_id: u64,
    rx: oneshot::Receiver<CallOutcome>,
    _result: PhantomData<fn() -> R>,
}

impl<R> CallHandle<R> {
    fn new(call_id: u64, rx: oneshot::Receiver<CallOutcome>) -> Self {
        Self {
            call_id,
            rx,
            _result: PhantomData,
        }
    }

    /// A handle that is already rejected with `err`
    pub(crate) fn rejected(call_id: u64, err: PoolError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self::new(call_id, rx)
    }

    /// Identifier of the call, unique within its pool
    pub fn call_id(&self) -> u64 {
        self.call_id
    }
}

impl<R: DeserializeOwned> Future for CallHandle<R> {
    type Output = Result<R, PoolError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(Ok(payload))) => Poll::Ready(payload.decode().map_err(PoolError::from)),
            Poll::Ready(Ok(Err(err))) => Poll::Ready(Err(err)),
            // Settler dropped without a verdict: only happens when the pool is torn down
            Poll::Ready(Err(_)) => Poll::Ready(Err(PoolError::Disposed)),
            Poll::Pending => Poll::Pending,
        }
    }
}
