//! Bridge decision core.
//!
//! A synchronous caller can be in one of three situations relative to the
//! main executor:
//!
//! ```text
//!  caller thread                 main executor       what the bridge does
//!  ────────────────────────────  ──────────────────  ───────────────────────────
//!  owns main / main idle,        any                 drive own executor, or hand
//!    own executor idle or busy                       back the raw operation if
//!                                                    that executor is busy
//!  other thread, own idle        running elsewhere   submit to main and block
//!  other thread, own busy        running elsewhere   submit to main, return an
//!                                                    awaitable of the result
//! ```
//!
//! The strategy is picked once per call, before anything is polled.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use futures::FutureExt;
use tether_rt::{registry, Executor, FallibleTask, RuntimeError};

use crate::drain::Drain;
use crate::error::Error;
use crate::operation::Operation;

/// The calling thread's relationship to the main executor, sampled once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    pub is_main_thread: bool,
    pub main_running: bool,
    pub current_running: bool,
}

impl Context {
    /// Sample the context for a call made on this thread.
    ///
    /// The running flags are read without synchronization; see
    /// [`Executor::is_running`].
    pub fn sample(main: &Executor, current: &Executor) -> Self {
        Context {
            is_main_thread: main.is_owned_by_current_thread(),
            main_running: main.is_running(),
            current_running: current.is_running(),
        }
    }

    /// The calling context is not subordinate to a main executor running on
    /// another thread.
    pub fn is_authoritative(&self) -> bool {
        self.is_main_thread || !self.main_running
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The caller's own executor is busy driving it: hand the operation back
    /// to be awaited rather than deadlock.
    Defer,
    /// Drive the caller's own idle executor to completion.
    DriveCurrent,
    /// Submit to main; the caller awaits the cross-thread result.
    ForwardToMain,
    /// Submit to main and block the calling thread on the result.
    BlockOnMain,
}

impl Strategy {
    pub fn select(context: Context) -> Self {
        match (context.is_authoritative(), context.current_running) {
            (true, true) => Strategy::Defer,
            (true, false) => Strategy::DriveCurrent,
            (false, true) => Strategy::ForwardToMain,
            (false, false) => Strategy::BlockOnMain,
        }
    }
}

/// What a bridged call hands back.
pub enum Bridged<T, E> {
    /// The materialized result.
    Value(T),
    /// The operation itself, untouched. Returned when the caller runs inside
    /// a busy executor, and by facades that are not bridged.
    Raw(Operation<T, E>),
    /// An awaitable of a submission to the main executor.
    Forward(Forward<T, E>),
    /// A synchronous pull handle over a sequence.
    Drain(Drain<T, E>),
}

impl<T, E> Bridged<T, E> {
    pub fn into_value(self) -> Option<T> {
        match self {
            Bridged::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_raw(self) -> Option<Operation<T, E>> {
        match self {
            Bridged::Raw(operation) => Some(operation),
            _ => None,
        }
    }

    pub fn into_forward(self) -> Option<Forward<T, E>> {
        match self {
            Bridged::Forward(forward) => Some(forward),
            _ => None,
        }
    }

    pub fn into_drain(self) -> Option<Drain<T, E>> {
        match self {
            Bridged::Drain(drain) => Some(drain),
            _ => None,
        }
    }
}

impl<T, E> fmt::Debug for Bridged<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bridged::Value(_) => f.write_str("Value(..)"),
            Bridged::Raw(operation) => f.debug_tuple("Raw").field(operation).finish(),
            Bridged::Forward(_) => f.write_str("Forward(..)"),
            Bridged::Drain(drain) => f.debug_tuple("Drain").field(drain).finish(),
        }
    }
}

/// Resolves with the outcome of an operation submitted to the main executor.
///
/// Runtime-agnostic: it can be awaited from any executor.
pub struct Forward<T, E> {
    task: FallibleTask<Result<T, E>>,
}

impl<T, E> Future for Forward<T, E> {
    type Output = Result<T, Error<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        match self.task.poll_unpin(cx) {
            Poll::Ready(Some(Ok(value))) => Poll::Ready(Ok(value)),
            Poll::Ready(Some(Err(err))) => Poll::Ready(Err(Error::Operation(err))),
            Poll::Ready(None) => Poll::Ready(Err(Error::Runtime(RuntimeError::Cancelled))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Run `operation` in whatever way the calling thread's context allows.
///
/// The calling thread's executor comes from the registry, created on first
/// use; `main` is passed in by the caller.
pub fn bridge<T, E>(main: &Arc<Executor>, operation: Operation<T, E>) -> Result<Bridged<T, E>, Error<E>>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let shape = operation.shape();
    let current = registry::current()?;
    let context = Context::sample(main, &current);
    let strategy = Strategy::select(context);
    tracing::trace!(
        ?shape,
        ?strategy,
        main = %main.id(),
        current = %current.id(),
        "bridging operation"
    );

    match (strategy, operation) {
        (Strategy::Defer, operation @ Operation::Awaitable(_)) => Ok(Bridged::Raw(operation)),
        (Strategy::Defer, Operation::Sequence(_)) => Err(Error::SequenceInRunningExecutor),
        (Strategy::DriveCurrent, Operation::Awaitable(future)) => current
            .block_on(future)?
            .map(Bridged::Value)
            .map_err(Error::Operation),
        (Strategy::DriveCurrent, Operation::Sequence(stream)) => {
            Ok(Bridged::Drain(Drain::new(stream, current, true)))
        }
        (Strategy::ForwardToMain, Operation::Awaitable(future)) => {
            let task = main.spawn(future)?;
            Ok(Bridged::Forward(Forward {
                task: task.fallible(),
            }))
        }
        (Strategy::ForwardToMain, operation @ Operation::Sequence(_)) => Ok(Bridged::Raw(operation)),
        (Strategy::BlockOnMain, Operation::Awaitable(future)) => {
            let task = main.spawn(future)?;
            futures::executor::block_on(task.fallible())
                .ok_or(RuntimeError::Cancelled)?
                .map(Bridged::Value)
                .map_err(Error::Operation)
        }
        (Strategy::BlockOnMain, Operation::Sequence(stream)) => {
            Ok(Bridged::Drain(Drain::new(stream, main.clone(), false)))
        }
    }
}
