//! Loop registry: which executor belongs to this thread, which one is main.
//!
//! Each thread has a lazily created *current* executor, stored in a
//! thread-local slot. The *main* executor is the only executor other threads
//! submit work to. Every bridged facade holds the designation; it is released
//! once the last hold is dropped, so a second main can never be designated
//! while work is still routed to the first.

use std::cell::RefCell;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::RuntimeError;
use crate::executor::Executor;

struct Designation {
    executor: Arc<Executor>,
    holds: usize,
}

static MAIN: RwLock<Option<Designation>> = parking_lot::const_rwlock(None);

thread_local! {
    static CURRENT: RefCell<Option<Arc<Executor>>> = const { RefCell::new(None) };
    /// Executors being driven on this thread, innermost last.
    static RUNNING: RefCell<Vec<Arc<Executor>>> = const { RefCell::new(Vec::new()) };
}

/// The calling thread's executor: the innermost one this thread is driving,
/// otherwise the thread's own slot, created and bound on first use.
pub fn current() -> Result<Arc<Executor>, RuntimeError> {
    if let Some(executor) = running() {
        return Ok(executor);
    }
    CURRENT.with(|slot| {
        let mut slot = slot.borrow_mut();
        if let Some(executor) = slot.as_ref() {
            return Ok(executor.clone());
        }
        let executor = Executor::new()?;
        *slot = Some(executor.clone());
        Ok(executor)
    })
}

/// Make `executor` the calling thread's current executor, returning the one
/// it replaces.
pub fn bind_current(executor: Arc<Executor>) -> Option<Arc<Executor>> {
    executor.bind_to_current_thread();
    CURRENT.with(|slot| slot.borrow_mut().replace(executor))
}

/// The innermost executor being driven on this thread, if any.
pub fn running() -> Option<Arc<Executor>> {
    RUNNING.with(|stack| stack.borrow().last().cloned())
}

/// The designated main executor.
pub fn main() -> Result<Arc<Executor>, RuntimeError> {
    MAIN.read()
        .as_ref()
        .map(|designation| designation.executor.clone())
        .ok_or(RuntimeError::NotDesignated)
}

/// Designate the main executor. Designating the same executor again is a
/// no-op; a different one is refused until the current designation is
/// released.
pub fn designate_main(executor: Arc<Executor>) -> Result<(), RuntimeError> {
    let mut main = MAIN.write();
    match main.as_ref() {
        Some(existing) if Arc::ptr_eq(&existing.executor, &executor) => Ok(()),
        Some(_) => Err(RuntimeError::AlreadyDesignated),
        None => {
            tracing::debug!(executor = %executor.id(), name = ?executor.name(), "main executor designated");
            *main = Some(Designation { executor, holds: 0 });
            Ok(())
        }
    }
}

/// Take a hold on `executor` as main, designating it if nothing is.
pub fn hold_main(executor: &Arc<Executor>) -> Result<(), RuntimeError> {
    let mut main = MAIN.write();
    match main.as_mut() {
        Some(existing) if Arc::ptr_eq(&existing.executor, executor) => {
            existing.holds += 1;
            Ok(())
        }
        Some(_) => Err(RuntimeError::AlreadyDesignated),
        None => {
            tracing::debug!(executor = %executor.id(), name = ?executor.name(), "main executor designated");
            *main = Some(Designation {
                executor: executor.clone(),
                holds: 1,
            });
            Ok(())
        }
    }
}

/// Drop one hold on `executor`. Releases the designation when it was the
/// last one and returns the released executor. Holds on an executor that is
/// no longer main are ignored.
pub fn drop_main_hold(executor: &Arc<Executor>) -> Option<Arc<Executor>> {
    let mut main = MAIN.write();
    let existing = main.as_mut()?;
    if !Arc::ptr_eq(&existing.executor, executor) {
        return None;
    }
    existing.holds = existing.holds.saturating_sub(1);
    if existing.holds > 0 {
        return None;
    }
    let released = main.take().map(|designation| designation.executor);
    tracing::debug!(executor = %executor.id(), "main executor released with its last hold");
    released
}

/// Number of holds on the current designation.
pub fn main_holds() -> usize {
    MAIN.read().as_ref().map_or(0, |designation| designation.holds)
}

/// Release the designation only if nothing holds it.
pub fn release_unheld_main() -> Option<Arc<Executor>> {
    let mut main = MAIN.write();
    if main.as_ref().is_some_and(|designation| designation.holds == 0) {
        let released = main.take().map(|designation| designation.executor);
        if let Some(executor) = &released {
            tracing::debug!(executor = %executor.id(), "main executor released");
        }
        return released;
    }
    None
}

/// Clear the main designation regardless of holds. Facades still bridged to
/// the released executor refuse further calls.
pub fn release_main() -> Option<Arc<Executor>> {
    let released = MAIN.write().take().map(|designation| designation.executor);
    if let Some(executor) = &released {
        tracing::debug!(executor = %executor.id(), "main executor released");
    }
    released
}

pub(crate) fn enter(executor: Arc<Executor>) {
    RUNNING.with(|stack| stack.borrow_mut().push(executor));
}

pub(crate) fn leave(executor: &Arc<Executor>) {
    RUNNING.with(|stack| {
        let mut stack = stack.borrow_mut();
        if let Some(pos) = stack.iter().rposition(|e| Arc::ptr_eq(e, executor)) {
            stack.remove(pos);
        }
    });
}
