//! tether: call async operations from synchronous code, on any thread.
//!
//! An entity wraps each async operation it exposes in a [`Facade`] and lists
//! them through [`CapabilitySet`]. [`activate`] designates the main executor
//! and switches every facade to bridged mode; from then on a plain call
//!
//! - drives the caller's own executor when nothing else is running,
//! - blocks on the main executor when called from another thread while main
//!   is running,
//! - hands back an awaitable when the caller is itself inside a running
//!   executor, where blocking would deadlock.
//!
//! Sequence-shaped operations come back as a [`Drain`], a plain iterator.
//!
//! ```ignore
//! let mut client = Client::new();
//! tether::activate(&mut client)?;
//! let me = client.get_me.call(())?.into_value();
//! for message in client.history.call(chat)?.into_drain().into_iter().flatten() {
//!     println!("{:?}", message?);
//! }
//! tether::deactivate(&mut client);
//! ```

pub mod bridge;
mod drain;
mod error;
pub mod facade;
mod operation;

use std::sync::Arc;

pub use bridge::{bridge, Bridged, Forward, Strategy};
pub use drain::Drain;
pub use error::Error;
pub use facade::{Capability, CapabilitySet, Facade, Original};
pub use operation::{Operation, Shape};
pub use tether_rt::{self as rt, registry, Executor, ExecutorConfig, LoopThread, RuntimeError};

/// Designate the calling thread's executor as main and bridge every facade in
/// `set` to it.
pub fn activate(set: &mut dyn CapabilitySet) -> Result<Arc<Executor>, RuntimeError> {
    let main = registry::current()?;
    activate_with(set, main.clone())?;
    Ok(main)
}

/// Designate `main` as the main executor and bridge every facade in `set`
/// to it.
pub fn activate_with(set: &mut dyn CapabilitySet, main: Arc<Executor>) -> Result<(), RuntimeError> {
    registry::designate_main(main.clone())?;
    let installed = match facade::install(set, &main) {
        Ok(installed) => installed,
        Err(err) => {
            registry::release_unheld_main();
            return Err(err);
        }
    };
    tracing::info!(installed, main = %main.id(), "bridge activated");
    Ok(())
}

/// Restore every facade in `set` to raw mode. The main designation is
/// released once no bridged facade, in this set or any other, still holds
/// it.
pub fn deactivate(set: &mut dyn CapabilitySet) {
    let removed = facade::remove(set);
    let remaining = registry::main_holds();
    let released = registry::release_unheld_main();
    tracing::info!(
        removed,
        remaining,
        released = ?released.as_ref().map(|main| main.id()),
        "bridge deactivated"
    );
}

#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::{Mutex, MutexGuard};
    use tether_rt::registry;

    /// The main designation is process-wide; tests touching it take turns.
    static TEST_LOCK: Mutex<()> = parking_lot::const_mutex(());

    pub(crate) fn test_guard() -> MutexGuard<'static, ()> {
        let guard = TEST_LOCK.lock();
        registry::release_main();
        guard
    }
}
