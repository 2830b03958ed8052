//! Facades: reversible synchronous stand-ins for async operations.
//!
//! An entity builds one [`Facade`] per operation it wants to expose and lists
//! them through [`CapabilitySet`]. Installing switches every facade to the
//! bridged mode; removing switches it back. The original factory is captured
//! once at construction and never replaced, so removal always restores it
//! exactly.
//!
//! A bridged facade holds the main designation (see
//! [`registry::hold_main`]). Calls resolve the target through the registry
//! and refuse to run if the designation moved to another executor.

use std::fmt;
use std::sync::Arc;

use tether_rt::{registry, Executor, RuntimeError};

use crate::bridge::{bridge, Bridged};
use crate::error::Error;
use crate::operation::Operation;

/// The original operation factory a facade stands in for.
pub type Original<A, T, E> = Arc<dyn Fn(A) -> Operation<T, E> + Send + Sync>;

enum Mode {
    Raw,
    Bridged(Arc<Executor>),
}

pub struct Facade<A, T, E> {
    name: &'static str,
    original: Original<A, T, E>,
    mode: Mode,
}

impl<A, T, E> Facade<A, T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// A facade in raw mode: calls return the operation untouched.
    pub fn new<F>(name: &'static str, factory: F) -> Self
    where
        F: Fn(A) -> Operation<T, E> + Send + Sync + 'static,
    {
        Self::from_original(name, Arc::new(factory))
    }

    pub fn from_original(name: &'static str, original: Original<A, T, E>) -> Self {
        Facade {
            name,
            original,
            mode: Mode::Raw,
        }
    }

    /// Call through the facade.
    ///
    /// Raw mode yields [`Bridged::Raw`]; bridged mode runs the operation
    /// against the designated main executor, which must still be the one
    /// captured at install time.
    pub fn call(&self, args: A) -> Result<Bridged<T, E>, Error<E>> {
        match &self.mode {
            Mode::Raw => Ok(Bridged::Raw((self.original)(args))),
            Mode::Bridged(captured) => {
                let main = registry::main()?;
                if !Arc::ptr_eq(&main, captured) {
                    return Err(Error::MainChanged);
                }
                bridge(&main, (self.original)(args))
            }
        }
    }

    /// Invoke the original factory, bypassing the bridge.
    pub fn invoke(&self, args: A) -> Operation<T, E> {
        (self.original)(args)
    }

    pub fn original(&self) -> &Original<A, T, E> {
        &self.original
    }
}

impl<A, T, E> fmt::Debug for Facade<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let main = match &self.mode {
            Mode::Raw => None,
            Mode::Bridged(main) => Some(main.id()),
        };
        f.debug_struct("Facade")
            .field("name", &self.name)
            .field("main", &main)
            .finish()
    }
}

/// Object-safe view of one facade, for installing and removing without
/// knowing its signature.
pub trait Capability {
    fn name(&self) -> &str;

    /// Switch to bridged mode, taking a hold on `main`. Returns `false` if it
    /// already was; the existing wrapping is kept and never nested. Fails if
    /// another executor is designated main.
    fn install(&mut self, main: &Arc<Executor>) -> Result<bool, RuntimeError>;

    /// Switch back to raw mode, dropping the hold. Returns `false` if it
    /// already was.
    fn remove(&mut self) -> bool;

    fn is_bridged(&self) -> bool;
}

impl<A, T, E> Capability for Facade<A, T, E> {
    fn name(&self) -> &str {
        self.name
    }

    fn install(&mut self, main: &Arc<Executor>) -> Result<bool, RuntimeError> {
        if let Mode::Bridged(existing) = &self.mode {
            tracing::debug!(
                facade = self.name,
                main = %existing.id(),
                "already bridged, keeping existing wrapping"
            );
            return Ok(false);
        }
        registry::hold_main(main)?;
        self.mode = Mode::Bridged(main.clone());
        Ok(true)
    }

    fn remove(&mut self) -> bool {
        match std::mem::replace(&mut self.mode, Mode::Raw) {
            Mode::Raw => false,
            Mode::Bridged(main) => {
                registry::drop_main_hold(&main);
                true
            }
        }
    }

    fn is_bridged(&self) -> bool {
        matches!(self.mode, Mode::Bridged(_))
    }
}

impl<A, T, E> Drop for Facade<A, T, E> {
    fn drop(&mut self) {
        if let Mode::Bridged(main) = &self.mode {
            registry::drop_main_hold(main);
        }
    }
}

/// An entity exposing a fixed list of bridgeable operations.
pub trait CapabilitySet {
    fn capabilities(&mut self) -> Vec<&mut dyn Capability>;
}

/// Bridge every facade in `set` to `main`. Returns how many changed mode.
pub fn install(set: &mut dyn CapabilitySet, main: &Arc<Executor>) -> Result<usize, RuntimeError> {
    let mut installed = 0;
    for capability in set.capabilities() {
        if capability.install(main)? {
            installed += 1;
        }
    }
    tracing::debug!(installed, main = %main.id(), "facades installed");
    Ok(installed)
}

/// Restore every facade in `set` to raw mode. Returns how many changed mode.
pub fn remove(set: &mut dyn CapabilitySet) -> usize {
    let removed = set
        .capabilities()
        .into_iter()
        .map(|capability| capability.remove())
        .filter(|changed| *changed)
        .count();
    tracing::debug!(removed, "facades removed");
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_guard;
    use futures::stream::{self, StreamExt};

    struct Store {
        fetch: Facade<u32, u32, String>,
        scan: Facade<u32, u32, String>,
    }

    impl Store {
        fn new() -> Self {
            Store {
                fetch: Facade::new("fetch", |key: u32| {
                    Operation::awaitable(async move { Ok(key * 10) })
                }),
                scan: Facade::new("scan", |upto: u32| {
                    Operation::sequence(stream::iter(1..=upto).map(Ok))
                }),
            }
        }
    }

    impl CapabilitySet for Store {
        fn capabilities(&mut self) -> Vec<&mut dyn Capability> {
            vec![&mut self.fetch, &mut self.scan]
        }
    }

    #[test]
    fn raw_facade_returns_operation() {
        let store = Store::new();
        let operation = store.fetch.call(4).unwrap().into_raw().unwrap();
        let value = futures::executor::block_on(operation.into_awaitable().unwrap());
        assert_eq!(value, Ok(40));
    }

    #[test]
    fn installed_facade_returns_values_and_drains() {
        let _g = test_guard();
        let main = registry::current().unwrap();
        let mut store = Store::new();
        assert_eq!(install(&mut store, &main).unwrap(), 2);

        assert_eq!(store.fetch.call(4).unwrap().into_value(), Some(40));
        let scanned: Vec<u32> = store
            .scan
            .call(3)
            .unwrap()
            .into_drain()
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(scanned, vec![1, 2, 3]);
    }

    #[test]
    fn remove_restores_the_identical_original() {
        let _g = test_guard();
        let main = registry::current().unwrap();
        let mut store = Store::new();
        let original = store.fetch.original().clone();

        install(&mut store, &main).unwrap();
        assert_eq!(remove(&mut store), 2);

        assert!(Arc::ptr_eq(store.fetch.original(), &original));
        assert!(!store.fetch.is_bridged());
        assert!(matches!(store.fetch.call(1), Ok(Bridged::Raw(_))));
        assert!(matches!(store.scan.call(1), Ok(Bridged::Raw(_))));
    }

    #[test]
    fn double_install_does_not_nest() {
        let _g = test_guard();
        let main = registry::current().unwrap();
        let mut store = Store::new();
        assert_eq!(install(&mut store, &main).unwrap(), 2);
        assert_eq!(install(&mut store, &main).unwrap(), 0);

        // One removal is enough to get back to raw.
        assert_eq!(remove(&mut store), 2);
        assert!(matches!(store.fetch.call(2), Ok(Bridged::Raw(_))));

        // And the facade still bridges once reinstalled.
        install(&mut store, &main).unwrap();
        assert_eq!(store.fetch.call(2).unwrap().into_value(), Some(20));
    }

    #[test]
    fn removing_unbridged_set_is_noop() {
        let mut store = Store::new();
        assert_eq!(remove(&mut store), 0);
        assert!(matches!(store.fetch.call(1), Ok(Bridged::Raw(_))));
    }

    #[test]
    fn invoke_bypasses_the_bridge() {
        let _g = test_guard();
        let main = registry::current().unwrap();
        let mut store = Store::new();
        install(&mut store, &main).unwrap();
        let operation = store.fetch.invoke(5);
        assert_eq!(
            futures::executor::block_on(operation.into_awaitable().unwrap()),
            Ok(50)
        );
    }

    #[test]
    fn operation_error_passes_through_facade() {
        let _g = test_guard();
        let main = registry::current().unwrap();
        let mut failing: Facade<(), u32, String> = Facade::new("fail", |()| {
            Operation::awaitable(async { Err("no such key".to_string()) })
        });
        failing.install(&main).unwrap();
        let err = failing.call(()).unwrap_err();
        assert_eq!(err.into_operation().as_deref(), Some("no such key"));
    }

    #[test]
    fn bridged_facades_hold_main_until_removed_or_dropped() {
        let _g = test_guard();
        let main = registry::current().unwrap();
        let mut store = Store::new();
        install(&mut store, &main).unwrap();
        assert_eq!(registry::main_holds(), 2);

        store.fetch.remove();
        assert!(Arc::ptr_eq(&registry::main().unwrap(), &main));

        drop(store);
        assert!(matches!(registry::main(), Err(RuntimeError::NotDesignated)));
    }

    #[test]
    fn install_against_another_main_is_refused() {
        let _g = test_guard();
        let main = registry::current().unwrap();
        let mut first = Store::new();
        install(&mut first, &main).unwrap();

        let other = tether_rt::Executor::new().unwrap();
        let mut second = Store::new();
        assert!(matches!(
            install(&mut second, &other),
            Err(RuntimeError::AlreadyDesignated)
        ));
        assert!(!second.fetch.is_bridged());
    }

    #[test]
    fn facade_refuses_a_main_that_was_replaced() {
        let _g = test_guard();
        let main = registry::current().unwrap();
        let mut store = Store::new();
        install(&mut store, &main).unwrap();

        registry::release_main();
        assert!(matches!(
            store.fetch.call(1),
            Err(Error::Runtime(RuntimeError::NotDesignated))
        ));

        let other = tether_rt::Executor::new().unwrap();
        registry::designate_main(other).unwrap();
        assert!(matches!(store.fetch.call(1), Err(Error::MainChanged)));
        registry::release_main();
    }
}
