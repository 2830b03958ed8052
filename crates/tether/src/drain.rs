//! Sequence drainer: a synchronous, forward-only view of an async stream.

use std::fmt;
use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use tether_rt::{Executor, RuntimeError};

use crate::error::Error;

type Slot<T, E> = Arc<Mutex<Option<BoxStream<'static, Result<T, E>>>>>;

/// Pulls one element at a time out of an asynchronous sequence.
///
/// A local drain drives its executor on the calling thread for each pull; a
/// remote one submits each pull to the main executor and blocks until it
/// completes. Once the stream ends or fails the drain is exhausted for good.
/// A pull the runtime refuses leaves the stream in place, so the next pull
/// reports the refusal again rather than a normal end.
pub struct Drain<T, E> {
    slot: Slot<T, E>,
    executor: Arc<Executor>,
    local: bool,
    exhausted: bool,
}

fn take<T, E>(slot: &Slot<T, E>) -> Option<BoxStream<'static, Result<T, E>>> {
    slot.lock().take()
}

impl<T, E> Drain<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub(crate) fn new(
        stream: BoxStream<'static, Result<T, E>>,
        executor: Arc<Executor>,
        local: bool,
    ) -> Self {
        Drain {
            slot: Arc::new(Mutex::new(Some(stream))),
            executor,
            local,
            exhausted: false,
        }
    }

    /// Request exactly one element. `Ok(None)` signals the end of the
    /// sequence; an error fails this pull and ends the drain.
    pub fn pull(&mut self) -> Result<Option<T>, Error<E>> {
        if self.exhausted {
            return Ok(None);
        }

        // The stream leaves the slot only once the step is actually polled.
        let slot = self.slot.clone();
        let step = async move {
            let mut stream = take(&slot)?;
            let item = stream.next().await;
            if let Some(Ok(_)) = &item {
                *slot.lock() = Some(stream);
            }
            Some(item)
        };
        let outcome = if self.local {
            self.executor.block_on(step)?
        } else {
            let task = self.executor.spawn(step)?;
            futures::executor::block_on(task.fallible()).ok_or(RuntimeError::Cancelled)?
        };

        match outcome {
            Some(Some(Ok(value))) => Ok(Some(value)),
            Some(Some(Err(err))) => {
                self.exhausted = true;
                Err(Error::Operation(err))
            }
            Some(None) | None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    /// Whether a further pull could still yield an element.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Whether pulls drive the executor on the calling thread.
    pub fn is_local(&self) -> bool {
        self.local
    }
}

impl<T, E> Iterator for Drain<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Item = Result<T, Error<E>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.pull().transpose()
    }
}

impl<T, E> fmt::Debug for Drain<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Drain")
            .field("executor", &self.executor.id())
            .field("local", &self.local)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::time::Duration;
    use tether_rt::{ExecutorConfig, LoopThread};

    #[derive(Debug, PartialEq)]
    struct Boom(u32);

    fn numbers() -> BoxStream<'static, Result<u32, Boom>> {
        stream::iter([1, 2, 3]).map(Ok).boxed()
    }

    #[test]
    fn local_drain_yields_in_order_then_ends() {
        let executor = Executor::new().unwrap();
        let mut drain = Drain::new(numbers(), executor, true);

        assert_eq!(drain.pull().unwrap(), Some(1));
        assert_eq!(drain.pull().unwrap(), Some(2));
        assert_eq!(drain.pull().unwrap(), Some(3));
        assert_eq!(drain.pull().unwrap(), None);
        assert!(drain.is_exhausted());
        assert_eq!(drain.pull().unwrap(), None);
    }

    #[test]
    fn remote_drain_pulls_through_main_executor() {
        let main = LoopThread::spawn(ExecutorConfig::default()).unwrap();
        let slow = stream::iter([1u32, 2, 3])
            .then(|n| async move {
                tether_rt::sleep(Duration::from_millis(2)).await;
                Ok::<_, Boom>(n)
            })
            .boxed();
        let drain = Drain::new(slow, main.executor().clone(), false);

        let values: Vec<u32> = drain.map(Result::unwrap).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn error_ends_the_drain_without_touching_earlier_items() {
        let executor = Executor::new().unwrap();
        let failing = stream::iter([Ok(1), Err(Boom(7)), Ok(3)]).boxed();
        let mut drain = Drain::new(failing, executor, true);

        assert_eq!(drain.pull().unwrap(), Some(1));
        let err = drain.pull().unwrap_err();
        assert_eq!(err.into_operation(), Some(Boom(7)));
        assert!(drain.is_exhausted());
        assert!(drain.next().is_none());
    }

    #[test]
    fn remote_drain_on_closed_executor_keeps_reporting_closed() {
        let main = LoopThread::spawn(ExecutorConfig::default()).unwrap();
        let executor = main.executor().clone();
        main.shutdown().unwrap();

        let mut drain = Drain::new(numbers(), executor, false);
        for _ in 0..2 {
            assert!(matches!(
                drain.pull(),
                Err(Error::Runtime(RuntimeError::Closed))
            ));
            assert!(!drain.is_exhausted());
        }
    }

    #[test]
    fn remote_drain_error_mid_sequence_ends_it() {
        let main = LoopThread::spawn(ExecutorConfig::default()).unwrap();
        let failing = stream::iter([Ok(1), Err(Boom(7)), Ok(3)]).boxed();
        let mut drain = Drain::new(failing, main.executor().clone(), false);

        assert_eq!(drain.pull().unwrap(), Some(1));
        let err = drain.pull().unwrap_err();
        assert_eq!(err.into_operation(), Some(Boom(7)));
        assert!(drain.is_exhausted());
        assert_eq!(drain.pull().unwrap(), None);
        main.shutdown().unwrap();
    }

    #[test]
    fn local_drain_inside_its_running_executor_refuses() {
        let executor = Executor::new().unwrap();
        let inner = executor.clone();
        let (refused, drain) = executor
            .block_on(async move {
                let mut drain = Drain::new(numbers(), inner, true);
                let refused = matches!(drain.pull(), Err(Error::Runtime(RuntimeError::AlreadyRunning)));
                (refused, drain)
            })
            .unwrap();
        assert!(refused);

        // The refused pull kept the stream.
        let values: Vec<u32> = drain.map(Result::unwrap).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }
}
