use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::ExecutorConfig;
use crate::error::RuntimeError;
use crate::executor::Executor;
use crate::registry;

/// An executor running `run_forever` on a dedicated thread.
///
/// Suited to being the long-lived main executor of a process whose own main
/// thread stays synchronous. Dropping the handle shuts the loop down.
pub struct LoopThread {
    executor: Arc<Executor>,
    join: Option<JoinHandle<Result<(), RuntimeError>>>,
}

impl LoopThread {
    /// Spawn the thread and return once its loop is running.
    pub fn spawn(config: ExecutorConfig) -> Result<Self, RuntimeError> {
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| "tether-loop".to_string());
        let executor = Executor::with_config(config)?;

        // Queued before the loop starts; completes only once it runs.
        let ready = executor.spawn(async {})?;

        let driver = executor.clone();
        let join = thread::Builder::new().name(name).spawn(move || {
            registry::bind_current(driver.clone());
            let result = driver.run_forever();
            if let Err(err) = &result {
                tracing::warn!(executor = %driver.id(), error = %err, "loop thread failed");
            }
            result
        })?;

        let started = futures::executor::block_on(ready.fallible());
        let handle = LoopThread {
            executor,
            join: Some(join),
        };
        started.ok_or(RuntimeError::Cancelled)?;
        Ok(handle)
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    /// Stop and close the executor, then join its thread.
    pub fn shutdown(mut self) -> Result<(), RuntimeError> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> Result<(), RuntimeError> {
        let Some(join) = self.join.take() else {
            return Ok(());
        };
        self.executor.stop();
        self.executor.close();
        match join.join() {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(executor = %self.executor.id(), "loop thread panicked");
                Err(RuntimeError::Cancelled)
            }
        }
    }
}

impl Drop for LoopThread {
    fn drop(&mut self) {
        let _ = self.shutdown_inner();
    }
}
