//! tether-rt: per-thread cooperative executors.
//!
//! Every thread that needs one gets its own single-threaded [`Executor`],
//! created lazily through the [`registry`]. Any thread may submit work to any
//! executor: the ready queue is a `ConcurrentQueue` and the scheduler wakes
//! the owning thread's reactor through `Poller::notify`. One executor per
//! process may be designated as the *main* executor, the only target for
//! cross-thread submissions made by the bridge in `tether`.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use tether_rt::{registry, sleep};
//!
//! let executor = registry::current()?;
//! let value = executor.block_on(async {
//!     sleep(Duration::from_millis(10)).await;
//!     42
//! })?;
//! assert_eq!(value, 42);
//! ```

mod config;
mod error;
mod executor;
mod reactor;
pub mod registry;
mod thread;
mod timer;

pub use async_task::{FallibleTask, Task};
pub use config::ExecutorConfig;
pub use error::RuntimeError;
pub use executor::{Executor, ExecutorId};
pub use thread::LoopThread;
pub use timer::{sleep, Timer};
