use std::io;

/// Errors raised by the runtime itself, never by the work it drives.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("no main executor has been designated")]
    NotDesignated,
    #[error("a different main executor is already designated")]
    AlreadyDesignated,
    #[error("executor is already running on this thread")]
    AlreadyRunning,
    #[error("executor is closed")]
    Closed,
    #[error("task was dropped before it completed")]
    Cancelled,
    #[error("reactor error: {0}")]
    Io(#[from] io::Error),
}
