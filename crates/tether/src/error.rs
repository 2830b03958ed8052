use tether_rt::RuntimeError;

/// Failure of a bridged call.
///
/// `Operation` carries the wrapped operation's own error untouched; every
/// other variant originates in the bridge or the runtime.
#[derive(Debug, thiserror::Error)]
pub enum Error<E> {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("a sequence cannot be drained from inside its own running executor")]
    SequenceInRunningExecutor,
    #[error("facade is bridged to an executor that is no longer the designated main")]
    MainChanged,
    #[error("{0}")]
    Operation(E),
}

impl<E> Error<E> {
    /// The wrapped operation's error, if that is what failed.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Error::Operation(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_operation(&self) -> bool {
        matches!(self, Error::Operation(_))
    }
}
