use std::future::Future;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, Stream, StreamExt};

/// One unit of asynchronous work, as produced by an operation factory.
pub enum Operation<T, E> {
    /// A single eventual result.
    Awaitable(BoxFuture<'static, Result<T, E>>),
    /// An ordered, lazily produced sequence. Ends when the stream ends; an
    /// error item ends it too.
    Sequence(BoxStream<'static, Result<T, E>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Awaitable,
    Sequence,
}

impl<T, E> Operation<T, E> {
    pub fn awaitable<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        Operation::Awaitable(future.boxed())
    }

    pub fn sequence<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
    {
        Operation::Sequence(stream.boxed())
    }

    pub fn shape(&self) -> Shape {
        match self {
            Operation::Awaitable(_) => Shape::Awaitable,
            Operation::Sequence(_) => Shape::Sequence,
        }
    }

    pub fn into_awaitable(self) -> Option<BoxFuture<'static, Result<T, E>>> {
        match self {
            Operation::Awaitable(future) => Some(future),
            Operation::Sequence(_) => None,
        }
    }

    pub fn into_sequence(self) -> Option<BoxStream<'static, Result<T, E>>> {
        match self {
            Operation::Sequence(stream) => Some(stream),
            Operation::Awaitable(_) => None,
        }
    }
}

impl<T, E> std::fmt::Debug for Operation<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Operation").field(&self.shape()).finish()
    }
}
