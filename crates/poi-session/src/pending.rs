//! Single-resolution results.
//!
//! Every asynchronous session operation hands the caller a [`Pending`]
//! future and keeps the matching [`Responder`]. `Responder::resolve`
//! consumes the responder, so an operation can complete or fail, never both
//! and never twice.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use poi_core::{PoiError, Result};
use tokio::sync::oneshot;

/// Create a connected responder/pending pair.
pub(crate) fn pending<T>() -> (Responder<T>, Pending<T>) {
    let (tx, rx) = oneshot::channel();
    (Responder { tx }, Pending { rx })
}

/// Result of an operation still in progress.
///
/// Resolves to `Err(Unknown)` if the session shuts down before the
/// operation completes.
///
/// # Examples
///
/// ```
/// use poi_session::Pending;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pending = Pending::ready(Ok(7));
/// assert_eq!(pending.await.unwrap(), 7);
/// # }
/// ```
#[derive(Debug)]
#[must_use = "a pending result does nothing unless awaited"]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Pending<T> {
    /// An already resolved result.
    pub fn ready(result: Result<T>) -> Self {
        let (responder, pending) = pending();
        responder.resolve(result);
        pending
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| Err(PoiError::unknown("session closed")))
        })
    }
}

/// Resolving side of a [`Pending`].
#[derive(Debug)]
pub(crate) struct Responder<T> {
    tx: oneshot::Sender<Result<T>>,
}

impl<T> Responder<T> {
    /// Deliver the outcome. A caller that dropped its `Pending` is ignored.
    pub(crate) fn resolve(self, result: Result<T>) {
        let _ = self.tx.send(result);
    }

    pub(crate) fn fail(self, error: PoiError) {
        self.resolve(Err(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poi_core::ErrorCode;

    #[tokio::test]
    async fn test_resolves_once_with_value() {
        let (responder, pending) = pending::<u32>();
        responder.resolve(Ok(42));
        assert_eq!(pending.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_resolves_with_error() {
        let (responder, pending) = pending::<u32>();
        responder.fail(PoiError::timeout());
        assert_eq!(pending.await.unwrap_err().code(), ErrorCode::Timeout);
    }

    #[tokio::test]
    async fn test_dropped_responder_is_unknown() {
        let (responder, pending) = pending::<u32>();
        drop(responder);
        let error = pending.await.unwrap_err();
        assert_eq!(error.code(), ErrorCode::Unknown);
        assert_eq!(error.description(), "session closed");
    }

    #[test]
    fn test_resolving_after_caller_left_is_harmless() {
        let (responder, pending) = pending::<u32>();
        drop(pending);
        responder.resolve(Ok(1));
    }
}
