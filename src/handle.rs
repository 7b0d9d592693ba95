use std::future::Future;

use futures::future::{AbortHandle, abortable};
use tokio::task::JoinHandle;

use crate::core::{ClassifiedError, ErrorKind};

/// A handle for a request running on the runtime.
///
/// The request keeps running if the handle is dropped. [`cancel`](Self::cancel) rejects it
/// with [`ErrorKind::Cancelled`]; that error is never retried.
#[derive(Debug)]
pub struct RequestHandle<T> {
    join: JoinHandle<Result<T, ClassifiedError>>,
    abort: AbortHandle,
}

/// A cloneable way to cancel a [`RequestHandle`] from elsewhere, e.g. a navigation callback.
#[derive(Debug, Clone)]
pub struct Canceller(AbortHandle);

impl Canceller {
    pub fn cancel(&self) {
        self.0.abort();
    }
}

impl<T: Send + 'static> RequestHandle<T> {
    /// Spawns `work` onto the current tokio runtime.
    pub fn spawn<Fut>(work: Fut) -> Self
    where
        Fut: Future<Output = Result<T, ClassifiedError>> + Send + 'static,
    {
        let (work, abort) = abortable(work);
        let join = tokio::spawn(async move {
            work.await
                .unwrap_or_else(|_aborted| Err(ClassifiedError::cancelled()))
        });
        Self { join, abort }
    }

    /// Cancels the request. Already settled requests are unaffected.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    #[must_use]
    pub fn canceller(&self) -> Canceller {
        Canceller(self.abort.clone())
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the request to settle.
    pub async fn result(self) -> Result<T, ClassifiedError> {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Err(ClassifiedError::cancelled()),
            Err(e) => Err(
                ClassifiedError::new(ErrorKind::Unknown, format!("request task failed: {e}"))
                    .not_retryable(),
            ),
        }
    }
}
