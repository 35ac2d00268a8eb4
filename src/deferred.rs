//! Deferred results with pluggable promise libraries.
//!
//! A [`PromiseLibrary`] describes what the caller's promise flavour can do. The facade probes
//! [`PromiseLibrary::capabilities`] at call time: operations that need progress notification
//! fail fast with [`OathError::UnsupportedCapability`] instead of dropping notifications.
//!
//! [`defer`] creates a producer/consumer pair. The [`Deferred`] side settles the result and,
//! when the library supports it, pushes progress items through a one-slot channel, so the
//! producer never runs more than one item ahead of the consumer. The [`Promise`] side is a
//! `Future` of the final result.
//!
//! ```rust
//! use std::sync::Arc;
//! use sql_oath::prelude::*;
//!
//! # async fn demo() -> Result<(), OathError> {
//! let library: Arc<dyn PromiseLibrary> = Arc::new(ProgressPromises);
//! let (deferred, mut promise) = defer::<&str, u32>(&library);
//! tokio::spawn(async move {
//!     for i in 0..3 {
//!         deferred.notify(i).await?;
//!     }
//!     deferred.resolve("done");
//!     Ok::<_, OathError>(())
//! });
//! while let Some(step) = promise.progress().await {
//!     println!("step {step}");
//! }
//! assert_eq!(promise.await?, "done");
//! # Ok(()) }
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::OathError;

/// What a promise library can do beyond resolve/reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Incremental notifications before the result settles
    pub progress: bool,
}

/// A caller-supplied promise flavour.
pub trait PromiseLibrary: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Terminal handler for a rejection nobody consumed (see [`Promise::done`]).
    ///
    /// The default re-raises the error as a panic inside the detached task, where tokio reports
    /// it through the task's `JoinHandle`.
    fn on_unhandled(&self, err: OathError) {
        tracing::error!(target: "sql_oath", library = self.name(), "unhandled rejection: {err}");
        panic!("unhandled rejection: {err}");
    }
}

/// Promise library with progress notification. This is the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressPromises;

impl PromiseLibrary for ProgressPromises {
    fn name(&self) -> &str {
        "progress"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { progress: true }
    }
}

/// Promise library limited to resolve/reject.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicPromises;

impl PromiseLibrary for BasicPromises {
    fn name(&self) -> &str {
        "basic"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { progress: false }
    }
}

/// Create a pending result for `library`.
///
/// The progress channel only exists when the library reports the capability.
#[must_use]
pub fn defer<T, N>(library: &Arc<dyn PromiseLibrary>) -> (Deferred<T, N>, Promise<T, N>) {
    let (outcome_tx, outcome_rx) = oneshot::channel();
    let (progress_tx, progress_rx) = if library.capabilities().progress {
        let (tx, rx) = mpsc::channel(1);
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };
    (
        Deferred {
            outcome: outcome_tx,
            progress: progress_tx,
        },
        Promise {
            outcome: outcome_rx,
            progress: progress_rx,
            library: Arc::clone(library),
        },
    )
}

/// Producer side of a pending result.
pub struct Deferred<T, N = ()> {
    outcome: oneshot::Sender<Result<T, OathError>>,
    progress: Option<mpsc::Sender<N>>,
}

impl<T, N> Deferred<T, N> {
    pub fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    pub fn reject(self, err: OathError) {
        self.settle(Err(err));
    }

    /// Settle with either outcome. A promise that was already dropped is ignored.
    pub fn settle(self, outcome: Result<T, OathError>) {
        let _ = self.outcome.send(outcome);
    }

    #[must_use]
    pub fn can_notify(&self) -> bool {
        self.progress.is_some()
    }

    /// Push one progress item, waiting until the consumer has taken the previous one.
    ///
    /// If the consumer stopped listening the item is discarded.
    ///
    /// # Errors
    /// Returns [`OathError::UnsupportedCapability`] when the library has no progress support.
    pub async fn notify(&self, item: N) -> Result<(), OathError> {
        match &self.progress {
            Some(tx) => {
                let _ = tx.send(item).await;
                Ok(())
            }
            None => Err(OathError::UnsupportedCapability(
                "promise library does not support progress notification".into(),
            )),
        }
    }

    /// Wait until the consumer has taken the previous progress item.
    ///
    /// Returns `Ok(None)` once the consumer stopped listening. Holding the permit reserves the
    /// single slot, so whatever produces the next item can be started only after this returns.
    ///
    /// # Errors
    /// Returns [`OathError::UnsupportedCapability`] when the library has no progress support.
    pub async fn reserve(&self) -> Result<Option<ProgressPermit<'_, N>>, OathError> {
        match &self.progress {
            Some(tx) => Ok(tx.reserve().await.ok().map(ProgressPermit)),
            None => Err(OathError::UnsupportedCapability(
                "promise library does not support progress notification".into(),
            )),
        }
    }
}

/// A reserved progress slot; see [`Deferred::reserve`].
pub struct ProgressPermit<'a, N>(mpsc::Permit<'a, N>);

impl<N> ProgressPermit<'_, N> {
    pub fn send(self, item: N) {
        self.0.send(item);
    }
}

impl<N> fmt::Debug for ProgressPermit<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressPermit").finish_non_exhaustive()
    }
}

impl<T, N> fmt::Debug for Deferred<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("can_notify", &self.can_notify())
            .finish_non_exhaustive()
    }
}

/// Consumer side of a pending result.
///
/// Awaiting a promise yields the final result. Progress items are only delivered through
/// [`progress`](Promise::progress) before the promise is first polled; once it is awaited, items
/// still to come are discarded and the producer runs to completion.
pub struct Promise<T, N = ()> {
    outcome: oneshot::Receiver<Result<T, OathError>>,
    progress: Option<mpsc::Receiver<N>>,
    library: Arc<dyn PromiseLibrary>,
}

impl<T, N> Promise<T, N> {
    /// A promise that is already rejected.
    #[must_use]
    pub fn rejected(library: &Arc<dyn PromiseLibrary>, err: OathError) -> Self {
        let (deferred, promise) = defer(library);
        deferred.reject(err);
        promise
    }

    #[must_use]
    pub fn supports_progress(&self) -> bool {
        self.progress.is_some()
    }

    /// Next progress item, or `None` once the result settled or if progress is unsupported.
    pub async fn progress(&mut self) -> Option<N> {
        match self.progress.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    #[must_use]
    pub fn library(&self) -> &Arc<dyn PromiseLibrary> {
        &self.library
    }
}

impl<T, N> Promise<T, N>
where
    T: Send + 'static,
    N: Send + 'static,
{
    /// Detach the promise, routing a rejection to [`PromiseLibrary::on_unhandled`].
    ///
    /// Progress items are discarded.
    pub fn done(mut self) -> JoinHandle<()> {
        self.progress = None;
        let library = Arc::clone(&self.library);
        tokio::spawn(async move {
            if let Err(err) = self.await {
                library.on_unhandled(err);
            }
        })
    }
}

impl<T, N> Unpin for Promise<T, N> {}

impl<T, N> Future for Promise<T, N> {
    type Output = Result<T, OathError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        // awaiting the outcome ends interest in progress; the producer then skips its items
        this.progress = None;
        match Pin::new(&mut this.outcome).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(OathError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T, N> fmt::Debug for Promise<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("library", &self.library.name())
            .field("supports_progress", &self.supports_progress())
            .finish_non_exhaustive()
    }
}
