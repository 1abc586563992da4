//! Execution contexts for descriptor writes.
//!
//! Some platforms only accept subscription descriptor writes from one
//! designated context (typically a UI thread). The core marshals every such
//! write through a [`Dispatcher`] and awaits its completion without blocking
//! the calling task.
//!
//! Two implementations are provided:
//!
//! - [`InlineDispatcher`] runs the job on the awaiting task. Use it when the
//!   platform has no such requirement.
//! - [`DispatchQueue`] owns a dedicated worker task that runs jobs one at a
//!   time in submission order.

use std::fmt;
use std::future::Future;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, debug_span};

use crate::error::{Error, Result};

/// A unit of work submitted to a [`Dispatcher`].
pub type Job = BoxFuture<'static, ()>;

/// A designated execution context.
pub trait Dispatcher: Send + Sync + fmt::Debug {
    /// Submit `job` to this context.
    ///
    /// The returned future resolves once the job has run to completion, or
    /// with [`Error::DispatcherClosed`] if the context shut down first.
    fn dispatch(&self, job: Job) -> BoxFuture<'static, Result<()>>;
}

/// Run `future` on `dispatcher` and return its output.
///
/// # Example
///
/// ```
/// use gattlink_core::dispatch::{run_on, InlineDispatcher};
///
/// # #[tokio::main]
/// # async fn main() -> gattlink_core::Result<()> {
/// let answer = run_on(&InlineDispatcher, async { 6 * 7 }).await?;
/// assert_eq!(answer, 42);
/// # Ok(())
/// # }
/// ```
pub async fn run_on<D, F, T>(dispatcher: &D, future: F) -> Result<T>
where
    D: Dispatcher + ?Sized,
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let job = async move {
        // The receiver only goes away if the caller stopped waiting.
        let _ = tx.send(future.await);
    }
    .boxed();
    dispatcher.dispatch(job).await?;
    rx.await.map_err(|_| Error::DispatcherClosed)
}

/// Runs jobs directly on the task that awaits them.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, job: Job) -> BoxFuture<'static, Result<()>> {
        async move {
            job.await;
            Ok(())
        }
        .boxed()
    }
}

struct QueuedJob {
    job: Job,
    done: oneshot::Sender<()>,
}

/// A dedicated worker task that runs submitted jobs sequentially.
///
/// The worker exits once the queue is dropped and every job submitted before
/// that has run.
pub struct DispatchQueue {
    name: String,
    sender: mpsc::UnboundedSender<QueuedJob>,
}

impl fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("name", &self.name)
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl DispatchQueue {
    /// Spawn the worker on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn spawn(name: impl Into<String>) -> Self {
        let name = name.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<QueuedJob>();
        let span = debug_span!("dispatch_queue", name = %name);

        tokio::spawn(
            async move {
                while let Some(QueuedJob { job, done }) = receiver.recv().await {
                    job.await;
                    let _ = done.send(());
                }
                debug!("Dispatch queue drained, worker exiting");
            }
            .instrument(span),
        );

        Self { name, sender }
    }

    /// The queue's name, used in log spans.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the worker has stopped accepting jobs.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl Dispatcher for DispatchQueue {
    fn dispatch(&self, job: Job) -> BoxFuture<'static, Result<()>> {
        let (done, finished) = oneshot::channel();
        let queued = self.sender.send(QueuedJob { job, done });
        async move {
            queued.map_err(|_| Error::DispatcherClosed)?;
            finished.await.map_err(|_| Error::DispatcherClosed)
        }
        .boxed()
    }
}
