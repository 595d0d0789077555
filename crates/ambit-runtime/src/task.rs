use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use ambit_sync::{stream, AsyncStream, Emitter};
use ambit_types::BoxError;
use compact_str::CompactString;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::registry::{next_task_id, task_registry, CompletionGuard, TaskEntry};
use crate::scope::ScopeFrame;
use crate::{current_frame, CURRENT_FRAME};

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task was cancelled")]
    Cancelled,
    #[error("task panicked")]
    Panicked,
}

/// Owned handle to a tracked background task. Awaiting it yields the task's
/// output, or [`TaskError`] when the task was aborted or panicked.
pub struct TaskHandle<T> {
    id: u64,
    inner: JoinHandle<T>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.inner.abort();
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx).map_err(|error| {
            if error.is_cancelled() {
                TaskError::Cancelled
            } else {
                TaskError::Panicked
            }
        })
    }
}

/// Spawns `fut` on the tokio runtime inside its own ambient frame.
///
/// The frame snapshots the creator's identity and state for lookups but is
/// isolated from it, so nothing the task publishes flows back. The task is
/// registered process-wide and aborted if its creating scope closes first or
/// [`crate::shutdown_background_tasks`] runs.
pub fn spawn<F>(label: impl Into<CompactString>, fut: F) -> TaskHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let label = label.into();
    let creator = current_frame();
    let frame = Arc::new(ScopeFrame::for_task(creator.clone(), &label));
    let scope_identity = frame.identity().clone();
    let id = next_task_id();
    let (done_tx, done_rx) = oneshot::channel();

    let body = CURRENT_FRAME.scope(frame, async move {
        let _done = CompletionGuard {
            id,
            tx: Some(done_tx),
        };
        fut.await
    });
    let inner = tokio::spawn(body);

    if let Some(creator) = creator {
        creator.adopt_task(inner.abort_handle());
    }
    task_registry().lock().insert(
        id,
        TaskEntry {
            label,
            scope: scope_identity,
            abort: inner.abort_handle(),
            done: done_rx,
        },
    );

    TaskHandle { id, inner }
}

/// Runs a push-style producer on a background task and returns the pull side
/// as a stream. The producer writes through the emitter; its return value
/// decides the terminal: `Ok` finishes the stream, `Err` surfaces as a
/// failure to the consumer.
pub fn bridge<T, F, Fut>(label: impl Into<CompactString>, producer: F) -> AsyncStream<T>
where
    T: Send + 'static,
    F: FnOnce(Emitter<T>) -> Fut,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    let (sender, receiver) = stream();
    let emitter = sender.emitter();
    let fut = producer(emitter);
    spawn(label, async move {
        match fut.await {
            Ok(()) => sender.finish(),
            Err(error) => sender.fail(error),
        }
    });
    receiver
}
