use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use ambit_types::{BoxError, SequenceError};

use crate::terminal::Terminal;

/// Creates a buffered FIFO queue bridging producer code into single-consumer
/// async iteration.
///
/// Senders are cheap to clone; the receiver is the one consumer. Dropping the
/// last sender finishes the queue; dropping the receiver cancels it so
/// further `enqueue` calls are rejected.
pub fn queue<T>() -> (QueueSender<T>, AsyncQueue<T>) {
    let inner = Arc::new(Mutex::new(QueueInner {
        buf: VecDeque::new(),
        terminal: None,
        recv_waker: None,
        sender_count: 1,
    }));
    (
        QueueSender {
            inner: Arc::clone(&inner),
        },
        AsyncQueue {
            inner,
            terminated: false,
        },
    )
}

struct QueueInner<T> {
    buf: VecDeque<T>,
    terminal: Option<Terminal>,
    recv_waker: Option<Waker>,
    sender_count: usize,
}

impl<T> QueueInner<T> {
    fn close(&mut self, terminal: Terminal) {
        if self.terminal.is_some() {
            return;
        }
        self.terminal = Some(terminal);
        if let Some(waker) = self.recv_waker.take() {
            waker.wake();
        }
    }
}

/// Producer half of [`queue`].
pub struct QueueSender<T> {
    inner: Arc<Mutex<QueueInner<T>>>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        self.inner.lock().unwrap().sender_count += 1;
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Drop for QueueSender<T> {
    fn drop(&mut self) {
        let mut q = self.inner.lock().unwrap();
        q.sender_count -= 1;
        if q.sender_count == 0 {
            q.close(Terminal::Finished);
        }
    }
}

impl<T> QueueSender<T> {
    /// Hands the item to a suspended consumer or buffers it. Returns `false`
    /// once the queue has reached its terminal state; the item is then
    /// rejected, never silently re-ordered after the end.
    pub fn enqueue(&self, item: T) -> bool {
        let mut q = self.inner.lock().unwrap();
        if q.terminal.is_some() {
            return false;
        }
        q.buf.push_back(item);
        if let Some(waker) = q.recv_waker.take() {
            waker.wake();
        }
        true
    }

    /// Marks normal end of sequence. First terminal call wins; later
    /// `finish`/`fail`/`cancel` calls are no-ops.
    pub fn finish(&self) {
        self.inner.lock().unwrap().close(Terminal::Finished);
    }

    /// Terminates the queue with an error the consumer will observe after
    /// draining the buffer.
    pub fn fail(&self, error: impl Into<BoxError>) {
        self.inner
            .lock()
            .unwrap()
            .close(Terminal::Failed(SequenceError::failed(error)));
    }

    /// `finish` with a cancellation-flavored terminal.
    pub fn cancel(&self) {
        self.inner
            .lock()
            .unwrap()
            .close(Terminal::Failed(SequenceError::Cancelled));
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.lock().unwrap().terminal.is_some()
    }
}

/// Consumer half of [`queue`]. Not `Clone`: a live queue permits exactly one
/// consumer, enforced by ownership.
pub struct AsyncQueue<T> {
    inner: Arc<Mutex<QueueInner<T>>>,
    terminated: bool,
}

impl<T> AsyncQueue<T> {
    /// Resolves the next item. Buffered items drain in FIFO order before any
    /// terminal state is reported; after the terminal it keeps resolving that
    /// same terminal and never yields again.
    pub fn next(&mut self) -> Next<'_, T> {
        Next { queue: self }
    }

    /// Consumer-side `cancel`: pending and future producers observe a
    /// terminated queue.
    pub fn cancel(&mut self) {
        self.inner
            .lock()
            .unwrap()
            .close(Terminal::Failed(SequenceError::Cancelled));
    }

    fn poll_inner(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<T>, SequenceError>> {
        let mut q = self.inner.lock().unwrap();
        if let Some(item) = q.buf.pop_front() {
            return Poll::Ready(Ok(Some(item)));
        }
        if let Some(terminal) = &q.terminal {
            return Poll::Ready(terminal.resolve());
        }
        q.recv_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl<T> Drop for AsyncQueue<T> {
    fn drop(&mut self) {
        self.inner
            .lock()
            .unwrap()
            .close(Terminal::Failed(SequenceError::Cancelled));
    }
}

/// Future returned by [`AsyncQueue::next`].
pub struct Next<'a, T> {
    queue: &'a mut AsyncQueue<T>,
}

impl<T> Future for Next<'_, T> {
    type Output = Result<Option<T>, SequenceError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.queue.poll_inner(cx)
    }
}

impl<T> futures::Stream for AsyncQueue<T> {
    type Item = Result<T, SequenceError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.terminated {
            return Poll::Ready(None);
        }
        match this.poll_inner(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(Some(item))) => Poll::Ready(Some(Ok(item))),
            Poll::Ready(Ok(None)) => {
                this.terminated = true;
                Poll::Ready(None)
            }
            Poll::Ready(Err(error)) => {
                this.terminated = true;
                Poll::Ready(Some(Err(error)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::queue;
    use ambit_types::SequenceError;
    use futures::StreamExt;

    #[tokio::test]
    async fn yields_items_in_order_then_finishes() {
        let (tx, mut rx) = queue();
        assert!(tx.enqueue(1));
        assert!(tx.enqueue(2));
        tx.finish();
        assert_eq!(rx.next().await.unwrap(), Some(1));
        assert_eq!(rx.next().await.unwrap(), Some(2));
        assert_eq!(rx.next().await.unwrap(), None);
        // Terminal is sticky.
        assert_eq!(rx.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn enqueue_after_finish_is_rejected() {
        let (tx, mut rx) = queue();
        tx.enqueue(1);
        tx.finish();
        assert!(!tx.enqueue(2));
        assert_eq!(rx.next().await.unwrap(), Some(1));
        assert_eq!(rx.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn buffered_items_drain_before_a_failure_terminal() {
        let (tx, mut rx) = queue();
        tx.enqueue("a");
        tx.fail(std::io::Error::other("boom"));
        assert_eq!(rx.next().await.unwrap(), Some("a"));
        let err = rx.next().await.unwrap_err();
        assert!(err.to_string().contains("boom"));
        // Later terminal calls were no-ops: still the same error.
        tx.cancel();
        assert!(rx.next().await.unwrap_err().to_string().contains("boom"));
    }

    #[tokio::test]
    async fn wakes_a_suspended_consumer() {
        let (tx, mut rx) = queue();
        let consumer = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(item) = rx.next().await.unwrap() {
                seen.push(item);
            }
            seen
        });
        tokio::task::yield_now().await;
        tx.enqueue(10);
        tx.enqueue(20);
        tx.finish();
        assert_eq!(consumer.await.unwrap(), vec![10, 20]);
    }

    #[tokio::test]
    async fn cancel_surfaces_as_cancellation() {
        let (tx, mut rx) = queue::<u32>();
        tx.cancel();
        assert!(matches!(
            rx.next().await.unwrap_err(),
            SequenceError::Cancelled
        ));
    }

    #[tokio::test]
    async fn dropping_the_last_sender_finishes() {
        let (tx, mut rx) = queue();
        let tx2 = tx.clone();
        tx.enqueue(7);
        drop(tx);
        assert!(!tx2.is_terminated());
        drop(tx2);
        assert_eq!(rx.next().await.unwrap(), Some(7));
        assert_eq!(rx.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn stream_adapter_ends_after_the_terminal() {
        let (tx, rx) = queue();
        tx.enqueue(1u32);
        tx.enqueue(2);
        tx.finish();
        let collected: Vec<_> = rx.map(Result::unwrap).collect().await;
        assert_eq!(collected, vec![1, 2]);
    }
}
