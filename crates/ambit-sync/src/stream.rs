use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use ambit_types::{BoxError, SequenceError};

use crate::terminal::Terminal;

/// Creates a rendezvous push stream: `send` parks the producer until the
/// consumer has taken the value, so a producer can never run ahead of a slow
/// consumer.
///
/// The stream is single-use and single-consumer. Dropping the sender is a
/// natural finish; dropping or cancelling the receiver turns every further
/// `send` into a silent no-op.
pub fn stream<T>() -> (StreamSender<T>, AsyncStream<T>) {
    let inner = Arc::new(Mutex::new(StreamInner {
        slot: None,
        terminal: None,
        recv_waker: None,
        send_wakers: Vec::new(),
    }));
    (
        StreamSender {
            emitter: Emitter {
                inner: Arc::clone(&inner),
            },
        },
        AsyncStream {
            inner,
            terminated: false,
        },
    )
}

struct StreamInner<T> {
    slot: Option<T>,
    terminal: Option<Terminal>,
    recv_waker: Option<Waker>,
    // Every parked sender, not just the latest: detached emitters may race.
    send_wakers: Vec<Waker>,
}

impl<T> StreamInner<T> {
    fn close(&mut self, terminal: Terminal) {
        if self.terminal.is_some() {
            return;
        }
        self.terminal = Some(terminal);
        if let Some(waker) = self.recv_waker.take() {
            waker.wake();
        }
        self.wake_senders();
    }

    fn park_sender(&mut self, waker: &Waker) {
        if !self.send_wakers.iter().any(|w| w.will_wake(waker)) {
            self.send_wakers.push(waker.clone());
        }
    }

    fn wake_senders(&mut self) {
        for waker in self.send_wakers.drain(..) {
            waker.wake();
        }
    }
}

/// Send-only handle with no close-on-drop behavior.
///
/// This is what generator bridging hands to producer code: the bridge keeps
/// the [`StreamSender`] so it alone decides the terminal state after the
/// producer returns.
pub struct Emitter<T> {
    inner: Arc<Mutex<StreamInner<T>>>,
}

impl<T> Emitter<T> {
    /// Rendezvous hand-off. Parks until the consumer takes the value, or
    /// resolves silently (dropping the value) once the stream is finished —
    /// sending on a finished stream never raises on the producer side.
    pub fn send(&mut self, item: T) -> SendFuture<'_, T> {
        SendFuture {
            inner: &self.inner,
            item: Some(item),
        }
    }
}

/// Future returned by [`Emitter::send`]. At most one in-flight send per
/// stream; `&mut self` on `send` enforces this per handle.
pub struct SendFuture<'a, T> {
    inner: &'a Mutex<StreamInner<T>>,
    item: Option<T>,
}

// No structural pinning: the future holds a reference and a by-value item.
impl<T> Unpin for SendFuture<'_, T> {}

impl<T> Future for SendFuture<'_, T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut s = this.inner.lock().unwrap();
        if s.terminal.is_some() {
            this.item = None;
            return Poll::Ready(());
        }
        match this.item.take() {
            Some(item) => {
                if s.slot.is_none() {
                    s.slot = Some(item);
                    if let Some(waker) = s.recv_waker.take() {
                        waker.wake();
                    }
                } else {
                    this.item = Some(item);
                }
                s.park_sender(cx.waker());
                Poll::Pending
            }
            // Our value is in the slot; the rendezvous completes once the
            // consumer empties it.
            None => {
                if s.slot.is_none() {
                    Poll::Ready(())
                } else {
                    s.park_sender(cx.waker());
                    Poll::Pending
                }
            }
        }
    }
}

/// Producer half of [`stream`]: an [`Emitter`] plus terminal control.
pub struct StreamSender<T> {
    emitter: Emitter<T>,
}

impl<T> StreamSender<T> {
    pub fn send(&mut self, item: T) -> SendFuture<'_, T> {
        self.emitter.send(item)
    }

    /// Detaches a send-only handle sharing this stream.
    pub fn emitter(&self) -> Emitter<T> {
        Emitter {
            inner: Arc::clone(&self.emitter.inner),
        }
    }

    /// Marks normal end of stream. First terminal call wins.
    pub fn finish(&self) {
        self.emitter.inner.lock().unwrap().close(Terminal::Finished);
    }

    pub fn fail(&self, error: impl Into<BoxError>) {
        self.emitter
            .inner
            .lock()
            .unwrap()
            .close(Terminal::Failed(SequenceError::failed(error)));
    }

    pub fn is_terminated(&self) -> bool {
        self.emitter.inner.lock().unwrap().terminal.is_some()
    }
}

impl<T> Drop for StreamSender<T> {
    fn drop(&mut self) {
        self.emitter.inner.lock().unwrap().close(Terminal::Finished);
    }
}

/// Consumer half of [`stream`]. Not `Clone`; iteration is single-use.
pub struct AsyncStream<T> {
    inner: Arc<Mutex<StreamInner<T>>>,
    terminated: bool,
}

impl<T> AsyncStream<T> {
    /// Resolves the next value, or the sticky terminal state after the end.
    pub fn next(&mut self) -> NextValue<'_, T> {
        NextValue { stream: self }
    }

    /// Cancels iteration: a parked or future `send` resolves silently and
    /// this side observes the cancellation terminal with no further items.
    pub fn cancel(&mut self) {
        let mut s = self.inner.lock().unwrap();
        s.slot = None;
        s.close(Terminal::Failed(SequenceError::Cancelled));
    }

    fn poll_inner(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<T>, SequenceError>> {
        let mut s = self.inner.lock().unwrap();
        // A value placed before the terminal arrived is still delivered;
        // `cancel` clears the slot so a cancelled iteration sees zero items.
        if let Some(item) = s.slot.take() {
            // Wake every parked sender: only one will win the empty slot,
            // but each needs a poll to observe its own rendezvous completing.
            s.wake_senders();
            return Poll::Ready(Ok(Some(item)));
        }
        if let Some(terminal) = &s.terminal {
            return Poll::Ready(terminal.resolve());
        }
        s.recv_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl<T> Drop for AsyncStream<T> {
    fn drop(&mut self) {
        let mut s = self.inner.lock().unwrap();
        s.slot = None;
        s.close(Terminal::Failed(SequenceError::Cancelled));
    }
}

/// Future returned by [`AsyncStream::next`].
pub struct NextValue<'a, T> {
    stream: &'a mut AsyncStream<T>,
}

impl<T> Future for NextValue<'_, T> {
    type Output = Result<Option<T>, SequenceError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.stream.poll_inner(cx)
    }
}

impl<T> futures::Stream for AsyncStream<T> {
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
