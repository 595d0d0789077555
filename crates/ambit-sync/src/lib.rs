//! Single-consumer async sequence primitives and the cooperative
//! cancellation token.
//!
//! [`queue`] is a buffered FIFO pull queue; [`stream`] is a rendezvous push
//! stream with back-pressure. Both enforce single consumption through
//! ownership (`next` takes `&mut self`, receivers are not `Clone`) and share
//! the same monotonic terminal-state machinery: the first `finish`, `fail` or
//! `cancel` wins and later calls are no-ops.

mod cancel;
mod queue;
mod stream;
mod terminal;

pub use ambit_types::SequenceError;
pub use cancel::CancelToken;
pub use queue::{AsyncQueue, QueueSender, queue};
pub use stream::{AsyncStream, Emitter, StreamSender, stream};
