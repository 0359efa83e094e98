use std::pin::Pin;
use std::task::{self, Poll};

use crate::BackendError;
use crate::event::StreamEvent;

/// The body of a successful "send message" response.
pub trait EventStream: Sized + Send + 'static {
    /// The error type that may be returned while reading the stream.
    type Error: BackendError;

    /// Attempts to pull out the next event from the stream.
    ///
    /// # Return value
    ///
    /// - `Poll::Pending` means the stream is waiting for more data. The
    ///   current task will be notified when the next event may be ready.
    /// - `Poll::Ready(Ok(Some(event)))` delivers one event, in the order it
    ///   was decoded from the wire.
    /// - `Poll::Ready(Ok(None))` means the stream has ended. This can
    ///   happen without a terminal event if the connection dropped.
    /// - `Poll::Ready(Err(error))` means the body could not be read.
    ///
    /// Payloads that fail to decode are not errors. They are delivered as
    /// [`StreamEvent::Error`]. After a terminal event, implementations
    /// should return `None`.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<StreamEvent>, Self::Error>>;
}
