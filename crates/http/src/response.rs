use std::pin::Pin;
use std::task::{Context, Poll, ready};

use chatline_protocol::{ErrorKind, EventStream, StreamEvent, parse_event};
use pin_project_lite::pin_project;

use crate::Error;
use crate::io::FrameReader;

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<StreamEvent>, FrameReader), Error>;

pin_project! {
    /// The generation stream of a successful send.
    pub struct HttpEventStream {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl HttpEventStream {
    #[inline]
    pub(crate) fn from_reader(reader: FrameReader) -> Self {
        Self {
            next_event_fut: Some(Box::pin(next_event(reader))),
        }
    }
}

impl EventStream for HttpEventStream {
    type Error = Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<StreamEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, reader) = match ready!(next_event_fut.as_mut().poll(cx)) {
            Ok((Some(event), reader)) => (event, reader),
            Ok((None, _)) => {
                *this.next_event_fut = None;
                return Poll::Ready(Ok(None));
            }
            Err(err) => {
                *this.next_event_fut = None;
                return Poll::Ready(Err(err));
            }
        };

        // Nothing after a terminal event belongs to this run, even if the
        // server keeps the connection open. Dropping the reader closes it.
        if event.is_terminal() {
            *this.next_event_fut = None;
        } else {
            *this.next_event_fut = Some(Box::pin(next_event(reader)));
        }

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(mut reader: FrameReader) -> NextEvent {
    let frame = match reader.next_frame().await {
        Ok(Some(frame)) => frame,
        Ok(None) => return Ok((None, reader)),
        Err(err) => {
            return Err(Error::new(
                format!("failed to read response body: {}", err.0),
                ErrorKind::Transport,
            ));
        }
    };
    trace!("got frame: {frame}");

    let event = parse_event(&frame);
    match &event {
        StreamEvent::Unknown { kind } => debug!("unknown event type: {kind}"),
        StreamEvent::Error { error } => trace!("got error event: {error}"),
        _ => {}
    }
    Ok((Some(event), reader))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;

    use super::*;
    use crate::io::{Chunks, ChunksError};

    async fn collect(chunks: Chunks) -> (Vec<StreamEvent>, Option<Error>) {
        let mut stream = pin!(HttpEventStream::from_reader(FrameReader::new(
            chunks
        )));
        let mut events = vec![];
        loop {
            match poll_fn(|cx| stream.as_mut().poll_next_event(cx)).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) => return (events, None),
                Err(err) => return (events, Some(err)),
            }
        }
    }

    #[tokio::test]
    async fn test_simple_events() {
        let chunks = Chunks::from_bytes([
            b"data: {\"type\":\"start\"}\n\n".as_slice(),
            b"data: {\"type\":\"token\",\"tok".as_slice(),
            b"en\":\"4\"}\n\n: keep-alive\n\n".as_slice(),
            b"data: {\"type\":\"end\",\"message\":{\"role\":\"assistant\",".as_slice(),
            b"\"content\":\"4\"}}\n\n".as_slice(),
            // Trailing garbage after the terminal event is never read.
            b"data: {\"type\":\"token\",\"token\":\"late\"}\n".as_slice(),
        ]);
        let (events, err) = collect(chunks).await;
        assert!(err.is_none());
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], StreamEvent::Start);
        assert_eq!(
            events[1],
            StreamEvent::Token {
                token: "4".to_owned()
            }
        );
        assert!(matches!(events[2], StreamEvent::End { .. }));
    }

    #[tokio::test]
    async fn test_malformed_frame() {
        let chunks = Chunks::from_bytes([b"data: {not json\n".as_slice()]);
        let (events, err) = collect(chunks).await;
        assert!(err.is_none());
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Error { .. }));
    }

    #[tokio::test]
    async fn test_connection_drop() {
        let chunks = Chunks::from_results(VecDeque::from([
            Ok(Bytes::from_static(b"data: {\"type\":\"token\",\"token\":\"a\"}\n")),
            Err(ChunksError("connection reset".to_owned())),
        ]));
        let (events, err) = collect(chunks).await;
        assert_eq!(events.len(), 1);
        let err = err.unwrap();
        assert_eq!(err.kind, ErrorKind::Transport);
        assert!(err.message().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_closed_without_terminal_event() {
        let chunks = Chunks::from_bytes([
            b"data: {\"type\":\"token\",\"token\":\"a\"}\n".as_slice(),
        ]);
        let (events, err) = collect(chunks).await;
        assert!(err.is_none());
        assert_eq!(events.len(), 1);
    }
}
