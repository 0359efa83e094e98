use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::task::{self, Poll};

use chatline_protocol::{
    BackendError, ChatBackend, ConversationDetail, ErrorKind, EventStream,
    FinalMessage, FrameDecoder, SendRequest, StreamEvent, UsageSummary,
    parse_event,
};

#[derive(Debug)]
struct EchoError(ErrorKind);

impl Display for EchoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error for EchoError {}

impl BackendError for EchoError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

/// Replays a raw wire body through the frame decoder.
struct EchoStream {
    frames: VecDeque<String>,
}

impl EchoStream {
    fn new(content: &str) -> Self {
        let mut body = String::from(": keep-alive\n\ndata: {\"type\":\"start\"}\n");
        let mut words = content.split(' ').peekable();
        while let Some(word) = words.next() {
            let token = if words.peek().is_some() {
                format!("{word} ")
            } else {
                word.to_owned()
            };
            body.push_str(&format!(
                "data: {{\"type\":\"token\",\"token\":\"{token}\"}}\n"
            ));
        }
        body.push_str(&format!(
            "data: {{\"type\":\"end\",\"message\":{{\"role\":\"assistant\",\
             \"content\":\"{content}\"}}}}\n"
        ));

        // Feed the body in tiny chunks to exercise the buffering.
        let mut decoder = FrameDecoder::new();
        let mut frames = VecDeque::new();
        for chunk in body.as_bytes().chunks(3) {
            frames.extend(decoder.push(chunk));
        }
        Self { frames }
    }
}

impl EventStream for EchoStream {
    type Error = EchoError;

    fn poll_next_event(
        mut self: Pin<&mut Self>,
        _cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<StreamEvent>, Self::Error>> {
        let event = self.frames.pop_front().map(|frame| parse_event(&frame));
        Poll::Ready(Ok(event))
    }
}

struct EchoBackend;

impl ChatBackend for EchoBackend {
    type Error = EchoError;
    type Stream = EchoStream;

    fn open_stream(
        &self,
        conversation_id: &str,
        req: &SendRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        let result = if conversation_id.is_empty() {
            Err(EchoError(ErrorKind::NotFound))
        } else {
            Ok(EchoStream::new(&req.content))
        };
        ready(result)
    }

    fn fetch_conversation(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<ConversationDetail, Self::Error>>
    + Send
    + 'static {
        ready(Ok(ConversationDetail {
            id: conversation_id.to_owned(),
            title: None,
            messages: vec![],
            settings: None,
        }))
    }

    fn fetch_usage(
        &self,
        _conversation_id: &str,
    ) -> impl Future<Output = Result<UsageSummary, Self::Error>> + Send + 'static
    {
        ready(Err(EchoError(ErrorKind::Other)))
    }
}

#[tokio::test]
async fn test_echo_stream() {
    let backend = EchoBackend;
    let mut stream = backend
        .open_stream("c1", &SendRequest::new("You said hello"))
        .await
        .unwrap();

    let mut events = vec![];
    while let Some(event) =
        std::future::poll_fn(|cx| Pin::new(&mut stream).poll_next_event(cx))
            .await
            .unwrap()
    {
        events.push(event);
    }

    assert_eq!(events.first(), Some(&StreamEvent::Start));
    let tokens: String = events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Token { token } => Some(token.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(tokens, "You said hello");
    assert_eq!(
        events.last(),
        Some(&StreamEvent::End {
            message: FinalMessage {
                role: "assistant".to_owned(),
                content: "You said hello".to_owned(),
            },
            usage: None,
        })
    );
}

#[tokio::test]
async fn test_errors() {
    let backend = EchoBackend;
    let Err(err) = backend.open_stream("", &SendRequest::new("hi")).await
    else {
        panic!("expected an error");
    };
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let detail = backend.fetch_conversation("c1").await.unwrap();
    assert_eq!(detail.id, "c1");
    let err = backend.fetch_usage("c1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Other);
}
