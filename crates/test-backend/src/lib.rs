//! A scripted in-process backend for testing purpose.

mod preset;

use std::collections::{HashMap, VecDeque};
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future::{pending, ready};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use chatline_protocol::{
    BackendError, ChatBackend, ConversationDetail, ErrorKind, EventStream,
    FrameDecoder, SendRequest, StreamEvent, UsageSummary, parse_event,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for Error {}

impl BackendError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// The generation stream of a [`TestBackend`] response.
pub struct TestEventStream {
    events: VecDeque<PresetEvent>,
    decoder: FrameDecoder,
    frames: VecDeque<String>,
    delay: Option<Duration>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl EventStream for TestEventStream {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<StreamEvent>, Self::Error>> {
        let this = self.get_mut();

        if let Some(frame) = this.frames.pop_front() {
            return Poll::Ready(Ok(Some(parse_event(&frame))));
        }

        if let Some(delay) = this.delay {
            let sleep =
                this.sleep.get_or_insert_with(|| Box::pin(sleep(delay)));
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;
        }

        loop {
            let Some(preset) = this.events.pop_front() else {
                this.decoder.finish();
                return Poll::Ready(Ok(None));
            };
            match preset {
                PresetEvent::Event(event) => {
                    return Poll::Ready(Ok(Some(event)));
                }
                PresetEvent::Raw(bytes) => {
                    this.frames.extend(this.decoder.push(&bytes));
                    if let Some(frame) = this.frames.pop_front() {
                        return Poll::Ready(Ok(Some(parse_event(&frame))));
                    }
                }
                PresetEvent::Stall => {
                    this.events.push_front(PresetEvent::Stall);
                    return Poll::Pending;
                }
                PresetEvent::Disconnect => {
                    return Poll::Ready(Err(Error::new(
                        "connection reset by peer",
                        ErrorKind::Transport,
                    )));
                }
            }
        }
    }
}

#[derive(Default)]
struct Script {
    responses: HashMap<String, VecDeque<PresetResponse>>,
    conversations: HashMap<String, ConversationDetail>,
    usage: HashMap<String, UsageSummary>,
    fail_fetches: bool,
    requests: Vec<(String, SendRequest)>,
    conversation_fetches: HashMap<String, usize>,
    usage_fetches: HashMap<String, usize>,
}

/// A local fake backend for testing purpose.
///
/// Responses are scripted per conversation and consumed in order, one per
/// send. Sending to a conversation without a queued response fails with
/// [`ErrorKind::NotFound`]. The backend records every request and counts
/// every fetch, so tests can assert on what the client did.
///
/// Clones share the same script.
#[derive(Clone, Default)]
pub struct TestBackend {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl TestBackend {
    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues the response for the next send to `conversation_id`.
    pub fn add_response<S: Into<String>>(
        &self,
        conversation_id: S,
        response: PresetResponse,
    ) {
        self.script()
            .responses
            .entry(conversation_id.into())
            .or_default()
            .push_back(response);
    }

    /// Sets what a conversation fetch returns.
    pub fn set_conversation(&self, detail: ConversationDetail) {
        self.script()
            .conversations
            .insert(detail.id.clone(), detail);
    }

    /// Sets what a usage fetch returns.
    pub fn set_usage<S: Into<String>>(
        &self,
        conversation_id: S,
        usage: UsageSummary,
    ) {
        self.script().usage.insert(conversation_id.into(), usage);
    }

    /// Makes every fetch fail.
    pub fn set_fail_fetches(&self, fail: bool) {
        self.script().fail_fetches = fail;
    }

    /// Waits for `duration` before every stream step.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns all send requests received so far.
    pub fn requests(&self) -> Vec<(String, SendRequest)> {
        self.script().requests.clone()
    }

    /// Returns how many times the conversation was fetched.
    pub fn conversation_fetches(&self, conversation_id: &str) -> usize {
        self.script()
            .conversation_fetches
            .get(conversation_id)
            .copied()
            .unwrap_or_default()
    }

    /// Returns how many times the usage was fetched.
    pub fn usage_fetches(&self, conversation_id: &str) -> usize {
        self.script()
            .usage_fetches
            .get(conversation_id)
            .copied()
            .unwrap_or_default()
    }
}

type BoxedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

impl ChatBackend for TestBackend {
    type Error = crate::Error;
    type Stream = TestEventStream;

    fn open_stream(
        &self,
        conversation_id: &str,
        req: &SendRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        let mut script = self.script();
        script
            .requests
            .push((conversation_id.to_owned(), req.clone()));
        let response = script
            .responses
            .get_mut(conversation_id)
            .and_then(VecDeque::pop_front);

        let fut: BoxedFuture<Result<TestEventStream, Error>> = match response
        {
            None => Box::pin(ready(Err(Error::new(
                "no preset response",
                ErrorKind::NotFound,
            )))),
            Some(response) if response.hang => Box::pin(pending()),
            Some(PresetResponse {
                rejection: Some((status, reason)),
                ..
            }) => Box::pin(ready(Err(Error::new(
                format!("{status} {reason}"),
                ErrorKind::from_status(status),
            )))),
            Some(response) => Box::pin(ready(Ok(TestEventStream {
                events: response.events.into(),
                decoder: FrameDecoder::new(),
                frames: VecDeque::new(),
                delay: self.delay,
                sleep: None,
            }))),
        };
        fut
    }

    fn fetch_conversation(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<ConversationDetail, Self::Error>>
    + Send
    + 'static {
        let mut script = self.script();
        *script
            .conversation_fetches
            .entry(conversation_id.to_owned())
            .or_default() += 1;
        let result = if script.fail_fetches {
            Err(Error::new("fetch failed", ErrorKind::Transport))
        } else {
            script
                .conversations
                .get(conversation_id)
                .cloned()
                .ok_or_else(|| {
                    Error::new("no such conversation", ErrorKind::NotFound)
                })
        };
        ready(result)
    }

    fn fetch_usage(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<UsageSummary, Self::Error>> + Send + 'static
    {
        let mut script = self.script();
        *script
            .usage_fetches
            .entry(conversation_id.to_owned())
            .or_default() += 1;
        let result = if script.fail_fetches {
            Err(Error::new("fetch failed", ErrorKind::Transport))
        } else {
            script
                .usage
                .get(conversation_id)
                .copied()
                .ok_or_else(|| Error::new("no usage", ErrorKind::NotFound))
        };
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use chatline_protocol::Usage;

    use super::*;

    async fn collect_events(
        stream: TestEventStream,
    ) -> (Vec<StreamEvent>, Option<Error>) {
        let mut stream = pin!(stream);
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
    async fn test_scripted_events() {
        let backend = TestBackend::default();
        backend.add_response(
            "c1",
            PresetResponse::with_events([
                PresetEvent::start(),
                PresetEvent::raw(b"data: {\"type\":\"tok"),
                PresetEvent::raw(b"en\",\"token\":\"4\"}\n"),
                PresetEvent::end(
                    "4",
                    Some(Usage {
                        prompt_tokens: 5,
                        completion_tokens: 1,
                        total_tokens: 6,
                    }),
                ),
            ]),
        );

        let stream = backend
            .open_stream("c1", &SendRequest::new("2+2?"))
            .await
            .unwrap();
        let (events, err) = collect_events(stream).await;
        assert!(err.is_none());
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[1],
            StreamEvent::Token {
                token: "4".to_owned()
            }
        );
        assert_eq!(backend.requests().len(), 1);
        assert_eq!(backend.requests()[0].1.content, "2+2?");
    }

    #[tokio::test]
    async fn test_disconnect() {
        let mut backend = TestBackend::default();
        backend.set_delay(Duration::from_millis(1));
        backend.add_response(
            "c1",
            PresetResponse::with_events([
                PresetEvent::token("a"),
                PresetEvent::Disconnect,
            ]),
        );
        let stream = backend
            .open_stream("c1", &SendRequest::new("hi"))
            .await
            .unwrap();
        let (events, err) = collect_events(stream).await;
        assert_eq!(events.len(), 1);
        assert_eq!(err.unwrap().kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_rejections() {
        let backend = TestBackend::default();
        backend.add_response("c1", PresetResponse::rejected(429, "Too Many"));

        let Err(err) = backend.open_stream("c1", &SendRequest::new("a")).await
        else {
            panic!("expected a rejection");
        };
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.to_string(), "429 Too Many");

        // The queue is drained now.
        let Err(err) = backend.open_stream("c1", &SendRequest::new("b")).await
        else {
            panic!("expected a rejection");
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_fetches() {
        let backend = TestBackend::default();
        backend.set_usage("c1", UsageSummary::default());
        assert!(backend.fetch_conversation("c1").await.is_err());
        assert!(backend.fetch_usage("c1").await.is_ok());

        backend.set_fail_fetches(true);
        assert!(backend.fetch_usage("c1").await.is_err());
        assert_eq!(backend.conversation_fetches("c1"), 1);
        assert_eq!(backend.usage_fetches("c1"), 2);
    }
}
