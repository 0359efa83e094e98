use std::pin::Pin;
use std::sync::Arc;

use chatline_protocol::{
    BackendError, ChatBackend, ConversationDetail, EventStream, SendRequest,
    StreamEvent, UsageSummary,
};
use futures_util::stream::{Stream, poll_fn};

pub(crate) type BoxedError = Box<dyn BackendError>;
pub(crate) type BoxedEventStream =
    Pin<Box<dyn Stream<Item = Result<StreamEvent, BoxedError>> + Send>>;
type BoxedFuture<T> =
    Pin<Box<dyn Future<Output = Result<T, BoxedError>> + Send>>;

trait BackendObject: Send + Sync + 'static {
    fn open_stream(
        &self,
        conversation_id: &str,
        req: &SendRequest,
    ) -> BoxedFuture<BoxedEventStream>;

    fn fetch_conversation(
        &self,
        conversation_id: &str,
    ) -> BoxedFuture<ConversationDetail>;

    fn fetch_usage(&self, conversation_id: &str) -> BoxedFuture<UsageSummary>;
}

struct BackendObjectImpl<B: ChatBackend>(B);

impl<B: ChatBackend + 'static> BackendObject for BackendObjectImpl<B> {
    fn open_stream(
        &self,
        conversation_id: &str,
        req: &SendRequest,
    ) -> BoxedFuture<BoxedEventStream> {
        let fut = self.0.open_stream(conversation_id, req);
        Box::pin(async move {
            let stream = fut.await.map_err(box_error)?;
            Ok(erase_stream(stream))
        })
    }

    fn fetch_conversation(
        &self,
        conversation_id: &str,
    ) -> BoxedFuture<ConversationDetail> {
        let fut = self.0.fetch_conversation(conversation_id);
        Box::pin(async move { fut.await.map_err(box_error) })
    }

    fn fetch_usage(&self, conversation_id: &str) -> BoxedFuture<UsageSummary> {
        let fut = self.0.fetch_usage(conversation_id);
        Box::pin(async move { fut.await.map_err(box_error) })
    }
}

#[inline]
fn box_error<E: BackendError>(err: E) -> BoxedError {
    Box::new(err)
}

fn erase_stream<S: EventStream>(stream: S) -> BoxedEventStream {
    let mut stream = Box::pin(stream);
    Box::pin(poll_fn(move |cx| {
        stream
            .as_mut()
            .poll_next_event(cx)
            .map(|res| res.map_err(box_error).transpose())
    }))
}

/// A type-erased wrapper around a chat backend, so that the client doesn't
/// need a generic parameter.
#[derive(Clone)]
pub(crate) struct BackendClient {
    backend: Arc<dyn BackendObject>,
}

impl BackendClient {
    #[inline]
    pub fn new<B: ChatBackend + 'static>(backend: B) -> Self {
        Self {
            backend: Arc::new(BackendObjectImpl(backend)),
        }
    }

    /// Opens the generation stream for a send.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. Dropping the future or the stream drops
    /// the underlying request.
    #[inline]
    pub fn open_stream(
        &self,
        conversation_id: &str,
        req: &SendRequest,
    ) -> BoxedFuture<BoxedEventStream> {
        trace!("opening stream: {req:?}");
        self.backend.open_stream(conversation_id, req)
    }

    #[inline]
    pub fn fetch_conversation(
        &self,
        conversation_id: &str,
    ) -> BoxedFuture<ConversationDetail> {
        self.backend.fetch_conversation(conversation_id)
    }

    #[inline]
    pub fn fetch_usage(
        &self,
        conversation_id: &str,
    ) -> BoxedFuture<UsageSummary> {
        self.backend.fetch_usage(conversation_id)
    }
}
