use std::error::Error;

use crate::error::ErrorKind;
use crate::request::{ConversationDetail, SendRequest};
use crate::stream::EventStream;
use crate::UsageSummary;

/// The error type for a chat backend.
pub trait BackendError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// A type that reaches the chat server on behalf of the client.
///
/// Backends should behave like stateless objects: every method returns a
/// future that is independent of `self`, so callers may drop the backend
/// while requests are still in flight. All futures must be cancel safe.
pub trait ChatBackend: Send + Sync {
    /// The error type that may be returned by the backend.
    type Error: BackendError;

    /// The stream type for successful sends.
    type Stream: EventStream<Error = Self::Error>;

    /// Sends a user message and opens its generation stream.
    ///
    /// Resolves once the response head has arrived. A non-success status,
    /// or a response without a body, is an error.
    fn open_stream(
        &self,
        conversation_id: &str,
        req: &SendRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static;

    /// Fetches the authoritative state of a conversation.
    fn fetch_conversation(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<ConversationDetail, Self::Error>>
    + Send
    + 'static;

    /// Fetches the aggregate token usage of a conversation.
    fn fetch_usage(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<UsageSummary, Self::Error>> + Send + 'static;
}
