use chatline_protocol::ChatBackend;

use super::{ChatClient, UpdateFn};
use crate::backend_client::BackendClient;
use crate::transcript::ConversationTranscript;

/// [`ChatClient`] builder.
pub struct ChatClientBuilder {
    pub(crate) backend: BackendClient,
    pub(crate) on_update: Option<UpdateFn>,
}

impl ChatClientBuilder {
    /// Creates a new builder with the specified backend.
    #[inline]
    pub fn with_backend<B: ChatBackend + 'static>(backend: B) -> Self {
        Self {
            backend: BackendClient::new(backend),
            on_update: None,
        }
    }

    /// Attaches a callback to be invoked whenever a transcript changes.
    ///
    /// The callback runs while the transcript is locked, and calls for one
    /// conversation arrive in the order of the changes. It must not call
    /// back into the client for the same conversation.
    #[inline]
    pub fn on_update(
        mut self,
        on_update: impl Fn(&ConversationTranscript) + Send + Sync + 'static,
    ) -> Self {
        self.on_update = Some(Box::new(on_update));
        self
    }

    /// Builds the client.
    #[inline]
    pub fn build(self) -> ChatClient {
        ChatClient::from_builder(self)
    }
}
