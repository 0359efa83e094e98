mod builder;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chatline_protocol::{Message, Role, SendRequest, StreamEvent};
use futures_util::stream::StreamExt;
use tokio::select;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::backend_client::{BackendClient, BoxedEventStream};
use crate::error::SendTaskError;
use crate::operation::{Effect, SendOperation, SendStatus};
use crate::registry::{SendId, SendRegistry};
use crate::transcript::ConversationTranscript;
pub use builder::ChatClientBuilder;

type Slot = Arc<watch::Sender<ConversationTranscript>>;
type UpdateFn = Box<dyn Fn(&ConversationTranscript) + Send + Sync>;

/// A client that sends messages and keeps conversation transcripts in sync
/// with the server.
///
/// Every send optimistically updates the local transcript: the user input
/// shows up immediately, and the assistant reply grows token by token while
/// it streams. Once the send is over, the transcript is reconciled with the
/// server's copy, which brings in server ids, exact timestamps, and usage.
///
/// Only one send is live per conversation. Submitting a message cancels
/// whatever was still streaming into the same conversation. Sends into
/// different conversations don't affect each other.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<Inner>,
}

struct Inner {
    backend: BackendClient,
    registry: SendRegistry,
    conversations: Mutex<HashMap<String, Slot>>,
    on_update: Option<UpdateFn>,
    next_send_id: AtomicU64,
}

/// The outcome of a finished send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendOutcome {
    /// The send this outcome belongs to.
    pub send_id: SendId,
    /// The terminal status.
    pub status: SendStatus,
    /// Why the send failed, for [`SendStatus::Failed`].
    pub error: Option<String>,
    /// Whether both the conversation and its usage were fetched and
    /// applied after the send.
    pub reconciled: bool,
}

/// A handle to a running send.
///
/// Dropping the handle detaches the send, it keeps running.
pub struct SendTask {
    send_id: SendId,
    conversation_id: String,
    token: CancellationToken,
    handle: JoinHandle<SendOutcome>,
}

impl SendTask {
    /// Returns the identifier of this send.
    #[inline]
    pub fn send_id(&self) -> SendId {
        self.send_id
    }

    /// Returns the conversation this send belongs to.
    #[inline]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Aborts the send.
    ///
    /// Tokens that were already applied stay visible until the next
    /// reconciliation. Cancelling more than once, or after the send has
    /// finished, does nothing.
    #[inline]
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` once the send, including its reconciliation, is over.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the send to finish.
    pub async fn join(self) -> Result<SendOutcome, SendTaskError> {
        self.handle.await.map_err(|err| SendTaskError {
            reason: err.to_string(),
        })
    }
}

impl ChatClient {
    fn from_builder(builder: ChatClientBuilder) -> Self {
        let ChatClientBuilder { backend, on_update } = builder;
        let inner = Inner {
            backend,
            registry: SendRegistry::default(),
            conversations: Default::default(),
            on_update,
            next_send_id: AtomicU64::new(1),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Sends a user message into a conversation.
    ///
    /// The provisional user message is in the transcript by the time this
    /// method returns. The rest of the send runs on a spawned task, so this
    /// must be called within a Tokio runtime.
    pub fn submit<S: Into<String>>(
        &self,
        conversation_id: S,
        req: SendRequest,
    ) -> SendTask {
        let conversation_id = conversation_id.into();
        let send_id =
            SendId(self.inner.next_send_id.fetch_add(1, Ordering::Relaxed));

        // From here on, events of the superseded send are discarded.
        let token = self.inner.registry.begin_send(&conversation_id, send_id);

        let slot = self.inner.slot(&conversation_id);
        let input = Message::provisional(Role::User, req.content.clone());
        self.inner.mutate(&slot, move |transcript| {
            transcript.clear_streaming_buffer();
            transcript.append_message(input);
            true
        });

        let span = debug_span!(
            "send",
            conversation = %conversation_id,
            send = %send_id
        );
        let handle = tokio::spawn(
            Arc::clone(&self.inner)
                .run_send(conversation_id.clone(), send_id, token.clone(), req)
                .instrument(span),
        );

        SendTask {
            send_id,
            conversation_id,
            token,
            handle,
        }
    }

    /// Cancels the live send of a conversation.
    ///
    /// Returns `false` if nothing was live.
    #[inline]
    pub fn cancel(&self, conversation_id: &str) -> bool {
        self.inner.registry.cancel(conversation_id)
    }

    /// Returns `true` while a send into the conversation is live.
    #[inline]
    pub fn is_sending(&self, conversation_id: &str) -> bool {
        self.inner.registry.live_send(conversation_id).is_some()
    }

    /// Returns a snapshot of a conversation's transcript.
    pub fn transcript(&self, conversation_id: &str) -> ConversationTranscript {
        self.inner.slot(conversation_id).borrow().clone()
    }

    /// Subscribes to the changes of a conversation's transcript.
    pub fn subscribe(
        &self,
        conversation_id: &str,
    ) -> watch::Receiver<ConversationTranscript> {
        self.inner.slot(conversation_id).subscribe()
    }

    /// Loads the server's copy of a conversation into its transcript.
    ///
    /// Nothing is applied while a send into the conversation is live, or if
    /// a send begins or a newer refresh lands before the server answers.
    /// Returns whether both the conversation and its usage were applied.
    pub async fn refresh(&self, conversation_id: &str) -> bool {
        let slot = self.inner.slot(conversation_id);
        self.inner.reconcile(&slot, conversation_id).await
    }
}

impl Inner {
    fn slot(&self, conversation_id: &str) -> Slot {
        let mut conversations = self
            .conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let slot = conversations
            .entry(conversation_id.to_owned())
            .or_insert_with(|| {
                let transcript = ConversationTranscript::new(conversation_id);
                Arc::new(watch::Sender::new(transcript))
            });
        Arc::clone(slot)
    }

    /// Mutates a transcript. `f` returns whether it changed anything, and
    /// observers are notified, in order, under the same lock.
    fn mutate<F>(&self, slot: &Slot, f: F)
    where
        F: FnOnce(&mut ConversationTranscript) -> bool,
    {
        slot.send_if_modified(|transcript| {
            let modified = f(transcript);
            if modified {
                if let Some(on_update) = &self.on_update {
                    on_update(transcript);
                }
            }
            modified
        });
    }

    async fn run_send(
        self: Arc<Self>,
        conversation_id: String,
        send_id: SendId,
        token: CancellationToken,
        req: SendRequest,
    ) -> SendOutcome {
        let slot = self.slot(&conversation_id);
        let mut op = SendOperation::new(send_id);
        self.drive(&slot, &conversation_id, &mut op, &token, &req)
            .await;

        self.registry.finish(&conversation_id, send_id);
        if op.status() == SendStatus::Cancelled {
            // A newer send owns the indicator if there is one.
            self.mutate(&slot, |transcript| {
                self.registry.live_send(&conversation_id).is_none()
                    && transcript.stop_streaming()
            });
        }
        debug!("send finished: {:?}", op.status());

        let reconciled = self.reconcile(&slot, &conversation_id).await;
        SendOutcome {
            send_id,
            status: op.status(),
            error: op.error().map(ToOwned::to_owned),
            reconciled,
        }
    }

    async fn drive(
        &self,
        slot: &Slot,
        conversation_id: &str,
        op: &mut SendOperation,
        token: &CancellationToken,
        req: &SendRequest,
    ) {
        let open_fut = self.backend.open_stream(conversation_id, req);
        let opened = select! {
            biased;

            _ = token.cancelled() => {
                op.cancel();
                return;
            }
            opened = open_fut => opened,
        };
        let mut stream: BoxedEventStream = match opened {
            Ok(stream) => stream,
            Err(err) => {
                warn!("failed to open stream: {err}");
                let error = StreamEvent::Error {
                    error: err.to_string(),
                };
                self.apply(slot, conversation_id, op, token, |op| {
                    op.on_event(error)
                });
                return;
            }
        };
        self.apply(slot, conversation_id, op, token, |op| {
            op.on_event(StreamEvent::Start)
        });

        trace!("start receiving events");
        while !op.status().is_terminal() {
            let next = select! {
                biased;

                _ = token.cancelled() => {
                    op.cancel();
                    return;
                }
                next = stream.next() => next,
            };
            match next {
                Some(Ok(event)) => {
                    trace!("got an event: {event:?}");
                    self.apply(slot, conversation_id, op, token, |op| {
                        op.on_event(event)
                    });
                }
                Some(Err(err)) => {
                    warn!("stream interrupted: {err}");
                    let reason = err.to_string();
                    self.apply(slot, conversation_id, op, token, |op| {
                        op.on_read_error(reason)
                    });
                }
                None => {
                    self.apply(slot, conversation_id, op, token, |op| {
                        op.on_stream_closed()
                    });
                }
            }
        }
    }

    /// Runs one transition and applies its effect, unless the send has been
    /// cancelled in the meantime.
    fn apply<F>(
        &self,
        slot: &Slot,
        conversation_id: &str,
        op: &mut SendOperation,
        token: &CancellationToken,
        step: F,
    ) where
        F: FnOnce(&mut SendOperation) -> Effect,
    {
        let mut cancelled = false;
        self.mutate(slot, |transcript| {
            // Checked under the transcript lock, so a newer send can't
            // append its input between this check and the effect.
            if token.is_cancelled()
                || !self.registry.is_live(conversation_id, op.send_id())
            {
                cancelled = true;
                return false;
            }
            apply_effect(transcript, step(op))
        });
        if cancelled && op.cancel() {
            debug!("discarded an event of a cancelled send");
        }
    }

    async fn reconcile(&self, slot: &Slot, conversation_id: &str) -> bool {
        let ticket = self.registry.begin_sync(conversation_id);
        let (detail, usage) = tokio::join!(
            self.backend.fetch_conversation(conversation_id),
            self.backend.fetch_usage(conversation_id),
        );
        let detail = match detail {
            Ok(detail) if detail.id == conversation_id => Some(detail),
            Ok(detail) => {
                warn!("fetched conversation {} instead", detail.id);
                None
            }
            Err(err) => {
                warn!("failed to fetch conversation: {err}");
                None
            }
        };
        let usage = match usage {
            Ok(usage) => Some(usage),
            Err(err) => {
                warn!("failed to fetch usage: {err}");
                None
            }
        };
        let complete = detail.is_some() && usage.is_some();
        if detail.is_none() && usage.is_none() {
            return false;
        }

        let mut applied = false;
        self.mutate(slot, |transcript| {
            // The server state may predate a send that began since, or a
            // sync that has been applied already.
            if !self.registry.commit_sync(conversation_id, ticket) {
                return false;
            }
            if let Some(detail) = detail {
                transcript.replace_with_detail(detail);
            }
            if let Some(usage) = usage {
                transcript.replace_usage(usage);
            }
            applied = true;
            true
        });
        applied && complete
    }
}

fn apply_effect(
    transcript: &mut ConversationTranscript,
    effect: Effect,
) -> bool {
    match effect {
        Effect::BeginAssistant => {
            transcript.begin_streaming();
            true
        }
        Effect::AppendToken(token) => transcript.append_token(&token),
        Effect::Complete { content, usage } => {
            transcript.replace_provisional_with(Message::provisional(
                Role::Assistant,
                content,
            ));
            if let Some(usage) = usage {
                transcript.add_usage(&usage);
            }
            true
        }
        Effect::Discard => transcript.clear_streaming_buffer(),
        Effect::Nothing => false,
    }
}
