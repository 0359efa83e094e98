use chatline_protocol::{StreamEvent, Usage};

use crate::registry::SendId;

/// The stage of a send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SendStatus {
    /// The request is in flight and nothing has been generated yet.
    Pending,
    /// Tokens are arriving.
    Streaming,
    /// The server delivered the final message.
    Completed,
    /// The request was rejected or the stream reported an error.
    Failed,
    /// The send was superseded or aborted.
    Cancelled,
}

impl SendStatus {
    /// Returns `true` if the send can't make progress anymore.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SendStatus::Completed | SendStatus::Failed | SendStatus::Cancelled
        )
    }
}

/// What a transition asks the transcript to do.
#[derive(Debug, PartialEq)]
pub(crate) enum Effect {
    BeginAssistant,
    AppendToken(String),
    Complete {
        content: String,
        usage: Option<Usage>,
    },
    Discard,
    Nothing,
}

/// The state machine of one send, free of any I/O.
#[derive(Debug)]
pub(crate) struct SendOperation {
    send_id: SendId,
    status: SendStatus,
    error: Option<String>,
}

impl SendOperation {
    #[inline]
    pub fn new(send_id: SendId) -> Self {
        Self {
            send_id,
            status: SendStatus::Pending,
            error: None,
        }
    }

    #[inline]
    pub fn send_id(&self) -> SendId {
        self.send_id
    }

    #[inline]
    pub fn status(&self) -> SendStatus {
        self.status
    }

    #[inline]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn on_event(&mut self, event: StreamEvent) -> Effect {
        if self.status.is_terminal() {
            trace!("ignoring {event:?} after {:?}", self.status);
            return Effect::Nothing;
        }

        match (self.status, event) {
            (SendStatus::Pending, StreamEvent::Start) => {
                self.status = SendStatus::Streaming;
                Effect::BeginAssistant
            }
            (SendStatus::Streaming, StreamEvent::Start) => Effect::Nothing,
            (SendStatus::Streaming, StreamEvent::Token { token }) => {
                Effect::AppendToken(token)
            }
            (SendStatus::Streaming, StreamEvent::End { message, usage }) => {
                self.status = SendStatus::Completed;
                Effect::Complete {
                    content: message.content,
                    usage,
                }
            }
            (_, StreamEvent::Error { error }) => self.fail(error),
            (_, StreamEvent::Unknown { kind }) => {
                debug!("ignoring unknown event: {kind}");
                Effect::Nothing
            }
            (status, event) => {
                warn!("unexpected {event:?} while {status:?}");
                Effect::Nothing
            }
        }
    }

    /// The body could not be read any further.
    pub fn on_read_error(&mut self, reason: String) -> Effect {
        if self.status.is_terminal() {
            return Effect::Nothing;
        }
        self.fail(reason)
    }

    /// The body ended. Without a terminal event before, the send failed.
    pub fn on_stream_closed(&mut self) -> Effect {
        if self.status.is_terminal() {
            return Effect::Nothing;
        }
        self.fail("stream closed before completion".to_owned())
    }

    /// Returns `false` if the send had already finished.
    pub fn cancel(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = SendStatus::Cancelled;
        true
    }

    fn fail(&mut self, reason: String) -> Effect {
        self.status = SendStatus::Failed;
        self.error = Some(reason);
        Effect::Discard
    }
}
