use bytes::Bytes;
use chatline_protocol::{FinalMessage, StreamEvent, Usage};

/// One step of a preset stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PresetEvent {
    /// Delivers the event as-is.
    Event(StreamEvent),
    /// Feeds raw wire bytes through the frame decoder. The bytes may end
    /// in the middle of a frame, the rest can follow in another `Raw`.
    Raw(Bytes),
    /// Never yields again. Only cancellation gets a reader past this.
    Stall,
    /// Fails the read, as if the connection was reset.
    Disconnect,
}

impl PresetEvent {
    /// A `start` event.
    #[inline]
    pub fn start() -> Self {
        PresetEvent::Event(StreamEvent::Start)
    }

    /// A `token` event.
    #[inline]
    pub fn token<S: Into<String>>(token: S) -> Self {
        PresetEvent::Event(StreamEvent::Token {
            token: token.into(),
        })
    }

    /// An `end` event with an assistant message.
    #[inline]
    pub fn end<S: Into<String>>(content: S, usage: Option<Usage>) -> Self {
        PresetEvent::Event(StreamEvent::End {
            message: FinalMessage {
                role: "assistant".to_owned(),
                content: content.into(),
            },
            usage,
        })
    }

    /// An `error` event.
    #[inline]
    pub fn error<S: Into<String>>(error: S) -> Self {
        PresetEvent::Event(StreamEvent::Error {
            error: error.into(),
        })
    }

    /// Raw wire bytes.
    #[inline]
    pub fn raw(bytes: &'static [u8]) -> Self {
        PresetEvent::Raw(Bytes::from_static(bytes))
    }
}

/// How the server answers one send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the request is rejected with this status line instead.
    pub rejection: Option<(u16, String)>,
    /// If set, the response head never arrives.
    pub hang: bool,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            rejection: None,
            hang: false,
        }
    }

    /// Creates a response that is rejected with a non-success status.
    #[inline]
    pub fn rejected<S: Into<String>>(status: u16, reason: S) -> Self {
        Self {
            events: vec![],
            rejection: Some((status, reason.into())),
            hang: false,
        }
    }

    /// Creates a response whose head never arrives.
    #[inline]
    pub fn hanging() -> Self {
        Self {
            events: vec![],
            rejection: None,
            hang: true,
        }
    }
}
