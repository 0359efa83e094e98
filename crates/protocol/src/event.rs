use serde::{Deserialize, Serialize};

use crate::Usage;

/// The final message carried by an `end` event.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FinalMessage {
    /// The role as reported by the server. Clients treat it as assistant.
    #[serde(default)]
    pub role: String,
    /// The complete generated text.
    pub content: String,
}

/// An event decoded from one frame of a generation stream.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Generation has started.
    Start,
    /// A text fragment to append to the in-flight assistant message.
    Token {
        /// The fragment.
        token: String,
    },
    /// Generation finished successfully.
    End {
        /// The complete message.
        message: FinalMessage,
        /// Token usage of this run, if the server reports it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    /// Generation failed.
    Error {
        /// A human readable reason.
        error: String,
    },
    /// An event with a discriminant this crate doesn't know about.
    #[serde(skip)]
    Unknown {
        /// The value of the `type` field.
        kind: String,
    },
}

impl StreamEvent {
    /// Returns `true` for `end` and `error`, after which no further events
    /// are valid.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::End { .. } | StreamEvent::Error { .. })
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

const KNOWN_KINDS: &[&str] = &["start", "token", "end", "error"];

/// Parses a frame payload into a [`StreamEvent`].
///
/// This never fails. A payload that is not valid JSON, or does not match
/// the shape of its `type`, becomes an [`StreamEvent::Error`] carrying the
/// parse failure, so one bad frame doesn't take the whole session down.
pub fn parse_event(payload: &str) -> StreamEvent {
    let envelope = match serde_json::from_str::<Envelope>(payload) {
        Ok(envelope) => envelope,
        Err(err) => {
            return StreamEvent::Error {
                error: err.to_string(),
            };
        }
    };
    if !KNOWN_KINDS.contains(&envelope.kind.as_str()) {
        return StreamEvent::Unknown {
            kind: envelope.kind,
        };
    }
    serde_json::from_str(payload).unwrap_or_else(|err| StreamEvent::Error {
        error: err.to_string(),
    })
}
