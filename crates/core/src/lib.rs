//! Client-side logic for streamed conversations: the send state machine,
//! the optimistic transcript it drives, and the reconciliation with the
//! server that follows every send.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod backend_client;
mod client;
mod error;
mod operation;
mod registry;
pub mod transcript;

pub use client::{ChatClient, ChatClientBuilder, SendOutcome, SendTask};
pub use error::SendTaskError;
pub use operation::SendStatus;
pub use registry::SendId;
pub use transcript::ConversationTranscript;
