//! Types and traits shared by every participant of a streamed conversation.
//!
//! This crate defines the wire protocol spoken between a chat server and
//! its clients: the newline-delimited `data:` frames, the events they carry
//! and the conversation records exchanged around them. It also establishes
//! the [`ChatBackend`] contract, which is how the client side reaches the
//! server without knowing the transport.
//!
//! Types in this crate don't drive any state. The client logic lives in
//! `chatline-core`, and concrete backends live in their own crates.

#![deny(missing_docs)]

mod backend;
mod error;
mod event;
mod frame;
mod message;
mod request;
mod stream;

pub use backend::*;
pub use error::*;
pub use event::*;
pub use frame::*;
pub use message::*;
pub use request::*;
pub use stream::*;
