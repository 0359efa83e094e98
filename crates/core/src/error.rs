use std::error::Error;
use std::fmt;

/// The error returned when a send task could not report its outcome,
/// because it panicked or its runtime shut down.
pub struct SendTaskError {
    pub(crate) reason: String,
}

impl fmt::Debug for SendTaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendTaskError")
            .field("reason", &self.reason)
            .finish()
    }
}

impl fmt::Display for SendTaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "the send task has died: {}", self.reason)
    }
}

impl Error for SendTaskError {}
