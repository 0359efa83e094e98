use std::collections::HashMap;
use std::fmt::{self, Display};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

/// Identifies one send within a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SendId(pub(crate) u64);

impl Display for SendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "send:{}", self.0)
    }
}

struct LiveSend {
    send_id: SendId,
    token: CancellationToken,
}

#[derive(Default)]
struct Entry {
    live: Option<LiveSend>,
    last_begun: Option<SendId>,
    // Sequence number of the last applied sync.
    last_synced: u64,
}

#[derive(Default)]
struct Entries {
    by_conversation: HashMap<String, Entry>,
    next_sync: u64,
}

/// Marks when a sync with the server started, so that its result can be
/// rejected if the conversation moved on in the meantime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SyncTicket {
    last_begun: Option<SendId>,
    seq: u64,
}

/// Keeps at most one live send per conversation, and orders the syncs that
/// follow them.
#[derive(Default)]
pub(crate) struct SendRegistry {
    entries: Mutex<Entries>,
}

impl SendRegistry {
    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `send_id` as the live send of the conversation and returns
    /// its cancellation token. The previously live send, if any, is
    /// cancelled.
    pub fn begin_send(
        &self,
        conversation_id: &str,
        send_id: SendId,
    ) -> CancellationToken {
        let token = CancellationToken::new();
        let mut entries = self.entries();
        let entry = entries
            .by_conversation
            .entry(conversation_id.to_owned())
            .or_default();
        entry.last_begun = Some(send_id);
        let prev = entry.live.replace(LiveSend {
            send_id,
            token: token.clone(),
        });
        if let Some(prev) = prev {
            debug!("{send_id} supersedes {}", prev.send_id);
            prev.token.cancel();
        }
        token
    }

    #[inline]
    pub fn is_live(&self, conversation_id: &str, send_id: SendId) -> bool {
        self.live_send(conversation_id) == Some(send_id)
    }

    pub fn live_send(&self, conversation_id: &str) -> Option<SendId> {
        self.entries()
            .by_conversation
            .get(conversation_id)?
            .live
            .as_ref()
            .map(|live| live.send_id)
    }

    /// Cancels the live send of the conversation.
    ///
    /// The send stays registered until it finishes. Returns `false` if
    /// nothing was live.
    pub fn cancel(&self, conversation_id: &str) -> bool {
        let entries = self.entries();
        let Some(live) = entries
            .by_conversation
            .get(conversation_id)
            .and_then(|entry| entry.live.as_ref())
        else {
            return false;
        };
        live.token.cancel();
        true
    }

    /// Deregisters `send_id`, unless another send has replaced it.
    pub fn finish(&self, conversation_id: &str, send_id: SendId) -> bool {
        let mut entries = self.entries();
        let Some(entry) = entries.by_conversation.get_mut(conversation_id)
        else {
            return false;
        };
        if entry.live.as_ref().map(|live| live.send_id) != Some(send_id) {
            return false;
        }
        entry.live = None;
        true
    }

    /// Starts a sync of the conversation with the server.
    pub fn begin_sync(&self, conversation_id: &str) -> SyncTicket {
        let mut entries = self.entries();
        entries.next_sync += 1;
        let seq = entries.next_sync;
        let last_begun = entries
            .by_conversation
            .get(conversation_id)
            .and_then(|entry| entry.last_begun);
        SyncTicket { last_begun, seq }
    }

    /// Accepts the result of a sync, unless it is stale.
    ///
    /// A result is stale when a send is live, when a send began after the
    /// sync started, or when a later sync has been accepted already.
    pub fn commit_sync(
        &self,
        conversation_id: &str,
        ticket: SyncTicket,
    ) -> bool {
        let mut entries = self.entries();
        let entry = entries
            .by_conversation
            .entry(conversation_id.to_owned())
            .or_default();
        if let Some(live) = &entry.live {
            debug!("{} is live, dropping the fetched state", live.send_id);
            return false;
        }
        if entry.last_begun != ticket.last_begun {
            debug!("a send began during the sync, dropping its result");
            return false;
        }
        if entry.last_synced > ticket.seq {
            debug!("a later sync has been applied, dropping its result");
            return false;
        }
        entry.last_synced = ticket.seq;
        true
    }
}
