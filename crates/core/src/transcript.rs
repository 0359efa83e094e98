//! The conversation transcript as the client renders it.

use chatline_protocol::{
    ConversationDetail, ConversationSettings, Message, Role, Usage,
    UsageSummary,
};

/// The local view of one conversation.
///
/// Messages are append-only, except for the in-flight assistant message of
/// a running send. That one is always the last message, grows in place as
/// tokens arrive, and is either replaced by the final message or dropped.
/// Reconciliation replaces the whole transcript with the server's copy.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationTranscript {
    conversation_id: String,
    title: Option<String>,
    messages: Vec<Message>,
    usage: UsageSummary,
    settings: Option<ConversationSettings>,
    streaming: bool,
    // Index of the in-flight assistant message.
    pending_idx: Option<usize>,
}

impl ConversationTranscript {
    pub(crate) fn new(conversation_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_owned(),
            ..Default::default()
        }
    }

    /// Returns the conversation identifier.
    #[inline]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Returns the title, once the server has reported one.
    #[inline]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Returns the messages, in order.
    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the aggregate token usage.
    #[inline]
    pub fn usage(&self) -> &UsageSummary {
        &self.usage
    }

    /// Returns the generation settings, once the server has reported them.
    #[inline]
    pub fn settings(&self) -> Option<&ConversationSettings> {
        self.settings.as_ref()
    }

    /// Returns `true` while an assistant message is being generated.
    #[inline]
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Returns the content of the in-flight assistant message.
    pub fn streaming_content(&self) -> Option<&str> {
        let idx = self.pending_idx?;
        self.messages.get(idx).map(|msg| msg.content.as_str())
    }

    pub(crate) fn append_message(&mut self, msg: Message) {
        debug_assert!(
            self.pending_idx.is_none(),
            "appending behind an in-flight message"
        );
        self.messages.push(msg);
    }

    /// Appends an empty provisional assistant message to stream into.
    pub(crate) fn begin_streaming(&mut self) {
        self.clear_streaming_buffer();
        self.messages.push(Message::provisional(Role::Assistant, ""));
        self.pending_idx = Some(self.messages.len() - 1);
        self.streaming = true;
    }

    pub(crate) fn append_token(&mut self, token: &str) -> bool {
        let Some(msg) = self.pending_idx.and_then(|i| self.messages.get_mut(i))
        else {
            return false;
        };
        msg.content.push_str(token);
        true
    }

    /// Replaces the in-flight assistant message with `msg`.
    ///
    /// If nothing is in flight, `msg` is appended instead.
    pub(crate) fn replace_provisional_with(&mut self, msg: Message) {
        match self.pending_idx.take() {
            Some(idx) => self.messages[idx] = msg,
            None => self.messages.push(msg),
        }
        self.streaming = false;
    }

    /// Drops the in-flight assistant message, if any, and stops streaming.
    pub(crate) fn clear_streaming_buffer(&mut self) -> bool {
        let was_streaming = std::mem::take(&mut self.streaming);
        match self.pending_idx.take() {
            Some(idx) => {
                self.messages.remove(idx);
                true
            }
            None => was_streaming,
        }
    }

    /// Stops streaming but keeps what has been received so far.
    pub(crate) fn stop_streaming(&mut self) -> bool {
        std::mem::take(&mut self.streaming)
    }

    pub(crate) fn add_usage(&mut self, usage: &Usage) {
        self.usage.add(usage);
    }

    pub(crate) fn replace_with_detail(&mut self, detail: ConversationDetail) {
        self.title = detail.title;
        self.messages = detail.messages;
        self.settings = detail.settings;
        self.pending_idx = None;
        self.streaming = false;
    }

    pub(crate) fn replace_usage(&mut self, usage: UsageSummary) {
        self.usage = usage;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(content: &str) -> Message {
        Message::provisional(Role::User, content)
    }

    #[test]
    fn test_streaming_lifecycle() {
        let mut transcript = ConversationTranscript::new("c1");
        transcript.append_message(user("2+2?"));
        assert_eq!(transcript.streaming_content(), None);
        assert!(!transcript.append_token("x"));

        transcript.begin_streaming();
        assert!(transcript.is_streaming());
        assert_eq!(transcript.streaming_content(), Some(""));
        assert!(transcript.append_token("fo"));
        assert!(transcript.append_token("ur"));
        assert_eq!(transcript.streaming_content(), Some("four"));

        transcript.replace_provisional_with(Message::provisional(
            Role::Assistant,
            "4",
        ));
        assert!(!transcript.is_streaming());
        assert_eq!(transcript.streaming_content(), None);
        let contents: Vec<_> = transcript
            .messages()
            .iter()
            .map(|msg| msg.content.as_str())
            .collect();
        assert_eq!(contents, vec!["2+2?", "4"]);
    }

    #[test]
    fn test_clear_streaming_buffer() {
        let mut transcript = ConversationTranscript::new("c1");
        transcript.append_message(user("hi"));
        assert!(!transcript.clear_streaming_buffer());

        transcript.begin_streaming();
        transcript.append_token("partial");
        assert!(transcript.clear_streaming_buffer());
        assert!(!transcript.is_streaming());
        assert_eq!(transcript.messages().len(), 1);
        assert_eq!(transcript.messages()[0].content, "hi");
    }

    #[test]
    fn test_stop_streaming_keeps_content() {
        let mut transcript = ConversationTranscript::new("c1");
        transcript.append_message(user("hi"));
        transcript.begin_streaming();
        transcript.append_token("par");
        assert!(transcript.stop_streaming());
        assert!(!transcript.stop_streaming());
        assert_eq!(transcript.streaming_content(), Some("par"));

        // The leftover goes away before the next input lands.
        transcript.clear_streaming_buffer();
        transcript.append_message(user("again"));
        assert_eq!(transcript.messages().len(), 2);
    }

    #[test]
    fn test_replace_with_detail() {
        let mut transcript = ConversationTranscript::new("c1");
        transcript.append_message(user("hi"));
        transcript.begin_streaming();
        transcript.add_usage(&Usage {
            prompt_tokens: 1,
            completion_tokens: 1,
            total_tokens: 2,
        });

        let mut confirmed = user("hi");
        confirmed.id = "m1".to_owned();
        confirmed.provisional = false;
        transcript.replace_with_detail(ConversationDetail {
            id: "c1".to_owned(),
            title: Some("Greeting".to_owned()),
            messages: vec![confirmed],
            settings: Some(ConversationSettings::default()),
        });
        transcript.replace_usage(UsageSummary {
            prompt_tokens: 3,
            completion_tokens: 0,
            total_tokens: 3,
        });

        assert!(!transcript.is_streaming());
        assert_eq!(transcript.title(), Some("Greeting"));
        assert_eq!(transcript.messages().len(), 1);
        assert_eq!(transcript.messages()[0].id, "m1");
        assert_eq!(transcript.usage().total_tokens, 3);
        assert!(transcript.settings().is_some());
    }
}
