use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// The author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A message typed by the user.
    User,
    /// A message generated by the model.
    Assistant,
    /// A message inserted by the server itself.
    System,
}

impl Role {
    /// Parses a role name, ignoring ASCII case.
    pub fn parse(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("user") {
            Some(Role::User)
        } else if name.eq_ignore_ascii_case("assistant") {
            Some(Role::Assistant)
        } else if name.eq_ignore_ascii_case("system") {
            Some(Role::System)
        } else {
            None
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        f.write_str(name)
    }
}

// Servers disagree on casing (`assistant` vs `ASSISTANT`), accept both.
impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Role::parse(&name).ok_or_else(|| {
            serde::de::Error::unknown_variant(
                &name,
                &["user", "assistant", "system"],
            )
        })
    }
}

/// A message in a conversation transcript.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// The message identifier.
    ///
    /// Server-assigned for authoritative messages, a random UUID for
    /// provisional ones.
    pub id: String,
    /// The author of the message.
    pub role: Role,
    /// The text content.
    pub content: String,
    /// When the message was created.
    pub created_at: DateTime<Utc>,
    /// Whether the message was authored locally and not yet confirmed by
    /// the server.
    #[serde(default, skip_serializing_if = "is_false")]
    pub provisional: bool,
}

impl Message {
    /// Creates a provisional message stamped with the current time.
    pub fn provisional<S: Into<String>>(role: Role, content: S) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            provisional: true,
        }
    }
}

#[inline]
fn is_false(value: &bool) -> bool {
    !*value
}

/// Token counts reported for one generation run.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Tokens consumed by the prompt.
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Tokens generated for the completion.
    #[serde(default)]
    pub completion_tokens: u64,
    /// Sum of the above, as reported by the server.
    #[serde(default)]
    pub total_tokens: u64,
}

/// Aggregate token counts for a whole conversation.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    /// Tokens consumed by prompts.
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Tokens generated for completions.
    #[serde(default)]
    pub completion_tokens: u64,
    /// All tokens.
    #[serde(default)]
    pub total_tokens: u64,
}

impl UsageSummary {
    /// Adds the usage of one run to the summary.
    pub fn add(&mut self, usage: &Usage) {
        self.prompt_tokens =
            self.prompt_tokens.saturating_add(usage.prompt_tokens);
        self.completion_tokens =
            self.completion_tokens.saturating_add(usage.completion_tokens);
        self.total_tokens =
            self.total_tokens.saturating_add(usage.total_tokens);
    }
}
