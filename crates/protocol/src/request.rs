use serde::{Deserialize, Serialize};

use crate::Message;

/// The payload of a "send message" request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    /// The user input.
    pub content: String,
    /// Overrides the conversation's model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Overrides the sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Overrides the nucleus sampling threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Caps the number of generated tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl SendRequest {
    /// Creates a request with the given content and no overrides.
    #[inline]
    pub fn new<S: Into<String>>(content: S) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Sets the model.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the temperature.
    #[inline]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the nucleus sampling threshold.
    #[inline]
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Sets the completion token limit.
    #[inline]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Generation settings stored with a conversation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSettings {
    /// The model used for the conversation.
    #[serde(default)]
    pub model: Option<String>,
    /// The sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// The nucleus sampling threshold.
    #[serde(default)]
    pub top_p: Option<f32>,
    /// The completion token limit.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// The authoritative state of a conversation, as stored by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    /// The conversation identifier.
    pub id: String,
    /// The conversation title, if one has been set.
    #[serde(default)]
    pub title: Option<String>,
    /// All messages, in order.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Generation settings.
    #[serde(default)]
    pub settings: Option<ConversationSettings>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_payload() {
        let req = SendRequest::new("2+2?")
            .with_model("small")
            .with_top_p(0.5)
            .with_max_tokens(16);
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "content": "2+2?",
                "model": "small",
                "topP": 0.5,
                "maxTokens": 16
            })
        );

        let req = SendRequest::new("hi");
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({ "content": "hi" })
        );
    }

    #[test]
    fn test_conversation_detail() {
        let detail: ConversationDetail = serde_json::from_value(json!({
            "id": "c1",
            "messages": [
                {
                    "id": "m1",
                    "role": "user",
                    "content": "2+2?",
                    "createdAt": "2024-05-01T10:00:00Z"
                },
                {
                    "id": "m2",
                    "role": "assistant",
                    "content": "4",
                    "createdAt": "2024-05-01T10:00:01Z"
                }
            ],
            "settings": { "model": "small", "temperature": 0.25 }
        }))
        .unwrap();
        assert_eq!(detail.messages.len(), 2);
        assert_eq!(detail.title, None);
        let settings = detail.settings.unwrap();
        assert_eq!(settings.model.as_deref(), Some("small"));
        assert_eq!(settings.max_tokens, None);
    }
}
