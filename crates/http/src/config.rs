use std::fmt::{self, Debug};

/// Builder for [`HttpConfig`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HttpConfigBuilder {
    base_url: String,
    token: Option<String>,
}

impl HttpConfigBuilder {
    /// Creates a builder for the server at `base_url`.
    ///
    /// Endpoints are resolved relative to it, so `https://host/api` leads to
    /// `https://host/api/conversations/{id}`.
    #[inline]
    pub fn with_base_url<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
        }
    }

    /// Sets the bearer token attached to every request.
    #[inline]
    pub fn with_token<S: Into<String>>(mut self, token: S) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> HttpConfig {
        HttpConfig {
            base_url: self.base_url.trim_end_matches('/').to_owned(),
            token: self.token,
        }
    }
}

impl Debug for HttpConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConfigBuilder")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Configuration for [`crate::HttpBackend`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HttpConfig {
    pub(crate) base_url: String,
    pub(crate) token: Option<String>,
}

impl HttpConfig {
    pub(crate) fn stream_url(&self, conversation_id: &str) -> String {
        format!(
            "{}/conversations/{conversation_id}/messages/stream",
            self.base_url
        )
    }

    pub(crate) fn conversation_url(&self, conversation_id: &str) -> String {
        format!("{}/conversations/{conversation_id}", self.base_url)
    }

    pub(crate) fn usage_url(&self, conversation_id: &str) -> String {
        format!("{}/conversations/{conversation_id}/usage", self.base_url)
    }
}

impl Debug for HttpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
