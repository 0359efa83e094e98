//! A chat backend speaking the streaming protocol over HTTP.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use chatline_protocol::{
    BackendError, ChatBackend, ConversationDetail, ErrorKind, SendRequest,
    UsageSummary,
};
use mime::Mime;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use serde::de::DeserializeOwned;

pub use config::{HttpConfig, HttpConfigBuilder};
use io::{Chunks, FrameReader};
pub use response::HttpEventStream;

/// Error type for [`HttpBackend`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    fn transport(err: reqwest::Error) -> Self {
        Self::new(err.to_string(), ErrorKind::Transport)
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl BackendError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// A backend that talks to the chat server over HTTP.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    config: Arc<HttpConfig>,
}

impl HttpBackend {
    /// Creates a new `HttpBackend` with the given configuration.
    #[inline]
    pub fn new(config: HttpConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    /// Creates a new `HttpBackend` that shares an existing client.
    #[inline]
    pub fn with_client(client: Client, config: HttpConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn fetch_json<T>(
        &self,
        url: String,
    ) -> impl Future<Output = Result<T, Error>> + Send + 'static
    where
        T: DeserializeOwned + Send + 'static,
    {
        let resp_fut = self
            .authorized(self.client.get(&url))
            .header(header::ACCEPT, "application/json")
            .send();

        async move {
            let resp = resp_fut.await.map_err(Error::transport)?;
            if !resp.status().is_success() {
                return Err(status_error(resp).await);
            }
            let body = resp.bytes().await.map_err(Error::transport)?;
            serde_json::from_slice(&body).map_err(|err| {
                Error::new(format!("{url}: {err}"), ErrorKind::Decode)
            })
        }
    }
}

impl ChatBackend for HttpBackend {
    type Error = Error;
    type Stream = HttpEventStream;

    fn open_stream(
        &self,
        conversation_id: &str,
        req: &SendRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        let url = self.config.stream_url(conversation_id);
        let resp_fut = self
            .authorized(self.client.post(url))
            .header(header::ACCEPT, "text/event-stream")
            .json(req)
            .send();

        async move {
            let resp = resp_fut.await.map_err(Error::transport)?;
            let status = resp.status();
            if !status.is_success() {
                return Err(status_error(resp).await);
            }
            if resp.content_length() == Some(0) {
                return Err(Error::new(
                    format!("{}: response has no body", status_line(status)),
                    ErrorKind::Transport,
                ));
            }

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_event_stream = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| m.subtype().as_str() == "event-stream")
                .unwrap_or(false);
            if !is_event_stream {
                // Some proxies rewrite the header, the body is still usable.
                warn!("unexpected content type: {content_type:?}");
            }

            // Here we got a successful response.
            let reader = FrameReader::new(Chunks::from_response(resp));
            Ok(HttpEventStream::from_reader(reader))
        }
    }

    fn fetch_conversation(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<ConversationDetail, Self::Error>>
    + Send
    + 'static {
        self.fetch_json(self.config.conversation_url(conversation_id))
    }

    fn fetch_usage(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<UsageSummary, Self::Error>> + Send + 'static
    {
        self.fetch_json(self.config.usage_url(conversation_id))
    }
}

fn status_line(status: StatusCode) -> String {
    format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown Status")
    )
}

async fn status_error(resp: Response) -> Error {
    let status = resp.status();
    let detail = resp
        .text()
        .await
        .ok()
        .and_then(|body| proto::error_detail(&body));
    let message = match detail {
        Some(detail) => format!("{}: {detail}", status_line(status)),
        None => status_line(status),
    };
    Error::new(message, ErrorKind::from_status(status.as_u16()))
}
