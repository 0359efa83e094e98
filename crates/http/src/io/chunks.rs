#[cfg(test)]
use std::collections::VecDeque;

use bytes::Bytes;
use reqwest::Response;

/// The body could not be read any further.
#[derive(Debug, PartialEq, Eq)]
pub struct Error(pub String);

/// An adapter over the byte chunks of a response body.
pub enum Chunks {
    Response(Response),
    #[cfg(test)]
    VecDeque(VecDeque<Result<Bytes, Error>>),
}

impl Chunks {
    #[inline]
    pub fn from_response(response: Response) -> Self {
        Chunks::Response(response)
    }

    #[cfg(test)]
    pub fn from_bytes<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = &'static [u8]>,
    {
        Chunks::VecDeque(
            chunks
                .into_iter()
                .map(|chunk| Ok(Bytes::from_static(chunk)))
                .collect(),
        )
    }

    #[cfg(test)]
    pub fn from_results(chunks: VecDeque<Result<Bytes, Error>>) -> Self {
        Chunks::VecDeque(chunks)
    }

    /// Reads the next chunk, `None` once the body is exhausted.
    #[inline]
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            Chunks::Response(response) => {
                response.chunk().await.map_err(|err| Error(err.to_string()))
            }
            #[cfg(test)]
            Chunks::VecDeque(chunks) => chunks.pop_front().transpose(),
        }
    }
}
