/// The kind of error that occurred while talking to a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The credential was missing, expired or rejected.
    Unauthorized,
    /// The conversation does not exist.
    NotFound,
    /// The backend is rate limited.
    RateLimited,
    /// The request failed or the response could not be read.
    Transport,
    /// The response body could not be decoded.
    Decode,
    /// Any other errors.
    Other,
}

impl ErrorKind {
    /// Maps an HTTP status code to the closest error kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ErrorKind::Unauthorized,
            404 => ErrorKind::NotFound,
            429 => ErrorKind::RateLimited,
            _ => ErrorKind::Transport,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert_eq!(ErrorKind::from_status(401), ErrorKind::Unauthorized);
        assert_eq!(ErrorKind::from_status(403), ErrorKind::Unauthorized);
        assert_eq!(ErrorKind::from_status(404), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_status(429), ErrorKind::RateLimited);
        assert_eq!(ErrorKind::from_status(502), ErrorKind::Transport);
    }
}
