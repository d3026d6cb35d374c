//! Error taxonomy shared by the source adapters and the presentation sync

/// Failure while fetching data from one of the backends
#[derive(Debug)]
pub enum SourceError {
    /// Could not reach the backend (refused, unroutable, connect timeout)
    Connect(String),
    /// Connected, but the backend did not answer in time
    ReadTimeout(String),
    /// Connected, then the stream failed mid-read
    Read(String),
    /// The payload arrived but could not be decoded
    Decode(String),
    /// Valid response without any data in it
    Empty(String),
}

impl SourceError {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Connect(_) => "connect",
            SourceError::ReadTimeout(_) => "read_timeout",
            SourceError::Read(_) => "read",
            SourceError::Decode(_) => "decode",
            SourceError::Empty(_) => "empty",
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Decode(err.to_string())
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Connect(msg) => write!(f, "Connection failed: {}", msg),
            SourceError::ReadTimeout(msg) => write!(f, "Read timed out: {}", msg),
            SourceError::Read(msg) => write!(f, "Read failed: {}", msg),
            SourceError::Decode(msg) => write!(f, "Malformed payload: {}", msg),
            SourceError::Empty(what) => write!(f, "No data: {}", what),
        }
    }
}

impl std::error::Error for SourceError {}

/// Failure while talking to the output channel
#[derive(Debug)]
pub enum SyncError {
    /// The item behind a cached handle no longer exists
    Conflict(String),
    /// Transport or API failure from the channel collaborator
    Channel(String),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Conflict(id) => write!(f, "Output item vanished: {}", id),
            SyncError::Channel(msg) => write!(f, "Channel error: {}", msg),
        }
    }
}

impl std::error::Error for SyncError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_from_json() {
        let err = serde_json::from_str::<Vec<u32>>("{not json").unwrap_err();
        let source: SourceError = err.into();
        assert_eq!(source.kind(), "decode");
        assert!(source.to_string().starts_with("Malformed payload"));
    }
}
