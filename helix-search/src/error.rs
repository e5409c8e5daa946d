use thiserror::Error;

/// Failure to turn request bytes into a query, header or batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The payload is not well-formed JSON. `message` is the tokenizer's own
    /// diagnostic, kept verbatim.
    #[error("failed to parse request body: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
        offset: usize,
    },

    #[error("unsupported query shape: {0}")]
    UnsupportedShape(String),

    #[error("invalid multi-search payload: {0}")]
    InvalidBatch(String),
}

impl ParseError {
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedShape(reason.into())
    }

    /// Wraps a serde_json error, deriving an approximate byte offset from its
    /// line/column position within `input`.
    pub fn from_json(err: &serde_json::Error, input: &[u8]) -> Self {
        let line = err.line();
        let column = err.column();
        Self::Syntax {
            message: err.to_string(),
            line,
            column,
            offset: byte_offset(input, line, column),
        }
    }
}

fn byte_offset(input: &[u8], line: usize, column: usize) -> usize {
    if line <= 1 {
        return column.saturating_sub(1).min(input.len());
    }
    let line_start = input
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'\n')
        .nth(line - 2)
        .map_or(input.len(), |(i, _)| i + 1);
    (line_start + column.saturating_sub(1)).min(input.len())
}

/// Coarse classification used for status mapping and client messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    AlreadyExists,
    NotFound,
    Parse,
    Cancelled,
    Timeout,
    Io,
    Internal,
}

#[derive(Error, Debug)]
pub enum HelixSearchError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("index [{0}] already exists")]
    IndexExists(String),

    #[error("index [{0}] does not exists")]
    IndexNotFound(String),

    #[error("document [{id}] does not exists in index [{index}]")]
    DocumentNotFound { index: String, id: String },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("search request was cancelled")]
    Cancelled,

    #[error("search request timed out after {0}ms")]
    Timeout(u64),

    #[error("shard {shard} of index [{index}] is closed")]
    ShardClosed { index: String, shard: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage engine error: {0}")]
    Engine(#[from] tantivy::TantivyError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HelixSearchError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::Validation,
            Self::IndexExists(_) => ErrorKind::AlreadyExists,
            Self::IndexNotFound(_) | Self::DocumentNotFound { .. } => ErrorKind::NotFound,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Io(_) | Self::Serialization(_) | Self::Engine(_) => ErrorKind::Io,
            Self::ShardClosed { .. } | Self::Config(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub const fn status_code(&self) -> u16 {
        match self {
            Self::DocumentNotFound { .. } => 404,
            Self::Timeout(_) => 408,
            _ => match self.kind() {
                ErrorKind::Io | ErrorKind::Internal => 500,
                _ => 400,
            },
        }
    }

    pub const fn is_client_error(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Io | ErrorKind::Internal)
    }

    /// Text that is safe to hand to a client. Storage and internal failures
    /// are reduced to a generic message; callers log the detail.
    pub fn client_message(&self) -> String {
        if self.is_client_error() {
            self.to_string()
        } else {
            "internal server error".to_string()
        }
    }
}

pub type Result<T> = std::result::Result<T, HelixSearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_matches_client_contract() {
        let err = HelixSearchError::IndexNotFound("books".to_string());
        assert!(err.to_string().contains("does not exists"));
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_io_detail_is_not_leaked() {
        let err = HelixSearchError::Io(std::io::Error::other("disk /var/lib/x is full"));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.client_message(), "internal server error");
    }

    #[test]
    fn test_timeout_is_distinct_client_error() {
        let err = HelixSearchError::Timeout(250);
        assert!(err.is_client_error());
        assert_eq!(err.status_code(), 408);
        assert_ne!(err.kind(), HelixSearchError::Cancelled.kind());
    }

    #[test]
    fn test_syntax_error_keeps_native_text() {
        let input = br#"{"query":{"match_all":{x}},"size":10}"#;
        let json_err = serde_json::from_slice::<serde_json::Value>(input).unwrap_err();
        let native = json_err.to_string();
        let err = ParseError::from_json(&json_err, input);
        assert!(err.to_string().contains(&native));
        match err {
            ParseError::Syntax { line, offset, .. } => {
                assert_eq!(line, 1);
                assert!(offset < input.len());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_byte_offset_on_later_line() {
        let input = b"{}\n{\"a\":}";
        assert_eq!(byte_offset(input, 2, 6), 8);
        assert_eq!(byte_offset(input, 1, 1), 0);
    }
}
