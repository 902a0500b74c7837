//! Codec Error Types

use thiserror::Error;

/// Errors from WAVE parsing and sample format conversion
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Malformed RIFF/WAVE container: {0}")]
    MalformedContainer(String),

    #[error("Truncated {context}: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        context: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Sample format not supported: {0}")]
    NotSupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CodecError::MalformedContainer("missing WAVE id".into());
        assert!(err.to_string().contains("WAVE"));

        let err = CodecError::Truncated {
            context: "chunk header",
            offset: 40,
            needed: 8,
            available: 3,
        };
        let message = err.to_string();
        assert!(message.contains("chunk header"));
        assert!(message.contains("40"));
    }

    #[test]
    fn test_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "alarm.wav");
        let err: CodecError = io.into();
        assert!(matches!(err, CodecError::Io(_)));
    }
}
