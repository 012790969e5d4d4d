//! Error types
//!
//! Decode errors are local: the caller degrades the affected block to silence
//! and keeps going. Every other variant is fatal for the current run, since the
//! engine's internal state cannot be rewound once frames have been pulled.

use thiserror::Error;

/// Errors from the sample decoder
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Bit depth the decoder has no conversion for
    #[error("Unsupported sample encoding: {0}-bit")]
    UnsupportedEncoding(u16),

    /// Raw byte length is not a whole number of samples
    #[error("Raw buffer of {len} bytes is not a multiple of the {width}-byte sample width")]
    Misaligned { len: usize, width: usize },

    /// Destination cannot hold the decoded samples
    #[error("Destination holds {available} samples, {required} required")]
    DestinationTooSmall { required: usize, available: usize },
}

/// Errors that can occur while supplying frames or driving the engine
#[derive(Error, Debug)]
pub enum Error {
    /// Engine could not be created for this channel count / sample rate
    #[error("Engine configuration rejected: {0}")]
    Configuration(String),

    /// Raw samples could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Backing store read or write failed
    #[error("I/O error while {stage} at frame {offset}: {source}")]
    Io {
        stage: &'static str,
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// One constituent of a multiplexed source failed
    #[error("Multiplexed source #{index} failed: {source}")]
    AggregateSource {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    /// Region definition is unusable
    #[error("Invalid region #{index}: {reason}")]
    InvalidRegion { index: usize, reason: String },

    /// Audio file is malformed or uses an unsupported layout
    #[error("Invalid audio file: {0}")]
    Format(String),

    /// WAV writer error
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

impl Error {
    /// Build an I/O error tagged with the failing stage and frame offset
    pub fn io(stage: &'static str, offset: u64, source: std::io::Error) -> Self {
        Error::Io {
            stage,
            offset,
            source,
        }
    }

    /// Whether the error must abort the current run
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Decode(_))
    }
}

/// Result type for frame supply and orchestration
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_names_stage_and_offset() {
        let err = Error::io(
            "reading wav data",
            4096,
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read"),
        );
        let message = err.to_string();
        assert!(message.contains("reading wav data"));
        assert!(message.contains("4096"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_decode_error_is_recoverable() {
        let err: Error = DecodeError::UnsupportedEncoding(12).into();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_aggregate_wraps_constituent() {
        let inner = Error::Format("truncated".into());
        let err = Error::AggregateSource {
            index: 2,
            source: Box::new(inner),
        };
        assert!(err.to_string().contains("#2"));
    }
}
