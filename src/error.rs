// src/error.rs
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StripeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("stripe {stripe}: {source}")]
    OnStripe {
        stripe: usize,
        #[source]
        source: Box<StripeError>,
    },

    #[error("Malformed block header: {0}")]
    MalformedHeader(String),

    #[error("Segment too large: {byte_count} bytes (max: {max})")]
    SegmentTooLarge { byte_count: u64, max: u64 },

    #[error("Connection closed in the middle of a segment")]
    UnexpectedEof,

    #[error("Segment offset {offset} is behind the expected offset {expected}")]
    OffsetRegression { offset: u64, expected: u64 },

    #[error("Received more end-of-data markers than stripes ({stripes})")]
    UnexpectedEndOfData { stripes: usize },

    #[error("{open} stripe(s) ended without an end-of-data marker")]
    StripesExhausted { open: usize },

    #[error("All stripes finished but no segment covers offset {expected}")]
    MissingSegment { expected: u64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transfer aborted after an earlier stripe failure")]
    TransferAborted,

    #[error("Stripe worker panicked")]
    WorkerPanicked,

    #[error("Operation timed out")]
    Timeout,

    #[error("Socket closed")]
    Closed,
}

impl StripeError {
    /// Attach the index of the stripe the error was observed on.
    pub fn on_stripe(self, stripe: usize) -> Self {
        StripeError::OnStripe {
            stripe,
            source: Box::new(self),
        }
    }

    /// The closest `io::ErrorKind` for this error.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            StripeError::Io(e) => e.kind(),
            StripeError::OnStripe { source, .. } => source.kind(),
            StripeError::UnexpectedEof
            | StripeError::StripesExhausted { .. }
            | StripeError::MissingSegment { .. } => io::ErrorKind::UnexpectedEof,
            StripeError::MalformedHeader(_)
            | StripeError::SegmentTooLarge { .. }
            | StripeError::OffsetRegression { .. }
            | StripeError::UnexpectedEndOfData { .. } => io::ErrorKind::InvalidData,
            StripeError::InvalidConfig(_) => io::ErrorKind::InvalidInput,
            StripeError::Timeout => io::ErrorKind::TimedOut,
            StripeError::Closed => io::ErrorKind::NotConnected,
            StripeError::TransferAborted | StripeError::WorkerPanicked => io::ErrorKind::Other,
        }
    }
}

impl From<StripeError> for io::Error {
    fn from(err: StripeError) -> Self {
        match err {
            StripeError::Io(e) => e,
            other => io::Error::new(other.kind(), other),
        }
    }
}

pub type Result<T> = std::result::Result<T, StripeError>;
