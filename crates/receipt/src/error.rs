use thiserror::Error;

/// Errors surfaced by [`crate::channel::ReceiptChannel`].
#[derive(Debug, Error)]
pub enum ReceiptError {
    #[error("response body length {actual} != expected {expected}")]
    InvalidBodyLength { expected: usize, actual: usize },

    #[error("server returned status {status} for cmd {cmd}: {message}")]
    ServerStatus { cmd: u8, status: u16, message: String },

    #[error("unexpected response cmd {0}")]
    UnexpectedCommand(u8),

    #[error("timed out waiting for a response with receipts still in flight")]
    TimedOut,

    #[error("io error on receipt connection: {0}")]
    Io(#[from] std::io::Error),
}
