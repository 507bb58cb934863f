use thiserror::Error;

/// Errors from [`crate::index::IndexFile`].
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("io error on binlog index file: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from [`crate::segment::BinlogFile`].
///
/// Every variant here is fatal to the owning writer: the caller is expected
/// to flip its [`crate::context::ProcessContext`] cancellation token after
/// seeing one, matching the original's `SF_G_CONTINUE_FLAG = false` sites.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("io error on binlog segment: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error type for [`crate::writer::WriterInfo`] and
/// [`crate::thread::WriterThread`].
#[derive(Debug, Error)]
pub enum WriterError {
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Segment(#[from] SegmentError),
    #[error(
        "refusing to move binlog index backwards for {subdir}: current {current}, requested {requested}"
    )]
    IndexWouldDecrease {
        subdir: String,
        current: u32,
        requested: u32,
    },
    #[error("version-ordered writer for {subdir} is missing next_version/ring_size in its config")]
    MissingVersionConfig { subdir: String },
    #[error("writer {subdir} order_by does not match its WriterThread's order_by")]
    OrderByMismatch { subdir: String },
}
