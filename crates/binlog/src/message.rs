/// What kind of record a [`WriterMessage`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// An ordinary record to be appended to the stream.
    Normal,
    /// A control message: re-synchronize a version-ordered writer's `next`
    /// cursor (`sf_binlog_writer_change_next_version`).
    SetNextVersion,
}

/// A variable-length record buffer submitted to a [`crate::thread::WriterThread`].
///
/// The original pools these from a slab and links them with an intrusive
/// `next` pointer; here the queue (`wqueue::Queue<WriterMessage>`) owns a
/// plain `Vec<WriterMessage>` per batch instead, so there is no `next`
/// field and no separate free step — the value is simply dropped once
/// folded into the on-disk byte stream.
#[derive(Debug, Clone)]
pub struct WriterMessage {
    pub bytes: Vec<u8>,
    /// Only meaningful when the owning writer is version-ordered.
    pub version: u64,
    pub kind: RecordKind,
    /// Which of a `WriterThread`'s registered writers this message targets.
    pub writer_id: usize,
}

impl WriterMessage {
    #[must_use]
    pub fn normal(writer_id: usize, bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            version: 0,
            kind: RecordKind::Normal,
            writer_id,
        }
    }

    #[must_use]
    pub fn versioned(writer_id: usize, version: u64, bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            version,
            kind: RecordKind::Normal,
            writer_id,
        }
    }

    #[must_use]
    pub fn set_next_version(writer_id: usize, next_version: u64) -> Self {
        Self {
            bytes: Vec::new(),
            version: next_version,
            kind: RecordKind::SetNextVersion,
            writer_id,
        }
    }
}
