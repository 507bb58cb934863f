use std::fs;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::WriterConfig;
use crate::context::ProcessContext;
use crate::error::WriterError;
use crate::index::{IndexFile, IndexState};
use crate::ring::VersionRing;
use crate::segment::BinlogFile;

/// Lock-free, cross-thread-readable view of a writer's on-disk position.
///
/// Updated by the owning [`crate::thread::WriterThread`] after every write
/// or rotation; read by anything that wants `current_write_index` /
/// `current_write_position` without contending with the flusher.
#[derive(Default)]
pub struct WriterObservable {
    index: AtomicU32,
    size: AtomicU64,
}

impl WriterObservable {
    fn new(index: u32, size: u64) -> Self {
        Self {
            index: AtomicU32::new(index),
            size: AtomicU64::new(size),
        }
    }

    fn update(&self, index: u32, size: u64) {
        self.index.store(index, Ordering::Release);
        self.size.store(size, Ordering::Release);
    }

    /// The on-disk segment number currently being appended to.
    #[must_use]
    pub fn current_write_index(&self) -> u32 {
        self.index.load(Ordering::Acquire)
    }

    /// `{index, offset}` of the current write position.
    #[must_use]
    pub fn current_write_position(&self) -> (u32, u64) {
        (
            self.index.load(Ordering::Acquire),
            self.size.load(Ordering::Acquire),
        )
    }
}

/// One logical binlog stream: a [`BinlogFile`], an [`IndexFile`], an
/// internal scratch buffer, and (for version-ordered writers) a
/// [`VersionRing`].
///
/// Owned by exactly one [`crate::thread::WriterThread`] once it starts
/// serving traffic; the setup-time operations here (`init_normal`,
/// `init_by_version`, `set_binlog_index`) are meant to run before that
/// handoff.
pub struct WriterInfo {
    subdir_name: String,
    segment: BinlogFile,
    index_file: IndexFile,
    compress_index: u32,
    max_segment_size: u64,
    buffer: Vec<u8>,
    buffer_cap: usize,
    ring: Option<VersionRing>,
    shared: Arc<WriterObservable>,
}

impl WriterInfo {
    /// Creates the buffer, `mkdir -p`s the subdirectory, loads (or
    /// initializes) the index file, and opens the current segment for
    /// append.
    pub fn init_normal(ctx: &ProcessContext, config: &WriterConfig) -> Result<Self, WriterError> {
        let dir = ctx.data_root().join(&config.subdir_name);
        fs::create_dir_all(&dir).map_err(crate::error::SegmentError::from)?;

        let index_file = IndexFile::new(&dir);
        let state = index_file.load()?;

        let mut segment = BinlogFile::new(&dir, state.current_write);
        segment.open_writable()?;

        let shared = Arc::new(WriterObservable::new(segment.index(), segment.size()));

        Ok(Self {
            subdir_name: config.subdir_name.clone(),
            segment,
            index_file,
            compress_index: state.current_compress,
            max_segment_size: config.max_segment_size,
            buffer: Vec::with_capacity(config.buffer_size),
            buffer_cap: config.buffer_size,
            ring: None,
            shared,
        })
    }

    /// Allocates and zeroes the version ring, sets `next`, then delegates to
    /// [`WriterInfo::init_normal`].
    pub fn init_by_version(ctx: &ProcessContext, config: &WriterConfig) -> Result<Self, WriterError> {
        let (next_version, ring_size) = match (config.next_version, config.ring_size) {
            (Some(v), Some(s)) => (v, s),
            _ => {
                return Err(WriterError::MissingVersionConfig {
                    subdir: config.subdir_name.clone(),
                })
            }
        };

        let mut info = Self::init_normal(ctx, config)?;
        info.ring = Some(VersionRing::new(ring_size, next_version));
        Ok(info)
    }

    #[must_use]
    pub fn subdir_name(&self) -> &str {
        &self.subdir_name
    }

    #[must_use]
    pub fn shared(&self) -> Arc<WriterObservable> {
        Arc::clone(&self.shared)
    }

    pub(crate) fn ring_mut(&mut self) -> Option<&mut VersionRing> {
        self.ring.as_mut()
    }

    #[must_use]
    pub fn current_write_index(&self) -> u32 {
        self.segment.index()
    }

    #[must_use]
    pub fn current_write_position(&self) -> (u32, u64) {
        (self.segment.index(), self.segment.size())
    }

    /// Setup-time operation: if `index` differs from the current one,
    /// persists it and opens a fresh segment at that index.
    ///
    /// Refuses to lower the index (an unresolved ambiguity in the source
    /// this is grounded on — see `SPEC_FULL.md` §9): the target segment
    /// might already hold data and blindly reopening it for append would
    /// silently resume writing into the middle of old content.
    pub fn set_binlog_index(&mut self, index: u32) -> Result<(), WriterError> {
        let current = self.segment.index();
        if index < current {
            return Err(WriterError::IndexWouldDecrease {
                subdir: self.subdir_name.clone(),
                current,
                requested: index,
            });
        }
        if index != current {
            self.segment.set_index(index);
            self.index_file.store(IndexState {
                current_write: index,
                current_compress: self.compress_index,
            })?;
            self.segment.open_writable()?;
            self.shared.update(self.segment.index(), self.segment.size());
        }
        Ok(())
    }

    /// Buffering rules (§4.3), applied to one record at a time:
    ///
    /// - large record (`len >= capacity/4`): flush the buffer if non-empty,
    ///   then write the record directly (honouring rotation).
    /// - else flush first if appending would overflow the segment or the
    ///   buffer itself.
    /// - append to the buffer.
    pub(crate) fn deal_one_record(&mut self, bytes: &[u8]) -> Result<(), WriterError> {
        let len = bytes.len();

        if self.buffer_cap == 0 || len >= self.buffer_cap / 4 {
            if !self.buffer.is_empty() {
                self.flush()?;
            }
            return self.write_direct(bytes);
        }

        let used = self.buffer.len();
        if self.segment.size() + used as u64 + len as u64 > self.max_segment_size {
            self.flush()?;
        } else if self.buffer_cap - used < len {
            self.flush()?;
        }

        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Drains the internal buffer to disk with one `write` + `fsync`
    /// (`binlog_write_to_file`). No-op when the buffer is empty.
    pub(crate) fn flush(&mut self) -> Result<(), WriterError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let bytes = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.buffer_cap));
        self.write_direct(&bytes)
    }

    /// Rotation-aware direct write (`check_write_to_file`): rotates first if
    /// the record would push the current segment past `max_segment_size`.
    fn write_direct(&mut self, bytes: &[u8]) -> Result<(), WriterError> {
        let len = bytes.len() as u64;
        if self.segment.size() + len > self.max_segment_size {
            let next_index = self.segment.index() + 1;
            self.segment.set_index(next_index);
            self.index_file.store(IndexState {
                current_write: next_index,
                current_compress: self.compress_index,
            })?;
            self.segment.open_next()?;
        }

        self.segment.write(bytes)?;
        self.shared.update(self.segment.index(), self.segment.size());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WriterConfig;
    use tempfile::tempdir;

    #[test]
    fn init_normal_creates_subdir_and_fresh_index() {
        let dir = tempdir().unwrap();
        let ctx = ProcessContext::new(dir.path());
        let config = WriterConfig::arrival("orders", 4096, 1024);

        let writer = WriterInfo::init_normal(&ctx, &config).unwrap();
        assert_eq!(writer.current_write_index(), 0);
        assert!(dir.path().join("orders").join("binlog_index.dat").exists());
    }

    #[test]
    fn large_record_bypasses_buffer() {
        let dir = tempdir().unwrap();
        let ctx = ProcessContext::new(dir.path());
        let config = WriterConfig::arrival("orders", 16, 1024);
        let mut writer = WriterInfo::init_normal(&ctx, &config).unwrap();

        // buffer_cap/4 == 4; an 8-byte record must bypass straight to disk.
        writer.deal_one_record(b"12345678").unwrap();
        assert_eq!(writer.current_write_position().1, 8);
    }

    #[test]
    fn small_records_accumulate_until_flush() {
        let dir = tempdir().unwrap();
        let ctx = ProcessContext::new(dir.path());
        let config = WriterConfig::arrival("orders", 4096, 1024);
        let mut writer = WriterInfo::init_normal(&ctx, &config).unwrap();

        writer.deal_one_record(b"AA").unwrap();
        writer.deal_one_record(b"BB").unwrap();
        assert_eq!(writer.current_write_position().1, 0); // still buffered

        writer.flush().unwrap();
        assert_eq!(writer.current_write_position().1, 4);
    }

    #[test]
    fn set_binlog_index_refuses_decrease() {
        let dir = tempdir().unwrap();
        let ctx = ProcessContext::new(dir.path());
        let config = WriterConfig::arrival("orders", 4096, 1024);
        let mut writer = WriterInfo::init_normal(&ctx, &config).unwrap();

        writer.set_binlog_index(5).unwrap();
        assert_eq!(writer.current_write_index(), 5);

        let err = writer.set_binlog_index(2).unwrap_err();
        assert!(matches!(err, WriterError::IndexWouldDecrease { .. }));
    }

    #[test]
    fn init_by_version_without_config_fields_errors() {
        let dir = tempdir().unwrap();
        let ctx = ProcessContext::new(dir.path());
        let mut config = WriterConfig::arrival("orders", 4096, 1024);
        config.order_by = crate::config::OrderBy::Version;

        let err = WriterInfo::init_by_version(&ctx, &config).unwrap_err();
        assert!(matches!(err, WriterError::MissingVersionConfig { .. }));
    }
}
