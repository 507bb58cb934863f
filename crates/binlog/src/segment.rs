use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::SEGMENT_SUFFIX_WIDTH;
use crate::error::SegmentError;

/// One open, writable binlog segment plus its size tracking.
///
/// `dir` is the writer's subdirectory (`${dataRoot}/${subdir}`); `index`
/// selects `binlog.NNNNNN` within it. Every operation here is fatal on
/// failure — the caller is expected to flip its `ProcessContext` token, the
/// same way the original sets `SF_G_CONTINUE_FLAG = false` before returning.
pub struct BinlogFile {
    dir: PathBuf,
    index: u32,
    file: Option<File>,
    size: u64,
}

impl BinlogFile {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, index: u32) -> Self {
        Self {
            dir: dir.into(),
            index,
            file: None,
            size: 0,
        }
    }

    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn set_index(&mut self, index: u32) {
        self.index = index;
    }

    fn segment_path(&self, index: u32) -> PathBuf {
        self.dir
            .join(format!("binlog.{:0width$}", index, width = SEGMENT_SUFFIX_WIDTH))
    }

    /// Closes the current fd (if any), opens `binlog.<index>` for append,
    /// and `lseek`s (via `metadata().len()`) to learn the current size.
    pub fn open_writable(&mut self) -> Result<(), SegmentError> {
        self.file.take();

        let path = self.segment_path(self.index);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .inspect_err(|e| {
                tracing::error!(path = %path.display(), error = %e, "open binlog segment failed, exiting");
            })?;
        let size = file
            .metadata()
            .inspect_err(|e| {
                tracing::error!(path = %path.display(), error = %e, "stat binlog segment failed, exiting");
            })?
            .len();

        self.file = Some(file);
        self.size = size;
        Ok(())
    }

    /// If `binlog.<index>` already exists, renames it to
    /// `binlog.<index>.<YYYYMMDDHHMMSS>` (local time) before opening fresh,
    /// protecting crash recovery from overwriting a partial tail.
    pub fn open_next(&mut self) -> Result<(), SegmentError> {
        let path = self.segment_path(self.index);
        if path.exists() {
            let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
            let backup = self.dir.join(format!(
                "{}.{}",
                path.file_name().unwrap().to_string_lossy(),
                stamp
            ));
            fs::rename(&path, &backup).inspect_err(|e| {
                tracing::error!(
                    path = %path.display(), backup = %backup.display(), error = %e,
                    "rename existing binlog segment to backup failed, exiting"
                );
            })?;
            tracing::warn!(path = %path.display(), backup = %backup.display(), "binlog file exists, renamed to backup");
        }

        self.open_writable()
    }

    /// One `write` followed by one `fsync`. Short writes cannot happen
    /// (`write_all` loops internally); both a write error and an fsync
    /// error are fatal.
    pub fn write(&mut self, buf: &[u8]) -> Result<(), SegmentError> {
        let file = self
            .file
            .as_mut()
            .expect("write() called before open_writable()/open_next()");

        file.write_all(buf).inspect_err(|e| {
            tracing::error!(error = %e, "write to binlog segment failed, exiting");
        })?;
        file.sync_all().inspect_err(|e| {
            tracing::error!(error = %e, "fsync binlog segment failed, exiting");
        })?;

        self.size += buf.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_writable_creates_segment_at_zero_size() {
        let dir = tempdir().unwrap();
        let mut seg = BinlogFile::new(dir.path(), 0);
        seg.open_writable().unwrap();
        assert_eq!(seg.size(), 0);
        assert!(dir.path().join("binlog.000000").exists());
    }

    #[test]
    fn write_appends_and_tracks_size() {
        let dir = tempdir().unwrap();
        let mut seg = BinlogFile::new(dir.path(), 0);
        seg.open_writable().unwrap();
        seg.write(b"hello").unwrap();
        seg.write(b" world").unwrap();
        assert_eq!(seg.size(), 11);
        assert_eq!(fs::read(dir.path().join("binlog.000000")).unwrap(), b"hello world");
    }

    #[test]
    fn open_next_backs_up_existing_segment_instead_of_truncating() {
        let dir = tempdir().unwrap();
        let mut seg = BinlogFile::new(dir.path(), 0);
        seg.open_writable().unwrap();
        seg.write(b"partial tail").unwrap();
        drop(seg);

        let mut seg = BinlogFile::new(dir.path(), 0);
        seg.open_next().unwrap();
        assert_eq!(seg.size(), 0);

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(entries.iter().any(|n| n.starts_with("binlog.000000.")));
        assert!(entries.contains(&"binlog.000000".to_string()));
    }

    #[test]
    fn segment_suffix_is_zero_padded_and_sortable() {
        let dir = tempdir().unwrap();
        let mut low = BinlogFile::new(dir.path(), 1);
        low.open_writable().unwrap();
        let mut high = BinlogFile::new(dir.path(), 42);
        high.open_writable().unwrap();

        let mut names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["binlog.000001".to_string(), "binlog.000042".to_string()]);
    }
}
