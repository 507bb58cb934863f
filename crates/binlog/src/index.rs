use std::fs;
use std::path::{Path, PathBuf};

use crate::error::IndexError;

const INDEX_FILENAME: &str = "binlog_index.dat";
const KEY_CURRENT_WRITE: &str = "current_write";
const KEY_CURRENT_COMPRESS: &str = "current_compress";

/// The persistent recovery pointer for one writer subdirectory:
/// `{current_write, current_compress}`, stored as `key=int` lines in
/// `binlog_index.dat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexState {
    pub current_write: u32,
    pub current_compress: u32,
}

/// Load/store access to one subdirectory's `binlog_index.dat`.
pub struct IndexFile {
    path: PathBuf,
}

impl IndexFile {
    #[must_use]
    pub fn new(subdir: impl AsRef<Path>) -> Self {
        Self {
            path: subdir.as_ref().join(INDEX_FILENAME),
        }
    }

    /// Loads `(current_write, current_compress)`. A missing file is not an
    /// error: it means a fresh subdirectory, so `(0, 0)` is persisted and
    /// returned.
    pub fn load(&self) -> Result<IndexState, IndexError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let fresh = IndexState::default();
                self.store(fresh)?;
                Ok(fresh)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persists `state` atomically: write to a sibling temp file, then
    /// `rename` into place, so a crash never leaves a half-written index.
    pub fn store(&self, state: IndexState) -> Result<(), IndexError> {
        let tmp_path = self.path.with_extension("dat.tmp");
        let body = format!(
            "{KEY_CURRENT_WRITE}={}\n{KEY_CURRENT_COMPRESS}={}\n",
            state.current_write, state.current_compress
        );
        fs::write(&tmp_path, body)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn parse(text: &str) -> IndexState {
    let mut current_write = 0;
    let mut current_compress = 0;
    for line in text.lines() {
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().parse().unwrap_or(0);
            match key.trim() {
                KEY_CURRENT_WRITE => current_write = value,
                KEY_CURRENT_COMPRESS => current_compress = value,
                _ => {}
            }
        }
    }
    IndexState {
        current_write,
        current_compress,
    }
}
