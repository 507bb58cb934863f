use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Replaces the original's global `g_sf_binlog_data_path` and
/// `SF_G_CONTINUE_FLAG`: a small, explicitly-constructed value threaded
/// through every writer instead of process-wide mutable statics.
///
/// Cloning is cheap (an `Arc` bump) and every clone observes the same
/// cancellation token, so flipping it from one writer's fatal I/O path is
/// visible to every other writer and to the host process.
#[derive(Clone)]
pub struct ProcessContext {
    data_root: Arc<PathBuf>,
    running: Arc<AtomicBool>,
}

impl ProcessContext {
    /// Creates a context rooted at `data_root`, initially running.
    #[must_use]
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: Arc::new(data_root.into()),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// The directory under which every writer's subdirectory is created.
    #[must_use]
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Whether the process should keep accepting and flushing writes.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Flips the cancellation token. Called on the fatal I/O paths in
    /// [`crate::segment::BinlogFile`]; observed by
    /// [`crate::thread::WriterThread`]'s main loop and by [`ProcessContext::is_running`]
    /// callers elsewhere.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_is_running() {
        let ctx = ProcessContext::new("/tmp/does-not-matter");
        assert!(ctx.is_running());
    }

    #[test]
    fn request_stop_is_observed_by_clones() {
        let ctx = ProcessContext::new("/tmp/does-not-matter");
        let clone = ctx.clone();
        clone.request_stop();
        assert!(!ctx.is_running());
    }
}
