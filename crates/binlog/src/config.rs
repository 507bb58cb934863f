use serde::Deserialize;

/// Fixed width of the zero-padded decimal segment suffix (`binlog.NNNNNN`).
///
/// Chosen, as in the original, so that lexicographic and numeric segment
/// ordering agree.
pub const SEGMENT_SUFFIX_WIDTH: usize = 6;

/// Default maximum segment size before rotation: order of 1 GiB, matching
/// the original's build-time constant. Overridable per writer via
/// [`WriterConfig::max_segment_size`] so tests can exercise rotation without
/// writing gigabytes of filler.
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 1 << 30;

/// A writer's ordering discipline (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    /// FIFO across all producers; no reordering, no holes possible.
    Arrival,
    /// Strict monotone `version` order via a gap-filling [`crate::ring::VersionRing`].
    Version,
}

/// Per-writer configuration (§6 Configuration surface).
#[derive(Debug, Clone, Deserialize)]
pub struct WriterConfig {
    pub subdir_name: String,
    pub buffer_size: usize,
    pub max_record_size: usize,
    pub order_by: OrderBy,
    /// Required when `order_by == Version`; the first version the writer
    /// expects to see.
    pub next_version: Option<u64>,
    /// Required when `order_by == Version`; must exceed the expected
    /// maximum out-of-order gap (ring-size choice, §4.4).
    pub ring_size: Option<usize>,
    #[serde(default = "default_max_segment_size")]
    pub max_segment_size: u64,
}

fn default_max_segment_size() -> u64 {
    DEFAULT_MAX_SEGMENT_SIZE
}

impl WriterConfig {
    /// Convenience constructor for an arrival-ordered writer.
    #[must_use]
    pub fn arrival(subdir_name: impl Into<String>, buffer_size: usize, max_record_size: usize) -> Self {
        Self {
            subdir_name: subdir_name.into(),
            buffer_size,
            max_record_size,
            order_by: OrderBy::Arrival,
            next_version: None,
            ring_size: None,
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
        }
    }

    /// Convenience constructor for a version-ordered writer.
    #[must_use]
    pub fn version(
        subdir_name: impl Into<String>,
        buffer_size: usize,
        max_record_size: usize,
        next_version: u64,
        ring_size: usize,
    ) -> Self {
        Self {
            subdir_name: subdir_name.into(),
            buffer_size,
            max_record_size,
            order_by: OrderBy::Version,
            next_version: Some(next_version),
            ring_size: Some(ring_size),
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
        }
    }

    #[must_use]
    pub fn with_max_segment_size(mut self, max_segment_size: u64) -> Self {
        self.max_segment_size = max_segment_size;
        self
    }
}
