use crate::message::WriterMessage;

/// Outcome of [`VersionRing::admit`].
pub enum Admit {
    /// `msg.version` is too far ahead of the window; the caller must repush
    /// it into the producer queue (version-sorted) and retry once `next`
    /// advances.
    Repush(WriterMessage),
    /// One or more messages are now ready to be written to disk, in
    /// ascending version order. `next` has already been advanced past all
    /// of them.
    Ready(Vec<WriterMessage>),
    /// `msg` was stored in the window for later; nothing to write yet.
    Stored,
}

/// Sparse circular window, keyed by `version mod size`, that reorders
/// out-of-order arrivals into the strict monotone sequence a version-ordered
/// writer requires.
///
/// `start` is the slot for `next` (the next version expected on disk);
/// `end` is one past the furthest slot currently occupied (exclusive).
/// Both are tracked as indices into `slots` rather than raw pointers.
pub struct VersionRing {
    slots: Vec<Option<WriterMessage>>,
    size: usize,
    start: usize,
    end: usize,
    count: usize,
    max_count: usize,
    next: u64,
}

impl VersionRing {
    /// `size` must exceed the expected maximum gap between the
    /// smallest un-acknowledged version and the largest submitted one;
    /// callers exceeding it see repush storms, never data loss.
    #[must_use]
    pub fn new(size: usize, next: u64) -> Self {
        assert!(size >= 2, "version ring size must be at least 2");
        let start = (next % size as u64) as usize;
        Self {
            slots: (0..size).map(|_| None).collect(),
            size,
            start,
            end: start,
            count: 0,
            max_count: 0,
            next,
        }
    }

    #[must_use]
    pub fn next(&self) -> u64 {
        self.next
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn max_count(&self) -> usize {
        self.max_count
    }

    fn slot_index(&self, version: u64) -> usize {
        (version % self.size as u64) as usize
    }

    /// Re-synchronizes `next` and resets the window to empty at the new
    /// position. Returns `true` if the window held anything at the moment
    /// of reset — the caller should log a warning (`SET_NEXT_VERSION` on a
    /// non-empty ring suggests a bug upstream), matching the original.
    ///
    /// Stale slot contents beyond `[start, end)` are left untouched, as in
    /// the original: they are silently overwritten the next time a version
    /// happens to land on that slot.
    pub fn set_next_version(&mut self, next: u64) -> bool {
        let was_nonempty = !self.is_empty();
        self.next = next;
        self.start = self.slot_index(next);
        self.end = self.start;
        was_nonempty
    }

    /// Admits `msg` (must have `kind == Normal`). See [`Admit`].
    pub fn admit(&mut self, msg: WriterMessage) -> Admit {
        let distance = i128::from(msg.version) - i128::from(self.next);
        if distance >= i128::from(self.size) - 1 {
            return Admit::Repush(msg);
        }

        let current = self.slot_index(msg.version);
        if current == self.start {
            let mut ready = Vec::with_capacity(1);
            ready.push(msg);
            self.next += 1;

            if self.is_empty() {
                self.start = (self.start + 1) % self.size;
                self.end = self.start;
                return Admit::Ready(ready);
            }

            self.start = (self.start + 1) % self.size;
            while self.start != self.end {
                match self.slots[self.start].take() {
                    Some(stored) => {
                        ready.push(stored);
                        self.next += 1;
                        self.count -= 1;
                        self.start = (self.start + 1) % self.size;
                    }
                    None => break,
                }
            }
            return Admit::Ready(ready);
        }

        let version = msg.version;
        self.slots[current] = Some(msg);
        self.count += 1;
        self.max_count = self.max_count.max(self.count);

        let expand = if self.is_empty() {
            true
        } else if self.end > self.start {
            !(current > self.start && current < self.end)
        } else {
            current >= self.end && current < self.start
        };

        if expand {
            self.end = self.slot_index(version + 1);
        }

        Admit::Stored
    }
}
