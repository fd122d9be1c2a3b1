/// Operation counters, read out as a point-in-time copy via
/// [`crate::Casky::stats`].
///
/// `total_keys` and `memory_bytes` mirror the directory (including recovery
/// and expiry); the `num_*` counters count public API calls only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub num_puts: u64,
    pub num_gets: u64,
    pub num_deletes: u64,
    pub total_keys: u64,
    pub memory_bytes: u64,
}

impl Stats {
    pub fn new() -> Stats {
        Stats::default()
    }

    pub fn on_insert(&mut self, bytes: usize) {
        self.num_puts += 1;
        self.total_keys += 1;
        self.memory_bytes += bytes as u64;
    }

    pub fn on_replace(&mut self, old_value_len: usize, new_value_len: usize) {
        self.num_puts += 1;
        self.memory_bytes = self.memory_bytes.saturating_sub(old_value_len as u64);
        self.memory_bytes += new_value_len as u64;
    }

    pub fn on_get_hit(&mut self) {
        self.num_gets += 1;
    }

    pub fn on_delete(&mut self, freed: usize) {
        self.num_deletes += 1;
        self.on_evict(1, freed);
    }

    /// Entries leaving the directory without a public delete: expiry on
    /// lookup, or the sweep.
    pub fn on_evict(&mut self, entries: usize, freed: usize) {
        self.total_keys = self.total_keys.saturating_sub(entries as u64);
        self.memory_bytes = self.memory_bytes.saturating_sub(freed as u64);
    }
}
