use raft_core::codec::Entry;

/// The in-memory replicated log.
///
/// Together with `current_term` and `voted_for` this is the node's
/// persistent state. This revision holds it in memory only, so a restarted
/// node rejoins with an empty history; a fault-tolerant build must write
/// all three to stable storage before answering any RPC.
#[derive(Debug, Default)]
pub struct Log {
    entries: Vec<Entry>,
}

impl Log {
    pub fn new() -> Log {
        Log {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Index of the last entry, or -1 when the log is empty.
    pub fn last_index(&self) -> i64 {
        self.entries.len() as i64 - 1
    }

    /// Term of the last entry, or 0 when the log is empty.
    pub fn last_term(&self) -> u64 {
        self.entries.last().map(|entry| entry.term).unwrap_or(0)
    }

    pub fn get(&self, index: i64) -> Option<&Entry> {
        if index < 0 {
            return None;
        }
        self.entries.get(index as usize)
    }

    pub fn term_at(&self, index: i64) -> Option<u64> {
        self.get(index).map(|entry| entry.term)
    }

    /// Appends a fresh entry at the tail and returns its index.
    pub fn append(&mut self, term: u64, command: &str) -> i64 {
        let index = self.entries.len() as i64;
        self.entries.push(Entry::new(term, index, command));
        index
    }

    /// Entries from `index` (inclusive) through the tail. Empty when the
    /// index is at or past the tail, which is the heartbeat case.
    pub fn entries_from(&self, index: i64) -> Vec<Entry> {
        if index < 0 {
            return self.entries.clone();
        }
        let start = index as usize;
        if start >= self.entries.len() {
            Vec::new()
        } else {
            self.entries[start..].to_vec()
        }
    }

    /// The consistency check: true iff the log holds `prev_term` at
    /// `prev_index`, or `prev_index` is before the start of the log.
    pub fn matches(&self, prev_index: i64, prev_term: u64) -> bool {
        prev_index < 0 || self.term_at(prev_index) == Some(prev_term)
    }

    /// Reconciles a replication batch into the log after `prev_index`.
    ///
    /// A term conflict at an occupied index truncates the tail before the
    /// replacement goes in; an entry already present with the same term is
    /// left untouched, so replaying an accepted batch changes nothing.
    /// Returns the index of the last entry covered by the batch.
    pub fn splice(&mut self, prev_index: i64, entries: Vec<Entry>) -> i64 {
        let mut index = prev_index;
        for entry in entries {
            index += 1;
            match self.term_at(index) {
                Some(term) if term == entry.term => {}
                Some(_) => {
                    self.entries.truncate(index as usize);
                    self.entries.push(entry);
                }
                None => self.entries.push(entry),
            }
        }
        index
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry(term: u64, index: i64) -> Entry {
        Entry::new(term, index, format!("SET k{} v", index))
    }

    #[test]
    fn test_empty_log_boundaries() {
        let log = Log::new();
        assert_eq!(log.last_index(), -1);
        assert_eq!(log.last_term(), 0);
        assert!(log.get(-1).is_none());
        assert!(log.matches(-1, 0));
        assert!(!log.matches(0, 1));
    }

    #[test]
    fn test_append_assigns_contiguous_indices() {
        let mut log = Log::new();
        assert_eq!(log.append(1, "SET a 1"), 0);
        assert_eq!(log.append(1, "SET b 2"), 1);
        assert_eq!(log.append(2, "SET c 3"), 2);
        assert_eq!(log.last_index(), 2);
        assert_eq!(log.last_term(), 2);
        assert_eq!(log.term_at(1), Some(1));
    }

    #[test]
    fn test_entries_from() {
        let mut log = Log::new();
        log.append(1, "a");
        log.append(1, "b");
        log.append(1, "c");
        assert_eq!(log.entries_from(0).len(), 3);
        assert_eq!(log.entries_from(2).len(), 1);
        assert!(log.entries_from(3).is_empty());
    }

    #[test]
    fn test_splice_appends_past_the_tail() {
        let mut log = Log::new();
        let batch = vec![entry(1, 0), entry(1, 1)];
        assert_eq!(log.splice(-1, batch), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_splice_replay_is_a_noop() {
        let mut log = Log::new();
        let batch = vec![entry(1, 0), entry(1, 1)];
        log.splice(-1, batch.clone());
        let before = log.entries.clone();
        assert_eq!(log.splice(-1, batch), 1);
        assert_eq!(log.entries, before);
    }

    #[test]
    fn test_splice_truncates_on_term_conflict() {
        let mut log = Log::new();
        log.append(1, "a");
        log.append(1, "stale-b");
        log.append(1, "stale-c");
        // A new leader in term 2 replaces everything after index 0.
        let batch = vec![entry(2, 1)];
        assert_eq!(log.splice(0, batch), 1);
        assert_eq!(log.len(), 2);
        assert_eq!(log.term_at(1), Some(2));
        assert_eq!(log.term_at(0), Some(1));
    }

    #[test]
    fn test_splice_empty_batch_is_a_heartbeat() {
        let mut log = Log::new();
        log.append(1, "a");
        assert_eq!(log.splice(0, vec![]), 0);
        assert_eq!(log.len(), 1);
    }
}
