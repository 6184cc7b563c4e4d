use crate::models::Entry;
use chrono::{DateTime, FixedOffset};

type StartKey = fn(&Entry) -> DateTime<FixedOffset>;

fn slot_start(entry: &Entry) -> DateTime<FixedOffset> {
    entry.slot.fst
}

/// Ordered entries fed page by page. Merging is idempotent: an entry equal to
/// one already held is dropped.
#[derive(Debug, Clone)]
pub struct SortedEntryIndex<K, F = StartKey>
where
    K: Ord,
    F: Fn(&Entry) -> K,
{
    entries: Vec<Entry>,
    key: F,
}

impl SortedEntryIndex<DateTime<FixedOffset>, StartKey> {
    /// Keyed by slot start time.
    pub fn by_start() -> Self {
        Self::with_key(slot_start)
    }
}

impl<K, F> SortedEntryIndex<K, F>
where
    K: Ord,
    F: Fn(&Entry) -> K,
{
    pub fn with_key(key: F) -> Self {
        Self {
            entries: Vec::new(),
            key,
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Inserts each incoming entry at its lower bound. Returns how many were
    /// new.
    pub fn merge<I>(&mut self, incoming: I) -> usize
    where
        I: IntoIterator<Item = Entry>,
    {
        let mut inserted = 0;
        for entry in incoming {
            let key = (self.key)(&entry);
            let lower = self.entries.partition_point(|held| (self.key)(held) < key);
            // Equal keys may already sit in a run; the duplicate can be anywhere in it.
            let duplicate = self.entries[lower..]
                .iter()
                .take_while(|held| (self.key)(*held) == key)
                .any(|held| *held == entry);
            if duplicate {
                continue;
            }
            self.entries.insert(lower, entry);
            inserted += 1;
        }
        inserted
    }
}
