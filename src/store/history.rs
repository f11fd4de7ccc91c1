use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::ChangeRecord;

/// Bounded append-only change log. Oldest records are evicted once the
/// capacity is reached.
#[derive(Debug)]
pub struct ChangeHistory {
    capacity: usize,
    records: Mutex<VecDeque<ChangeRecord>>,
}

impl ChangeHistory {
    pub fn new(capacity: usize) -> Self {
        ChangeHistory {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn append(
        &self,
        record: ChangeRecord,
    ) {
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Most recent records first, optionally filtered by exact path.
    pub fn query(
        &self,
        path: Option<&str>,
        limit: usize,
    ) -> Vec<ChangeRecord> {
        let records = self.records.lock();
        records
            .iter()
            .rev()
            .filter(|r| path.map_or(true, |p| r.path == p))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
