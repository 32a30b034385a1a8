//! Local result history
//!
//! Completed results appended to `history.json`, newest last, capped at
//! `MAX_LOCAL_ENTRIES`.

use std::sync::Mutex;

use localspeed::error::SpeedError;
use localspeed::orchestrator::ResultSink;
use localspeed::types::TestResult;
use tracing::info;

use crate::config::app::HISTORY_FILE;
use crate::config::history::MAX_LOCAL_ENTRIES;
use crate::data::storage::Store;
use crate::data::types::HistoryEntry;
use crate::error::Result;

/// History file in a `Store`
pub struct LocalHistory {
    store: Store,
    limit: usize,
    // Serializes read-modify-write of the file
    lock: Mutex<()>,
}

impl LocalHistory {
    pub fn new(store: Store) -> Self {
        Self::with_limit(store, MAX_LOCAL_ENTRIES)
    }

    pub fn with_limit(store: Store, limit: usize) -> Self {
        Self {
            store,
            limit: limit.max(1),
            lock: Mutex::new(()),
        }
    }

    /// All entries, oldest first
    pub fn entries(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .store
            .load::<Vec<HistoryEntry>>(HISTORY_FILE)?
            .unwrap_or_default())
    }

    /// The `n` newest entries, newest first
    pub fn recent(&self, n: usize) -> Result<Vec<HistoryEntry>> {
        let mut entries = self.entries()?;
        entries.reverse();
        entries.truncate(n);
        Ok(entries)
    }

    pub fn append(&self, entry: HistoryEntry) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.entries()?;
        entries.push(entry);
        if entries.len() > self.limit {
            let excess = entries.len() - self.limit;
            entries.drain(..excess);
        }
        self.store.save(HISTORY_FILE, &entries)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.delete(HISTORY_FILE)
    }
}

impl ResultSink for LocalHistory {
    fn save(&self, result: &TestResult) -> localspeed::error::Result<()> {
        self.append(HistoryEntry::from_result(result))
            .map_err(SpeedError::from)?;
        info!(path = %self.store.path(HISTORY_FILE).display(), "result saved locally");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::storage::tests::temp_store;
    use localspeed::types::{ConnectionMode, Direction, PhaseResult};
    use std::fs;

    fn entry(download_mbps: f64) -> HistoryEntry {
        HistoryEntry {
            timestamp: 1_700_000_000,
            ping_ms: 10.0,
            jitter_ms: 1.0,
            download_mbps,
            upload_mbps: 20.0,
            download_loaded_ping_ms: 0.0,
            upload_loaded_ping_ms: 0.0,
            mode: ConnectionMode::Multi,
        }
    }

    #[test]
    fn empty_history() {
        let history = LocalHistory::new(temp_store("history_empty"));
        assert!(history.entries().unwrap().is_empty());
    }

    #[test]
    fn append_and_read_back() {
        let store = temp_store("history_append");
        let history = LocalHistory::new(store.clone());
        history.append(entry(100.0)).unwrap();
        history.append(entry(200.0)).unwrap();

        let entries = history.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].download_mbps, 200.0);

        let recent = history.recent(1).unwrap();
        assert_eq!(recent[0].download_mbps, 200.0);

        let _ = fs::remove_dir_all(store.dir());
    }

    #[test]
    fn oldest_entries_are_dropped() {
        let store = temp_store("history_cap");
        let history = LocalHistory::with_limit(store.clone(), 3);
        for i in 0..5 {
            history.append(entry(i as f64)).unwrap();
        }
        let speeds: Vec<f64> = history
            .entries()
            .unwrap()
            .iter()
            .map(|e| e.download_mbps)
            .collect();
        assert_eq!(speeds, vec![2.0, 3.0, 4.0]);

        let _ = fs::remove_dir_all(store.dir());
    }

    #[test]
    fn works_as_result_sink() {
        let store = temp_store("history_sink");
        let history = LocalHistory::new(store.clone());
        let phase = |direction| PhaseResult {
            direction,
            speed_bits_per_second: 80_000_000.0,
            loaded_ping_ms: 25.0,
            workers: 2,
        };
        let result = TestResult {
            ping_ms: 5.0,
            jitter_ms: 0.5,
            download: phase(Direction::Download),
            upload: phase(Direction::Upload),
            mode: ConnectionMode::Single,
        };

        ResultSink::save(&history, &result).unwrap();

        let entries = history.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].download_mbps, 80.0);
        assert_eq!(entries[0].mode, ConnectionMode::Single);

        history.clear().unwrap();
        assert!(history.entries().unwrap().is_empty());
        let _ = fs::remove_dir_all(store.dir());
    }

    #[test]
    fn unreadable_history_is_a_persistence_error() {
        let store = temp_store("history_corrupt");
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.path(HISTORY_FILE), "{ not a list").unwrap();

        let history = LocalHistory::new(store.clone());
        let err = ResultSink::save(&history, &TestResult {
            ping_ms: 0.0,
            jitter_ms: 0.0,
            download: PhaseResult {
                direction: Direction::Download,
                speed_bits_per_second: 0.0,
                loaded_ping_ms: 0.0,
                workers: 1,
            },
            upload: PhaseResult {
                direction: Direction::Upload,
                speed_bits_per_second: 0.0,
                loaded_ping_ms: 0.0,
                workers: 1,
            },
            mode: ConnectionMode::Single,
        })
        .unwrap_err();
        assert!(matches!(err, SpeedError::Persistence(_)));

        let _ = fs::remove_dir_all(store.dir());
    }
}
