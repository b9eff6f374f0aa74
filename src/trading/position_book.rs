use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::models::TradeStatus;
use crate::trading::trade_record::TradeRecord;

#[derive(Debug, Default, Serialize, Deserialize)]
struct BookState {
    #[serde(default)]
    active: BTreeMap<u64, TradeRecord>,
    #[serde(default)]
    history: Vec<TradeRecord>,
}

/// Open positions keyed by ticket, plus closed ones. Every mutation goes
/// through one lock; callers work on snapshots and never hold it across
/// broker calls.
pub struct PositionBook {
    state: Mutex<BookState>,
    path: Option<PathBuf>,
}

impl Default for PositionBook {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl PositionBook {
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(BookState::default()),
            path: None,
        }
    }

    /// Loads `trades.json` if present. Unreadable files start an empty book.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let state = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BookState>(&content) {
                Ok(state) => {
                    info!(
                        "Loaded {} active trades and {} closed from {}",
                        state.active.len(),
                        state.history.len(),
                        path.display()
                    );
                    state
                }
                Err(e) => {
                    warn!("Ignoring unreadable {}: {}", path.display(), e);
                    BookState::default()
                }
            },
            Err(_) => BookState::default(),
        };
        Self {
            state: Mutex::new(state),
            path: Some(path),
        }
    }

    fn save_locked(&self, state: &BookState) {
        let Some(path) = &self.path else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(state) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    warn!("Failed to save {}: {}", path.display(), e);
                }
            }
            Err(e) => warn!("Failed to serialize trades: {}", e),
        }
    }

    pub fn insert(&self, record: TradeRecord) {
        let mut st = self.state.lock();
        debug!("Tracking trade #{} {}", record.ticket, record.actual_symbol);
        st.active.insert(record.ticket, record);
        self.save_locked(&st);
    }

    /// Copies of every open record.
    pub fn snapshot(&self) -> Vec<TradeRecord> {
        self.state.lock().active.values().cloned().collect()
    }

    pub fn get(&self, ticket: u64) -> Option<TradeRecord> {
        self.state.lock().active.get(&ticket).cloned()
    }

    pub fn contains(&self, ticket: u64) -> bool {
        self.state.lock().active.contains_key(&ticket)
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Marks the next take-profit as crossed and returns the new index.
    /// `expected` guards against a record that moved on since the snapshot.
    pub fn advance(&self, ticket: u64, expected: usize) -> Option<usize> {
        let mut st = self.state.lock();
        let record = st.active.get_mut(&ticket)?;
        if record.current_tp_index != expected {
            return None;
        }
        record.current_tp_index += 1;
        let index = record.current_tp_index;
        self.save_locked(&st);
        Some(index)
    }

    /// Moves the record into history. Returns it, or None when it was not
    /// open.
    pub fn close(&self, ticket: u64) -> Option<TradeRecord> {
        let mut st = self.state.lock();
        let mut record = st.active.remove(&ticket)?;
        record.status = TradeStatus::Closed;
        record.closed_at = Some(Utc::now());
        st.history.push(record.clone());
        self.save_locked(&st);
        Some(record)
    }

    pub fn history(&self) -> Vec<TradeRecord> {
        self.state.lock().history.clone()
    }
}
