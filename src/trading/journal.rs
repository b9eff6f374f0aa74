use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::models::{Signal, SignalEntry, SignalStatus};

/// Append-only record of received signals and what became of them.
pub struct SignalJournal {
    entries: Mutex<Vec<SignalEntry>>,
    path: Option<PathBuf>,
}

impl SignalJournal {
    pub fn in_memory() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            path: None,
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = fs::read_to_string(&path)
            .ok()
            .and_then(|c| serde_json::from_str::<Vec<SignalEntry>>(&c).ok())
            .unwrap_or_default();
        Self {
            entries: Mutex::new(entries),
            path: Some(path),
        }
    }

    fn save_locked(&self, entries: &[SignalEntry]) {
        let Some(path) = &self.path else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Ok(json) = serde_json::to_string_pretty(entries) {
            if let Err(e) = fs::write(path, json) {
                warn!("Failed to save {}: {}", path.display(), e);
            }
        }
    }

    /// Records a new signal as pending and returns its journal index.
    pub fn record(&self, signal: &Signal) -> usize {
        let mut entries = self.entries.lock();
        entries.push(SignalEntry {
            signal: signal.clone(),
            status: SignalStatus::Pending,
            ticket: None,
            note: None,
        });
        self.save_locked(&entries);
        entries.len() - 1
    }

    pub fn mark_executed(&self, index: usize, ticket: u64) {
        self.update(index, SignalStatus::Executed, Some(ticket), None);
    }

    pub fn mark_failed(&self, index: usize, note: impl Into<String>) {
        self.update(index, SignalStatus::Failed, None, Some(note.into()));
    }

    fn update(&self, index: usize, status: SignalStatus, ticket: Option<u64>, note: Option<String>) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(index) else {
            return;
        };
        entry.status = status;
        entry.ticket = ticket.or(entry.ticket);
        entry.note = note;
        self.save_locked(&entries);
    }

    pub fn entries(&self) -> Vec<SignalEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
