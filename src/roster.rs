use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    pub id: u64,
    pub name: String,
    pub status: bool,
}

/// Today's expected attendees, in the order the ledger returned them.
///
/// Entries are never removed and a status never goes back from present
/// to absent, so marking someone twice is harmless.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Vec<AttendanceEntry>,
}

impl Roster {
    pub fn new(entries: Vec<AttendanceEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[AttendanceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn present_count(&self) -> usize {
        self.entries.iter().filter(|e| e.status).count()
    }

    /// Marks the first entry named exactly `name` as present.
    ///
    /// Returns the entry only when its status changed on this call.
    pub fn mark_present(&mut self, name: &str) -> Option<&AttendanceEntry> {
        let entry = self.entries.iter_mut().find(|e| e.name == name)?;
        if entry.status {
            return None;
        }
        entry.status = true;
        Some(&*entry)
    }
}
