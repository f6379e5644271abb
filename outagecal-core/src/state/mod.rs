//! Sync state: which schedule was last applied for each live date.

mod file;
mod memory;

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::OutageResult;
use crate::fingerprint::Fingerprint;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;

/// Fingerprints of the schedules currently applied to the calendar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedState {
    #[serde(rename = "by_day_fingerprint", default)]
    by_day: BTreeMap<NaiveDate, Fingerprint>,
}

impl TrackedState {
    pub fn get(&self, date: NaiveDate) -> Option<&Fingerprint> {
        self.by_day.get(&date)
    }

    pub fn insert(&mut self, date: NaiveDate, fingerprint: Fingerprint) {
        self.by_day.insert(date, fingerprint);
    }

    pub fn remove(&mut self, date: NaiveDate) -> Option<Fingerprint> {
        self.by_day.remove(&date)
    }

    /// Drop every date not in `keep`. Returns how many entries were removed.
    pub fn retain_dates(&mut self, keep: &[NaiveDate]) -> usize {
        let before = self.by_day.len();
        self.by_day.retain(|date, _| keep.contains(date));
        before - self.by_day.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &Fingerprint)> {
        self.by_day.iter()
    }

    pub fn len(&self) -> usize {
        self.by_day.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_day.is_empty()
    }
}

impl FromIterator<(NaiveDate, Fingerprint)> for TrackedState {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, Fingerprint)>>(iter: I) -> Self {
        TrackedState {
            by_day: iter.into_iter().collect(),
        }
    }
}

/// The only dates worth tracking: today and tomorrow.
pub fn live_dates(today: NaiveDate) -> [NaiveDate; 2] {
    [today, today + Duration::days(1)]
}

/// Durable storage for [`TrackedState`].
pub trait StateStore {
    /// Load the last committed state. Missing or unreadable storage yields
    /// an empty state, which makes every live date look changed.
    fn load(&self) -> TrackedState;

    /// Replace the stored state atomically.
    fn save(&mut self, state: &TrackedState) -> OutageResult<()>;

    /// Remove stored entries for dates not in `keep`.
    fn prune(&mut self, keep: &[NaiveDate]) -> OutageResult<()> {
        let mut state = self.load();
        if state.retain_dates(keep) > 0 {
            self.save(&state)?;
        }
        Ok(())
    }
}
