use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::model::{NoteId, Track};

pub const DEFAULT_LOOKAHEAD_SECONDS: f64 = 2.0;
pub const DEFAULT_EARLY_TOLERANCE: f64 = 0.2;
pub const DEFAULT_LATE_TOLERANCE: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CueSettings {
    pub lookahead_seconds: f64,
    /// How far ahead of its onset a note becomes playable.
    pub early_tolerance: f64,
    /// How long after its onset a note stays playable before it is missed.
    pub late_tolerance: f64,
}

impl Default for CueSettings {
    fn default() -> Self {
        Self {
            lookahead_seconds: DEFAULT_LOOKAHEAD_SECONDS,
            early_tolerance: DEFAULT_EARLY_TOLERANCE,
            late_tolerance: DEFAULT_LATE_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CueWindow {
    pub time: f64,
    pub active: Vec<NoteId>,
    pub upcoming: Vec<NoteId>,
    /// Every note before this index aged past the late tolerance.
    pub expired_before: usize,
}

impl CueWindow {
    #[must_use]
    pub fn is_active(&self, id: NoteId) -> bool {
        self.active.binary_search(&id).is_ok()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CueScheduler {
    settings: CueSettings,
}

impl CueScheduler {
    #[must_use]
    pub fn new(settings: CueSettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub fn settings(&self) -> &CueSettings {
        &self.settings
    }

    /// Indices of the notes playable at `time`.
    #[must_use]
    pub fn active_range(&self, track: &Track, time: f64) -> Range<usize> {
        let late = self.settings.late_tolerance.max(0.0);
        let early = self.settings.early_tolerance.max(0.0);
        let start = track.first_at_or_after(time - late);
        start..track.first_after(time + early).max(start)
    }

    /// Pure query over the ordered note list; runs every tick, so every bound
    /// is found by binary search.
    #[must_use]
    pub fn query(&self, track: &Track, time: f64, lookahead_seconds: f64) -> CueWindow {
        let lookahead = lookahead_seconds.max(0.0);
        let active = self.active_range(track, time);
        let upcoming_end = track.first_after(time + lookahead).max(active.end);

        CueWindow {
            time,
            upcoming: (active.end..upcoming_end).map(NoteId).collect(),
            expired_before: active.start,
            active: active.map(NoteId).collect(),
        }
    }

    #[must_use]
    pub fn query_default(&self, track: &Track, time: f64) -> CueWindow {
        self.query(track, time, self.settings.lookahead_seconds)
    }
}
