use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::{
    cue::{CueScheduler, CueWindow},
    model::{NoteId, Track},
};

pub const DEFAULT_HIT_TOLERANCE: f64 = 0.1;
pub const DEFAULT_FORGIVING_TOLERANCE: f64 = 0.2;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReconcileError {
    #[error("note {note} is outside a track of {len} notes")]
    NoteOutOfRange { note: NoteId, len: usize },
    #[error("note {0} was already resolved")]
    AlreadyResolved(NoteId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Hit,
    Early,
    Late,
    Missed,
}

impl Verdict {
    #[must_use]
    pub fn counts_as_hit(self) -> bool {
        !matches!(self, Self::Missed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeWindows {
    pub hit_tolerance: f64,
    /// Outer band where early/late inputs still count towards accuracy.
    pub forgiving_tolerance: f64,
}

impl Default for JudgeWindows {
    fn default() -> Self {
        Self {
            hit_tolerance: DEFAULT_HIT_TOLERANCE,
            forgiving_tolerance: DEFAULT_FORGIVING_TOLERANCE,
        }
    }
}

impl JudgeWindows {
    #[must_use]
    pub fn classify(&self, timing_error: f64) -> Verdict {
        if !timing_error.is_finite() {
            return Verdict::Missed;
        }
        let distance = timing_error.abs();
        if distance <= self.hit_tolerance {
            Verdict::Hit
        } else if distance <= self.forgiving_tolerance {
            if timing_error < 0.0 {
                Verdict::Early
            } else {
                Verdict::Late
            }
        } else {
            Verdict::Missed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    pub pitch: u8,
    pub arrival_time: f64,
}

impl InputEvent {
    #[must_use]
    pub fn new(pitch: u8, arrival_time: f64) -> Self {
        Self {
            pitch,
            arrival_time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub note: NoteId,
    pub verdict: Verdict,
    /// Arrival minus onset; for forced misses, query time minus onset.
    pub timing_error: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrayReason {
    NoMatchingNote,
    AlreadyResolved,
    InvalidArrival,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrayInput {
    pub input: InputEvent,
    pub reason: StrayReason,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reconciliation {
    pub outcomes: Vec<ReconciliationOutcome>,
    pub strays: Vec<StrayInput>,
}

/// Resolution state of every note in the current playthrough.
#[derive(Debug, Clone, Default)]
pub struct ResolutionLedger {
    verdicts: Vec<Option<Verdict>>,
    resolved: usize,
    miss_cursor: usize,
}

impl ResolutionLedger {
    #[must_use]
    pub fn new(note_count: usize) -> Self {
        Self {
            verdicts: vec![None; note_count],
            resolved: 0,
            miss_cursor: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }

    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.resolved
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.verdicts.is_empty() && self.resolved == self.verdicts.len()
    }

    #[must_use]
    pub fn verdict(&self, id: NoteId) -> Option<Verdict> {
        self.verdicts.get(id.index()).copied().flatten()
    }

    #[must_use]
    pub fn is_resolved(&self, id: NoteId) -> bool {
        self.verdict(id).is_some()
    }

    fn check(&self, id: NoteId) -> Result<(), ReconcileError> {
        if id.index() >= self.verdicts.len() {
            return Err(ReconcileError::NoteOutOfRange {
                note: id,
                len: self.verdicts.len(),
            });
        }
        Ok(())
    }

    /// Unresolved notes that aged out of the cue window, resolved as missed.
    /// Notes in `claimed` were matched by an input this tick and are skipped.
    pub fn aged_out(
        &self,
        track: &Track,
        window: &CueWindow,
        claimed: &[ReconciliationOutcome],
    ) -> Result<Vec<ReconciliationOutcome>, ReconcileError> {
        let mut missed = Vec::new();
        for index in self.miss_cursor..window.expired_before {
            let id = NoteId(index);
            self.check(id)?;
            if self.is_resolved(id) || claimed.iter().any(|outcome| outcome.note == id) {
                continue;
            }
            let note = track.note(id).ok_or(ReconcileError::NoteOutOfRange {
                note: id,
                len: track.note_count(),
            })?;
            missed.push(ReconciliationOutcome {
                note: id,
                verdict: Verdict::Missed,
                timing_error: window.time - note.onset,
            });
        }
        Ok(missed)
    }

    /// Checks that `outcomes` can be applied without resolving a note twice.
    pub fn validate(&self, outcomes: &[ReconciliationOutcome]) -> Result<(), ReconcileError> {
        for (position, outcome) in outcomes.iter().enumerate() {
            self.check(outcome.note)?;
            if self.is_resolved(outcome.note)
                || outcomes[..position]
                    .iter()
                    .any(|earlier| earlier.note == outcome.note)
            {
                return Err(ReconcileError::AlreadyResolved(outcome.note));
            }
        }
        Ok(())
    }

    /// Applies validated outcomes. Outcomes for already resolved notes are skipped.
    pub fn apply(&mut self, outcomes: &[ReconciliationOutcome]) {
        for outcome in outcomes {
            if let Some(slot) = self.verdicts.get_mut(outcome.note.index())
                && slot.is_none()
            {
                *slot = Some(outcome.verdict);
                self.resolved += 1;
            }
        }
        while self
            .verdicts
            .get(self.miss_cursor)
            .is_some_and(Option::is_some)
        {
            self.miss_cursor += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InputReconciler {
    judge: JudgeWindows,
}

impl InputReconciler {
    #[must_use]
    pub fn new(judge: JudgeWindows) -> Self {
        Self { judge }
    }

    #[must_use]
    pub fn judge(&self) -> &JudgeWindows {
        &self.judge
    }

    /// Matches each input against the unresolved notes of the same pitch that
    /// were playable when the input arrived, in arrival order.
    pub fn resolve(
        &self,
        track: &Track,
        scheduler: &CueScheduler,
        ledger: &ResolutionLedger,
        inputs: &[InputEvent],
    ) -> Result<Reconciliation, ReconcileError> {
        let mut ordered = inputs.to_vec();
        ordered.sort_by(|a, b| a.arrival_time.total_cmp(&b.arrival_time));

        let mut result = Reconciliation::default();
        for input in ordered {
            if !input.arrival_time.is_finite() {
                result.strays.push(StrayInput {
                    input,
                    reason: StrayReason::InvalidArrival,
                });
                continue;
            }

            let mut saw_resolved = false;
            let mut best: Option<(NoteId, f64, f64)> = None;
            for id in scheduler.active_range(track, input.arrival_time).map(NoteId) {
                let note = track.note(id).ok_or(ReconcileError::NoteOutOfRange {
                    note: id,
                    len: track.note_count(),
                })?;
                if note.pitch != input.pitch {
                    continue;
                }
                let claimed = ledger.is_resolved(id)
                    || result.outcomes.iter().any(|outcome| outcome.note == id);
                if claimed {
                    saw_resolved = true;
                    continue;
                }

                let distance = (input.arrival_time - note.onset).abs();
                let better = best.is_none_or(|(_, best_distance, best_onset)| {
                    match distance.total_cmp(&best_distance) {
                        Ordering::Less => true,
                        Ordering::Equal => note.onset < best_onset,
                        Ordering::Greater => false,
                    }
                });
                if better {
                    best = Some((id, distance, note.onset));
                }
            }

            match best {
                Some((id, _, onset)) => {
                    let timing_error = input.arrival_time - onset;
                    let verdict = self.judge.classify(timing_error);
                    trace!(note = %id, ?verdict, timing_error, "input matched");
                    result.outcomes.push(ReconciliationOutcome {
                        note: id,
                        verdict,
                        timing_error,
                    });
                }
                None => {
                    let reason = if saw_resolved {
                        StrayReason::AlreadyResolved
                    } else {
                        StrayReason::NoMatchingNote
                    };
                    trace!(pitch = input.pitch, ?reason, "stray input");
                    result.strays.push(StrayInput { input, reason });
                }
            }
        }
        Ok(result)
    }
}
