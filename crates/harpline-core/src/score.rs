use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::reconcile::{ReconciliationOutcome, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VerdictTally {
    pub hit: usize,
    pub early: usize,
    pub late: usize,
    pub missed: usize,
}

impl VerdictTally {
    pub fn add(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Hit => self.hit += 1,
            Verdict::Early => self.early += 1,
            Verdict::Late => self.late += 1,
            Verdict::Missed => self.missed += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.hit + self.early + self.late + self.missed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreState {
    pub notes_resolved: usize,
    pub notes_hit: usize,
    pub running_accuracy: f64,
    pub final_accuracy: Option<f64>,
    pub tally: VerdictTally,
}

impl ScoreState {
    #[must_use]
    pub fn is_latched(&self) -> bool {
        self.final_accuracy.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scorer {
    note_count: usize,
    state: ScoreState,
}

impl Scorer {
    #[must_use]
    pub fn new(note_count: usize) -> Self {
        Self {
            note_count,
            state: ScoreState::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> &ScoreState {
        &self.state
    }

    #[must_use]
    pub fn note_count(&self) -> usize {
        self.note_count
    }

    pub fn reset(&mut self, note_count: usize) {
        self.note_count = note_count;
        self.state = ScoreState::default();
    }

    /// Score that would result from recording `outcomes`; leaves `self` untouched.
    #[must_use]
    pub fn preview(&self, outcomes: &[ReconciliationOutcome]) -> ScoreState {
        let mut next = self.state;
        if next.is_latched() {
            if !outcomes.is_empty() {
                warn!(
                    ignored = outcomes.len(),
                    "outcomes recorded after the score was latched"
                );
            }
            return next;
        }

        for outcome in outcomes {
            next.notes_resolved += 1;
            if outcome.verdict.counts_as_hit() {
                next.notes_hit += 1;
            }
            next.tally.add(outcome.verdict);
        }

        next.running_accuracy = accuracy(next.notes_hit, next.notes_resolved);
        if self.note_count > 0 && next.notes_resolved >= self.note_count {
            next.final_accuracy = Some(next.running_accuracy);
        }
        next
    }

    pub fn commit(&mut self, next: ScoreState) {
        if self.state.is_latched() {
            return;
        }
        if let Some(final_accuracy) = next.final_accuracy {
            debug!(final_accuracy, resolved = next.notes_resolved, "score latched");
        }
        self.state = next;
    }

    pub fn record(&mut self, outcomes: &[ReconciliationOutcome]) -> ScoreState {
        let next = self.preview(outcomes);
        self.commit(next);
        self.state
    }
}

fn accuracy(hit: usize, resolved: usize) -> f64 {
    if resolved == 0 {
        return 0.0;
    }
    hit as f64 / resolved as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NoteId;

    fn outcome(index: usize, verdict: Verdict) -> ReconciliationOutcome {
        ReconciliationOutcome {
            note: NoteId(index),
            verdict,
            timing_error: 0.0,
        }
    }

    #[test]
    fn running_accuracy_is_zero_before_any_outcome() {
        let scorer = Scorer::new(3);
        assert_eq!(scorer.state().running_accuracy, 0.0);
        assert!(!scorer.state().is_latched());
    }

    #[test]
    fn early_and_late_count_as_hits() {
        let mut scorer = Scorer::new(4);
        let state = scorer.record(&[
            outcome(0, Verdict::Hit),
            outcome(1, Verdict::Early),
            outcome(2, Verdict::Late),
            outcome(3, Verdict::Missed),
        ]);
        assert_eq!(state.notes_hit, 3);
        assert_eq!(state.notes_resolved, 4);
        assert_eq!(state.tally.total(), 4);
        assert_eq!(state.final_accuracy, Some(0.75));
    }

    #[test]
    fn final_accuracy_latches_once() {
        let mut scorer = Scorer::new(1);
        scorer.record(&[outcome(0, Verdict::Hit)]);
        let state = scorer.record(&[outcome(0, Verdict::Missed)]);
        assert_eq!(state.final_accuracy, Some(1.0));
        assert_eq!(state.notes_resolved, 1);
    }

    #[test]
    fn preview_leaves_state_untouched() {
        let scorer = Scorer::new(2);
        let preview = scorer.preview(&[outcome(0, Verdict::Hit)]);
        assert_eq!(preview.notes_resolved, 1);
        assert_eq!(scorer.state().notes_resolved, 0);
    }

    #[test]
    fn reset_clears_latch() {
        let mut scorer = Scorer::new(1);
        scorer.record(&[outcome(0, Verdict::Missed)]);
        scorer.reset(2);
        assert_eq!(*scorer.state(), ScoreState::default());
        assert_eq!(scorer.note_count(), 2);
    }
}
