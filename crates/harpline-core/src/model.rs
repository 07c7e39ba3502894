use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::time::{DEFAULT_PPQ, bpm_to_beats_per_second, ticks_to_seconds};

pub const MAX_PITCH: u8 = 127;
pub const DEFAULT_BPM: f64 = 120.0;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TrackError {
    #[error("malformed track: {reason}")]
    MalformedTrack { reason: String },
}

impl TrackError {
    fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedTrack {
            reason: reason.into(),
        }
    }
}

/// Position of a note inside its track's ordered note list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NoteId(pub usize);

impl NoteId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub pitch: u8,
    pub onset: f64,
    pub duration: f64,
}

impl NoteEvent {
    #[must_use]
    pub fn end(&self) -> f64 {
        self.onset + self.duration
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNote {
    pub pitch: u8,
    pub onset: f64,
    #[serde(default)]
    pub duration: f64,
}

/// Tick-positioned note as produced by a MIDI decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickNote {
    pub pitch: u8,
    pub start_tick: u64,
    pub length_ticks: u64,
}

/// Decoded but unvalidated note data handed over by the import collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTrack {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_bpm")]
    pub bpm: f64,
    pub notes: Vec<RawNote>,
}

impl RawTrack {
    #[must_use]
    pub fn new(name: impl Into<String>, bpm: f64, notes: Vec<RawNote>) -> Self {
        Self {
            name: name.into(),
            bpm,
            notes,
        }
    }

    /// Converts tick positions to seconds at a constant tempo. MIDI tracks are
    /// not guaranteed to list notes in onset order, so they are sorted here.
    #[must_use]
    pub fn from_ticks(name: impl Into<String>, bpm: f64, ppq: u16, notes: &[TickNote]) -> Self {
        let ppq = if ppq == 0 { DEFAULT_PPQ } else { ppq };
        let mut converted = notes
            .iter()
            .map(|note| RawNote {
                pitch: note.pitch,
                onset: ticks_to_seconds(note.start_tick, bpm, ppq),
                duration: ticks_to_seconds(note.length_ticks, bpm, ppq),
            })
            .collect::<Vec<_>>();
        converted.sort_by(|a, b| a.onset.total_cmp(&b.onset));
        Self::new(name, bpm, converted)
    }
}

/// One imported piece. Read-only once loaded; shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    id: Uuid,
    name: String,
    beats_per_second: f64,
    duration: f64,
    notes: Vec<NoteEvent>,
}

impl Track {
    pub fn load(raw: RawTrack) -> Result<Self, TrackError> {
        if raw.notes.is_empty() {
            return Err(TrackError::malformed("track has no notes"));
        }
        if !raw.bpm.is_finite() || raw.bpm <= 0.0 {
            return Err(TrackError::malformed(format!("invalid tempo {} bpm", raw.bpm)));
        }

        let notes = raw
            .notes
            .iter()
            .enumerate()
            .map(|(index, note)| {
                if note.pitch > MAX_PITCH {
                    return Err(TrackError::malformed(format!(
                        "note {index} pitch {} exceeds {MAX_PITCH}",
                        note.pitch
                    )));
                }
                if !note.onset.is_finite() || note.onset < 0.0 {
                    return Err(TrackError::malformed(format!(
                        "note {index} has invalid onset {}",
                        note.onset
                    )));
                }
                if !note.duration.is_finite() || note.duration < 0.0 {
                    return Err(TrackError::malformed(format!(
                        "note {index} has invalid duration {}",
                        note.duration
                    )));
                }
                Ok(NoteEvent {
                    pitch: note.pitch,
                    onset: note.onset,
                    duration: note.duration,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(index) = notes
            .windows(2)
            .position(|pair| pair[1].onset < pair[0].onset)
        {
            return Err(TrackError::malformed(format!(
                "note {} onset {} precedes previous onset {}",
                index + 1,
                notes[index + 1].onset,
                notes[index].onset
            )));
        }

        let duration = notes.iter().map(NoteEvent::end).fold(0.0_f64, f64::max);

        Ok(Self {
            id: Uuid::new_v4(),
            name: raw.name,
            beats_per_second: bpm_to_beats_per_second(raw.bpm),
            duration,
            notes,
        })
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn beats_per_second(&self) -> f64 {
        self.beats_per_second
    }

    #[must_use]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    #[must_use]
    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    #[must_use]
    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    #[must_use]
    pub fn note(&self, id: NoteId) -> Option<&NoteEvent> {
        self.notes.get(id.index())
    }

    /// Index of the first note whose onset is at or after `time`.
    #[must_use]
    pub fn first_at_or_after(&self, time: f64) -> usize {
        self.notes.partition_point(|note| note.onset < time)
    }

    /// Index one past the last note whose onset is at or before `time`.
    #[must_use]
    pub fn first_after(&self, time: f64) -> usize {
        self.notes.partition_point(|note| note.onset <= time)
    }
}

const fn default_bpm() -> f64 {
    DEFAULT_BPM
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(notes: &[(u8, f64)]) -> RawTrack {
        RawTrack::new(
            "test",
            120.0,
            notes
                .iter()
                .map(|&(pitch, onset)| RawNote {
                    pitch,
                    onset,
                    duration: 0.25,
                })
                .collect(),
        )
    }

    #[test]
    fn load_accepts_chords_and_computes_duration() {
        let track = Track::load(raw(&[(60, 0.0), (64, 0.0), (67, 1.5)])).expect("valid track");
        assert_eq!(track.note_count(), 3);
        assert!((track.duration() - 1.75).abs() < 1e-12);
        assert!((track.beats_per_second() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn load_rejects_empty_track() {
        let error = Track::load(raw(&[])).expect_err("empty track must fail");
        assert!(matches!(error, TrackError::MalformedTrack { .. }));
    }

    #[test]
    fn load_rejects_out_of_order_onsets() {
        let error = Track::load(raw(&[(60, 1.0), (62, 0.5)])).expect_err("unordered must fail");
        assert!(error.to_string().contains("precedes"));
    }

    #[test]
    fn load_rejects_non_finite_and_negative_values() {
        assert!(Track::load(raw(&[(60, f64::NAN)])).is_err());
        assert!(Track::load(raw(&[(60, -0.1)])).is_err());
        assert!(Track::load(raw(&[(200, 0.0)])).is_err());

        let mut bad_tempo = raw(&[(60, 0.0)]);
        bad_tempo.bpm = 0.0;
        assert!(Track::load(bad_tempo).is_err());
    }

    #[test]
    fn from_ticks_sorts_and_converts() {
        let raw = RawTrack::from_ticks(
            "midi",
            120.0,
            480,
            &[
                TickNote {
                    pitch: 62,
                    start_tick: 960,
                    length_ticks: 240,
                },
                TickNote {
                    pitch: 60,
                    start_tick: 0,
                    length_ticks: 480,
                },
            ],
        );
        let track = Track::load(raw).expect("converted track loads");
        assert_eq!(track.notes()[0].pitch, 60);
        assert!((track.notes()[1].onset - 1.0).abs() < 1e-12);
        assert!((track.notes()[1].duration - 0.25).abs() < 1e-12);
    }

    #[test]
    fn binary_search_helpers_respect_boundaries() {
        let track = Track::load(raw(&[(60, 0.0), (62, 1.0), (64, 1.0), (65, 2.0)])).expect("valid");
        assert_eq!(track.first_at_or_after(1.0), 1);
        assert_eq!(track.first_after(1.0), 3);
        assert_eq!(track.first_at_or_after(5.0), 4);
        assert_eq!(track.first_after(-1.0), 0);
    }
}
