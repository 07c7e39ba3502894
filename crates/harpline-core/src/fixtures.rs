use crate::{
    model::{RawTrack, TickNote, Track},
    reconcile::InputEvent,
    time::DEFAULT_PPQ,
};

const DEMO_BPM: f64 = 120.0;

fn note(pitch: u8, start_tick: u64, length_ticks: u64) -> TickNote {
    TickNote {
        pitch,
        start_tick,
        length_ticks,
    }
}

/// Eight-note harp phrase at 120 bpm with a C major chord on beat four.
#[must_use]
pub fn demo_raw_track() -> RawTrack {
    RawTrack::from_ticks(
        "Harpline Demo",
        DEMO_BPM,
        DEFAULT_PPQ,
        &[
            note(60, 0, 480),
            note(62, 480, 480),
            note(64, 960, 480),
            note(60, 1_440, 480),
            note(64, 1_440, 480),
            note(67, 1_440, 480),
            note(65, 1_920, 480),
            note(72, 2_400, 960),
        ],
    )
}

#[must_use]
pub fn demo_track() -> Track {
    Track::load(demo_raw_track()).expect("demo track should be valid")
}

/// One input per note, shifted by `offset_for(index)` seconds.
#[must_use]
pub fn performance_for(track: &Track, offset_for: impl Fn(usize) -> f64) -> Vec<InputEvent> {
    track
        .notes()
        .iter()
        .enumerate()
        .map(|(index, note)| InputEvent::new(note.pitch, note.onset + offset_for(index)))
        .collect()
}
