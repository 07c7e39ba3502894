pub const DEFAULT_PPQ: u16 = 480;

#[must_use]
pub fn ticks_to_seconds(ticks: u64, bpm: f64, ppq: u16) -> f64 {
    if bpm <= 0.0 || ppq == 0 {
        return 0.0;
    }

    let beats = ticks as f64 / f64::from(ppq);
    beats * (60.0 / bpm)
}

#[must_use]
pub fn bpm_to_beats_per_second(bpm: f64) -> f64 {
    if bpm <= 0.0 || !bpm.is_finite() {
        return 0.0;
    }
    bpm / 60.0
}
