use std::sync::Arc;

use harpline_core::{
    ClockStep, CueScheduler, EngineConfig, InputEvent, JudgeWindows, NoteId, Notification,
    PlayState, RawNote, RawTrack, StrayReason, TickInput, TickReport, TickStatus, TrackAssistant,
    Verdict,
};
use parking_lot::Mutex;

const FRAME: f64 = 1.0 / 60.0;
const PITCH_A: u8 = 69;
const PITCH_B: u8 = 71;

fn raw_track(notes: &[(u8, f64)]) -> RawTrack {
    RawTrack::new(
        "scenario",
        60.0,
        notes
            .iter()
            .map(|&(pitch, onset)| RawNote {
                pitch,
                onset,
                duration: 0.5,
            })
            .collect(),
    )
}

fn three_note_track() -> RawTrack {
    raw_track(&[(PITCH_A, 0.0), (PITCH_B, 1.0), (PITCH_A, 2.0)])
}

fn config_with_forgiving(forgiving_tolerance: f64) -> EngineConfig {
    EngineConfig {
        judge: JudgeWindows {
            hit_tolerance: 0.1,
            forgiving_tolerance,
        },
        ..EngineConfig::default()
    }
}

fn start(assistant: &mut TrackAssistant, raw: RawTrack) {
    assistant.import_track(raw).expect("scenario track is valid");
    assert_eq!(assistant.tick(TickInput::new(0.0, FRAME, false)), TickStatus::Idle);
    assert_eq!(assistant.state(), PlayState::Loaded);
}

/// Plays at a steady frame rate from zero to `until`, delivering each input on
/// the first frame whose time reached it.
fn play(assistant: &mut TrackAssistant, inputs: &[InputEvent], until: f64) -> Vec<TickReport> {
    let mut pending = inputs.to_vec();
    pending.sort_by(|a, b| a.arrival_time.total_cmp(&b.arrival_time));
    let mut pending = pending.into_iter().peekable();
    let mut reports = Vec::new();

    let mut frame = 0_u32;
    loop {
        let raw_time = f64::from(frame) * FRAME;
        if raw_time > until {
            break;
        }
        while let Some(input) = pending.next_if(|input| input.arrival_time <= raw_time) {
            assistant.push_input(input);
        }
        if let TickStatus::Advanced(report) = assistant.tick(TickInput::new(raw_time, FRAME, true))
        {
            reports.push(report);
        }
        frame += 1;
    }
    reports
}

fn verdicts(assistant: &TrackAssistant, count: usize) -> Vec<Option<Verdict>> {
    (0..count).map(|index| assistant.verdict(NoteId(index))).collect()
}

fn record_notifications(assistant: &mut TrackAssistant) -> Arc<Mutex<Vec<Notification>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    assistant.subscribe(move |notification| {
        sink.lock().push(notification.clone());
    });
    log
}

#[test]
fn late_input_inside_forgiving_band_counts_as_hit() {
    let mut assistant = TrackAssistant::new(config_with_forgiving(0.2));
    let log = record_notifications(&mut assistant);
    start(&mut assistant, three_note_track());

    play(
        &mut assistant,
        &[
            InputEvent::new(PITCH_A, 0.02),
            InputEvent::new(PITCH_B, 1.15),
            InputEvent::new(PITCH_A, 2.01),
        ],
        3.0,
    );

    assert_eq!(
        verdicts(&assistant, 3),
        vec![Some(Verdict::Hit), Some(Verdict::Late), Some(Verdict::Hit)]
    );
    assert_eq!(assistant.state(), PlayState::Completed);
    assert_eq!(assistant.score().final_accuracy, Some(1.0));

    let scores = log
        .lock()
        .iter()
        .filter(|notification| matches!(notification, Notification::ScoreAvailable(_)))
        .count();
    assert_eq!(scores, 1, "score is announced exactly once per playthrough");
}

#[test]
fn late_input_outside_narrow_forgiving_band_is_missed() {
    let mut assistant = TrackAssistant::new(config_with_forgiving(0.12));
    start(&mut assistant, three_note_track());

    play(
        &mut assistant,
        &[
            InputEvent::new(PITCH_A, 0.02),
            InputEvent::new(PITCH_B, 1.15),
            InputEvent::new(PITCH_A, 2.01),
        ],
        3.0,
    );

    assert_eq!(
        verdicts(&assistant, 3),
        vec![Some(Verdict::Hit), Some(Verdict::Missed), Some(Verdict::Hit)]
    );
    let final_accuracy = assistant.score().final_accuracy.expect("score latched");
    assert!(final_accuracy >= 0.66);
    assert!(final_accuracy < 0.67);
}

#[test]
fn input_drained_after_late_edge_keeps_its_arrival_verdict() {
    let mut assistant = TrackAssistant::default();
    start(&mut assistant, raw_track(&[(PITCH_A, 0.0), (PITCH_B, 1.0)]));

    let step = 0.05;
    for frame in 0..=23_u32 {
        assistant.tick(TickInput::new(f64::from(frame) * step, step, true));
    }
    assert_eq!(assistant.verdict(NoteId(0)), Some(Verdict::Missed));
    assert_eq!(assistant.verdict(NoteId(1)), None);

    assistant.push_input(InputEvent::new(PITCH_B, 1.19));
    let status = assistant.tick(TickInput::new(1.21, 0.06, true));
    let report = status.report().expect("tick advanced");

    assert!(!report.window.is_active(NoteId(1)));
    assert!(report.strays.is_empty());
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].note, NoteId(1));
    assert_eq!(report.outcomes[0].verdict, Verdict::Late);
    assert!((report.outcomes[0].timing_error - 0.19).abs() < 1e-9);
    assert_eq!(assistant.verdict(NoteId(1)), Some(Verdict::Late));
    assert_eq!(assistant.state(), PlayState::Completed);
    assert_eq!(assistant.score().final_accuracy, Some(0.5));
}

#[test]
fn silent_performance_misses_every_note() {
    let mut assistant = TrackAssistant::default();
    start(&mut assistant, three_note_track());

    let reports = play(&mut assistant, &[], 3.0);

    assert_eq!(verdicts(&assistant, 3), vec![Some(Verdict::Missed); 3]);
    assert_eq!(assistant.score().final_accuracy, Some(0.0));
    assert_eq!(assistant.score().tally.missed, 3);

    let forced = reports
        .iter()
        .flat_map(|report| report.outcomes.iter())
        .collect::<Vec<_>>();
    assert_eq!(forced.len(), 3);
    assert!(
        forced
            .iter()
            .all(|outcome| outcome.timing_error > EngineConfig::default().cue.late_tolerance)
    );
}

#[test]
fn duplicate_input_after_hit_is_stray_and_keeps_score() {
    let mut assistant = TrackAssistant::default();
    start(&mut assistant, three_note_track());

    play(&mut assistant, &[InputEvent::new(PITCH_A, 0.0)], 0.05);
    let score_before = *assistant.score();
    assert_eq!(assistant.verdict(NoteId(0)), Some(Verdict::Hit));

    assistant.push_input(InputEvent::new(PITCH_A, 0.06));
    let status = assistant.tick(TickInput::new(0.06, FRAME, true));
    let report = status.report().expect("tick advanced");

    assert!(report.outcomes.is_empty());
    assert_eq!(report.strays.len(), 1);
    assert_eq!(report.strays[0].reason, StrayReason::AlreadyResolved);
    assert_eq!(assistant.score().notes_resolved, score_before.notes_resolved);
    assert_eq!(assistant.score().notes_hit, score_before.notes_hit);
    assert_eq!(assistant.stats().stray_inputs, 1);
}

#[test]
fn signalled_restart_snaps_clock_and_recomputes_window() {
    let config = EngineConfig::default();
    let mut assistant = TrackAssistant::new(config);
    let onsets = (0..10).map(|beat| (PITCH_A, f64::from(beat))).collect::<Vec<_>>();
    start(&mut assistant, raw_track(&onsets));

    play(&mut assistant, &[], 7.0);
    let before = assistant.clock().smoothed_time;
    assert!(before > 6.9);

    let status = assistant.tick(TickInput::new(before - 5.0, FRAME, true).with_seek(true));
    let report = status.report().expect("tick advanced");

    assert_eq!(report.clock_step, ClockStep::Resynced { anomaly: false });
    assert!((report.clock.smoothed_time - (before - 5.0)).abs() < 1e-12);
    let track = assistant.track().expect("track loaded");
    let expected = CueScheduler::new(config.cue).query_default(track, before - 5.0);
    assert_eq!(report.window, expected);
    assert_eq!(assistant.stats().clock_anomalies, 0);
}

#[test]
fn unsignalled_backward_jump_is_counted_as_anomaly() {
    let mut assistant = TrackAssistant::default();
    let onsets = (0..10).map(|beat| (PITCH_A, f64::from(beat))).collect::<Vec<_>>();
    start(&mut assistant, raw_track(&onsets));

    play(&mut assistant, &[], 6.0);
    let status = assistant.tick(TickInput::new(1.0, FRAME, true));
    let report = status.report().expect("tick advanced");

    assert!(report.clock_step.is_anomaly());
    assert!((report.clock.smoothed_time - 1.0).abs() < 1e-12);
    assert_eq!(assistant.stats().clock_anomalies, 1);
}

#[test]
fn importing_mid_playthrough_resets_score_and_loads() {
    let mut assistant = TrackAssistant::default();
    let log = record_notifications(&mut assistant);
    start(&mut assistant, three_note_track());

    play(&mut assistant, &[InputEvent::new(PITCH_A, 0.0)], 1.5);
    assert_eq!(assistant.state(), PlayState::Playing);
    assert!(assistant.score().notes_resolved > 0);

    let replacement = assistant
        .import_track(raw_track(&[(PITCH_B, 0.5)]))
        .expect("replacement is valid");
    let status = assistant.tick(TickInput::new(1.5 + FRAME, FRAME, true));

    assert_eq!(status, TickStatus::Idle);
    assert_eq!(assistant.state(), PlayState::Loaded);
    assert_eq!(assistant.score().notes_resolved, 0);
    assert_eq!(assistant.score().running_accuracy, 0.0);
    assert_eq!(
        assistant.track().map(|track| track.id()),
        Some(replacement.id())
    );

    let log = log.lock();
    let tail = &log[log.len() - 2..];
    assert_eq!(tail[0], Notification::TrackChanged(Some(replacement)));
    assert_eq!(tail[1], Notification::PlayChanged(false));
}

#[test]
fn lookahead_boundary_note_becomes_active_near_its_onset() {
    let config = EngineConfig::default();
    let mut assistant = TrackAssistant::new(config);
    start(&mut assistant, raw_track(&[(PITCH_A, 0.0), (PITCH_B, 3.0)]));

    let target = NoteId(1);
    let lookahead = config.cue.lookahead_seconds;
    let hit = config.judge.hit_tolerance;
    let step = 0.25;

    let mut saw_upcoming_at_boundary = false;
    let mut saw_active = false;
    for frame in 0..=13_u32 {
        let time = f64::from(frame) * step;
        let status = assistant.tick(TickInput::new(time, step, true));
        let report = status.report().expect("tick advanced");
        let window = &report.window;

        if (window.time + lookahead - 3.0).abs() < 1e-12 {
            assert!(window.upcoming.contains(&target));
            saw_upcoming_at_boundary = true;
        }
        if (3.0 - window.time).abs() <= hit {
            assert!(window.is_active(target));
            saw_active = true;
        }
    }
    assert!(saw_upcoming_at_boundary);
    assert!(saw_active);
}

#[test]
fn stop_and_restart_begins_a_fresh_playthrough() {
    let mut assistant = TrackAssistant::default();
    start(&mut assistant, three_note_track());

    play(&mut assistant, &[], 3.0);
    assert_eq!(assistant.state(), PlayState::Completed);

    assistant.tick(TickInput::new(3.1, FRAME, false));
    assert_eq!(assistant.state(), PlayState::Loaded);
    assert_eq!(assistant.score().final_accuracy, Some(0.0));

    let status = assistant.tick(TickInput::new(0.0, FRAME, true));
    assert_eq!(assistant.state(), PlayState::Playing);
    assert_eq!(assistant.score().notes_resolved, 0);
    assert_eq!(
        status.report().map(|report| report.clock_step),
        Some(ClockStep::Started)
    );
}
