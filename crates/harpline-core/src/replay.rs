use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    assistant::{AssistantStats, Notification, PlayState, TickInput, TrackAssistant},
    config::EngineConfig,
    model::RawTrack,
    reconcile::InputEvent,
    score::ScoreState,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptFrame {
    pub dt: f64,
    pub raw_time: f64,
    pub playing: bool,
    #[serde(default)]
    pub seek: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceScript {
    pub track: RawTrack,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<EngineConfig>,
    pub frames: Vec<ScriptFrame>,
}

impl PerformanceScript {
    /// Builds a steady-clock script: one idle frame to load the track, then
    /// playback frames every `frame_dt` until `tail` seconds past the last
    /// note. Each input is delivered on the first frame whose time reached it.
    #[must_use]
    pub fn synthesize(
        track: RawTrack,
        inputs: &[InputEvent],
        frame_dt: f64,
        tail: f64,
    ) -> Self {
        let frame_dt = if frame_dt.is_finite() && frame_dt > 0.0 {
            frame_dt
        } else {
            1.0 / 60.0
        };
        let last_onset = track
            .notes
            .iter()
            .map(|note| note.onset)
            .fold(0.0_f64, f64::max);
        let end = last_onset + tail.max(0.0);

        let mut pending = inputs
            .iter()
            .copied()
            .filter(|input| input.arrival_time.is_finite())
            .collect::<Vec<_>>();
        pending.sort_by(|a, b| a.arrival_time.total_cmp(&b.arrival_time));
        let mut pending = pending.into_iter().peekable();

        let mut frames = vec![ScriptFrame {
            dt: frame_dt,
            raw_time: 0.0,
            playing: false,
            seek: false,
            inputs: Vec::new(),
        }];
        let mut step = 0_u32;
        loop {
            let raw_time = f64::from(step) * frame_dt;
            let mut due = Vec::new();
            while let Some(input) = pending.next_if(|input| input.arrival_time <= raw_time) {
                due.push(input);
            }
            frames.push(ScriptFrame {
                dt: frame_dt,
                raw_time,
                playing: true,
                seek: false,
                inputs: due,
            });
            if raw_time > end && pending.peek().is_none() {
                break;
            }
            step += 1;
        }

        Self {
            track,
            config: None,
            frames,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationRecord {
    TrackChanged {
        frame: usize,
        track_id: Option<Uuid>,
        name: Option<String>,
    },
    PlayChanged {
        frame: usize,
        playing: bool,
    },
    ScoreAvailable {
        frame: usize,
        final_accuracy: f64,
    },
}

impl NotificationRecord {
    fn from_notification(frame: usize, notification: &Notification) -> Self {
        match notification {
            Notification::TrackChanged(track) => Self::TrackChanged {
                frame,
                track_id: track.as_ref().map(|track| track.id()),
                name: track.as_ref().map(|track| track.name().to_string()),
            },
            Notification::PlayChanged(playing) => Self::PlayChanged {
                frame,
                playing: *playing,
            },
            Notification::ScoreAvailable(final_accuracy) => Self::ScoreAvailable {
                frame,
                final_accuracy: *final_accuracy,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub session_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub track_name: String,
    pub note_count: usize,
    pub frames: usize,
    pub final_state: PlayState,
    pub score: ScoreState,
    pub stats: AssistantStats,
    pub notifications: Vec<NotificationRecord>,
}

#[instrument(
    skip(script, fallback),
    fields(track = %script.track.name, frames = script.frames.len())
)]
pub fn replay_script(script: &PerformanceScript, fallback: &EngineConfig) -> Result<ReplayReport> {
    let config = script.config.unwrap_or(*fallback);
    config.validate().context("script engine config is invalid")?;

    let mut assistant = TrackAssistant::new(config);
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    assistant.subscribe(move |notification| sink.lock().push(notification.clone()));

    let track = assistant
        .import_track(script.track.clone())
        .context("script track is malformed")?;

    let mut notifications = Vec::new();
    for (frame_index, frame) in script.frames.iter().enumerate() {
        assistant.inbox().push_inputs(frame.inputs.iter().copied());
        let _status = assistant.tick(
            TickInput::new(frame.raw_time, frame.dt, frame.playing).with_seek(frame.seek),
        );
        notifications.extend(received.lock().drain(..).map(|notification| {
            NotificationRecord::from_notification(frame_index, &notification)
        }));
    }

    let report = ReplayReport {
        session_id: Uuid::new_v4(),
        generated_at: Utc::now(),
        track_name: track.name().to_string(),
        note_count: track.note_count(),
        frames: script.frames.len(),
        final_state: assistant.state(),
        score: *assistant.score(),
        stats: *assistant.stats(),
        notifications,
    };
    info!(
        final_state = ?report.final_state,
        final_accuracy = ?report.score.final_accuracy,
        "replay finished"
    );
    Ok(report)
}
