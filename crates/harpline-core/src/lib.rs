pub mod assistant;
pub mod clock;
pub mod config;
pub mod cue;
pub mod diagnostics;
pub mod fixtures;
pub mod model;
pub mod persistence;
pub mod reconcile;
pub mod replay;
pub mod score;
pub mod time;

pub use assistant::{
    AssistantInbox, AssistantStats, Notification, PlayState, SubscriberId, TickError, TickInput,
    TickReport, TickStatus, TrackAssistant,
};
pub use clock::{
    ClockAdapter, ClockSample, ClockSettings, ClockStep, PerformanceClock, smooth_step,
};
pub use config::{ConfigError, EngineConfig};
pub use cue::{CueScheduler, CueSettings, CueWindow};
pub use diagnostics::{TelemetryGuard, init_tracing, init_tracing_with_options};
pub use model::{NoteEvent, NoteId, RawNote, RawTrack, TickNote, Track, TrackError};
pub use reconcile::{
    InputEvent, InputReconciler, JudgeWindows, ReconcileError, Reconciliation,
    ReconciliationOutcome, ResolutionLedger, StrayInput, StrayReason, Verdict,
};
pub use replay::{
    NotificationRecord, PerformanceScript, ReplayReport, ScriptFrame, replay_script,
};
pub use score::{ScoreState, Scorer, VerdictTally};
