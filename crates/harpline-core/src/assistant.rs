use std::{collections::VecDeque, mem, sync::Arc};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument, trace};

use crate::{
    clock::{ClockAdapter, ClockSample, ClockStep, PerformanceClock},
    config::EngineConfig,
    cue::{CueScheduler, CueWindow},
    model::{NoteId, RawTrack, Track, TrackError},
    reconcile::{
        InputEvent, InputReconciler, ReconcileError, ReconciliationOutcome, ResolutionLedger,
        StrayInput, Verdict,
    },
    score::{ScoreState, Scorer},
};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TickError {
    #[error("playing without a loaded track")]
    TrackMissing,
    #[error("resolution ledger tracks {ledger} notes but the track has {track}")]
    LedgerMismatch { ledger: usize, track: usize },
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayState {
    Idle,
    Loaded,
    Playing,
    Completed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    TrackChanged(Option<Arc<Track>>),
    PlayChanged(bool),
    ScoreAvailable(f64),
}

impl Notification {
    fn dispatch_rank(&self) -> u8 {
        match self {
            Self::TrackChanged(_) => 0,
            Self::PlayChanged(_) => 1,
            Self::ScoreAvailable(_) => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type Subscriber = Box<dyn FnMut(&Notification) + Send>;

#[derive(Debug, Clone)]
enum Inbound {
    Input(InputEvent),
    Track(Option<Arc<Track>>),
    Replay,
}

/// Cloneable handle for feeding the assistant from other callbacks.
#[derive(Debug, Clone, Default)]
pub struct AssistantInbox {
    queue: Arc<Mutex<VecDeque<Inbound>>>,
}

impl AssistantInbox {
    pub fn push_input(&self, input: InputEvent) {
        self.queue.lock().push_back(Inbound::Input(input));
    }

    pub fn push_inputs(&self, inputs: impl IntoIterator<Item = InputEvent>) {
        let mut queue = self.queue.lock();
        queue.extend(inputs.into_iter().map(Inbound::Input));
    }

    /// Validates on the caller's side; only well-formed tracks are queued.
    #[instrument(skip(self, raw), fields(name = %raw.name, notes = raw.notes.len()))]
    pub fn import_track(&self, raw: RawTrack) -> Result<Arc<Track>, TrackError> {
        let track = Arc::new(Track::load(raw)?);
        info!(track_id = %track.id(), "track imported");
        self.push_track(Arc::clone(&track));
        Ok(track)
    }

    pub fn push_track(&self, track: Arc<Track>) {
        self.queue.lock().push_back(Inbound::Track(Some(track)));
    }

    pub fn request_unload(&self) {
        self.queue.lock().push_back(Inbound::Track(None));
    }

    pub fn request_replay(&self) {
        self.queue.lock().push_back(Inbound::Replay);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    fn drain(&self) -> VecDeque<Inbound> {
        mem::take(&mut *self.queue.lock())
    }
}

/// Snapshot of the host handed to every tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickInput {
    pub clock: ClockSample,
    pub playing: bool,
}

impl TickInput {
    #[must_use]
    pub fn new(raw_time: f64, dt: f64, playing: bool) -> Self {
        Self {
            clock: ClockSample::new(raw_time, dt),
            playing,
        }
    }

    #[must_use]
    pub fn with_seek(mut self, seek: bool) -> Self {
        self.clock.seek = seek;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub clock: PerformanceClock,
    pub clock_step: ClockStep,
    pub window: CueWindow,
    pub outcomes: Vec<ReconciliationOutcome>,
    pub strays: Vec<StrayInput>,
    pub score: ScoreState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickStatus {
    /// Not playing; only queued commands and play-state edges were handled.
    Idle,
    Advanced(TickReport),
    Failed(TickError),
}

impl TickStatus {
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    #[must_use]
    pub fn report(&self) -> Option<&TickReport> {
        match self {
            Self::Advanced(report) => Some(report),
            Self::Idle | Self::Failed(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssistantStats {
    pub ticks: u64,
    pub failed_ticks: u64,
    pub stray_inputs: u64,
    pub dropped_inputs: u64,
    pub clock_anomalies: u64,
}

struct TickPlan {
    clock: PerformanceClock,
    clock_step: ClockStep,
    window: CueWindow,
    outcomes: Vec<ReconciliationOutcome>,
    strays: Vec<StrayInput>,
    score: ScoreState,
}

pub struct TrackAssistant {
    config: EngineConfig,
    clock: ClockAdapter,
    scheduler: CueScheduler,
    reconciler: InputReconciler,
    scorer: Scorer,
    ledger: ResolutionLedger,
    track: Option<Arc<Track>>,
    state: PlayState,
    play_signal: bool,
    inbox: AssistantInbox,
    subscribers: Vec<(SubscriberId, Subscriber)>,
    next_subscriber: u64,
    stats: AssistantStats,
}

impl Default for TrackAssistant {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl TrackAssistant {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            clock: ClockAdapter::new(config.clock),
            scheduler: CueScheduler::new(config.cue),
            reconciler: InputReconciler::new(config.judge),
            scorer: Scorer::default(),
            ledger: ResolutionLedger::default(),
            track: None,
            state: PlayState::Idle,
            play_signal: false,
            inbox: AssistantInbox::default(),
            subscribers: Vec::new(),
            next_subscriber: 0,
            stats: AssistantStats::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn inbox(&self) -> AssistantInbox {
        self.inbox.clone()
    }

    #[must_use]
    pub fn state(&self) -> PlayState {
        self.state
    }

    #[must_use]
    pub fn track(&self) -> Option<&Arc<Track>> {
        self.track.as_ref()
    }

    #[must_use]
    pub fn score(&self) -> &ScoreState {
        self.scorer.state()
    }

    #[must_use]
    pub fn clock(&self) -> &PerformanceClock {
        self.clock.clock()
    }

    #[must_use]
    pub fn stats(&self) -> &AssistantStats {
        &self.stats
    }

    #[must_use]
    pub fn verdict(&self, note: NoteId) -> Option<Verdict> {
        self.ledger.verdict(note)
    }

    pub fn import_track(&self, raw: RawTrack) -> Result<Arc<Track>, TrackError> {
        self.inbox.import_track(raw)
    }

    pub fn push_input(&self, input: InputEvent) {
        self.inbox.push_input(input);
    }

    pub fn unload(&self) {
        self.inbox.request_unload();
    }

    pub fn replay(&self) {
        self.inbox.request_replay();
    }

    pub fn subscribe(
        &mut self,
        subscriber: impl FnMut(&Notification) + Send + 'static,
    ) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber);
        self.next_subscriber += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }

    /// Drains the inbox, then plans the frame and commits it only if planning
    /// succeeded. A failed tick leaves clock, ledger and score untouched.
    pub fn tick(&mut self, input: TickInput) -> TickStatus {
        self.stats.ticks += 1;
        let mut notifications = Vec::new();

        let mut inputs = Vec::new();
        for item in self.inbox.drain() {
            match item {
                Inbound::Input(event) => inputs.push(event),
                Inbound::Track(track) => {
                    self.stats.dropped_inputs += inputs.len() as u64;
                    inputs.clear();
                    self.apply_track(track, &mut notifications);
                }
                Inbound::Replay => {
                    self.stats.dropped_inputs += inputs.len() as u64;
                    inputs.clear();
                    self.apply_replay(&mut notifications);
                }
            }
        }

        self.apply_play_signal(input.playing, &mut notifications);

        let status = if self.state == PlayState::Playing {
            match self.plan(input.clock, &inputs) {
                Ok(plan) => TickStatus::Advanced(self.commit(plan, &mut notifications)),
                Err(error) => {
                    self.stats.failed_ticks += 1;
                    self.stats.dropped_inputs += inputs.len() as u64;
                    error!(tick = self.stats.ticks, %error, "tick abandoned");
                    TickStatus::Failed(error)
                }
            }
        } else {
            if !inputs.is_empty() {
                trace!(count = inputs.len(), state = ?self.state, "inputs dropped outside playback");
                self.stats.dropped_inputs += inputs.len() as u64;
            }
            TickStatus::Idle
        };

        self.dispatch(notifications);
        status
    }

    fn plan(&self, sample: ClockSample, inputs: &[InputEvent]) -> Result<TickPlan, TickError> {
        let track = self.track.as_ref().ok_or(TickError::TrackMissing)?;
        if self.ledger.len() != track.note_count() {
            return Err(TickError::LedgerMismatch {
                ledger: self.ledger.len(),
                track: track.note_count(),
            });
        }

        let (clock, clock_step) = self.clock.peek(sample);
        let window = self.scheduler.query_default(track, clock.smoothed_time);

        // Inputs are matched at their arrival time, so one that arrived inside
        // the late tolerance still claims its note when the tick lands past it.
        let reconciliation = self
            .reconciler
            .resolve(track, &self.scheduler, &self.ledger, inputs)?;
        let mut outcomes = self
            .ledger
            .aged_out(track, &window, &reconciliation.outcomes)?;
        outcomes.extend(reconciliation.outcomes);
        self.ledger.validate(&outcomes)?;

        let score = self.scorer.preview(&outcomes);
        Ok(TickPlan {
            clock,
            clock_step,
            window,
            outcomes,
            strays: reconciliation.strays,
            score,
        })
    }

    fn commit(&mut self, plan: TickPlan, notifications: &mut Vec<Notification>) -> TickReport {
        self.clock.commit(plan.clock, plan.clock_step);
        if plan.clock_step.is_anomaly() {
            self.stats.clock_anomalies += 1;
        }
        self.ledger.apply(&plan.outcomes);
        self.scorer.commit(plan.score);
        self.stats.stray_inputs += plan.strays.len() as u64;

        if let Some(final_accuracy) = self.scorer.state().final_accuracy {
            self.state = PlayState::Completed;
            info!(final_accuracy, "performance completed");
            notifications.push(Notification::ScoreAvailable(final_accuracy));
        }

        TickReport {
            clock: *self.clock.clock(),
            clock_step: plan.clock_step,
            window: plan.window,
            outcomes: plan.outcomes,
            strays: plan.strays,
            score: *self.scorer.state(),
        }
    }

    fn apply_track(&mut self, track: Option<Arc<Track>>, notifications: &mut Vec<Notification>) {
        let was_active = matches!(self.state, PlayState::Playing | PlayState::Completed);
        let note_count = track.as_ref().map_or(0, |track| track.note_count());

        self.track = track.clone();
        self.reset_playthrough(note_count);
        self.state = if track.is_some() {
            PlayState::Loaded
        } else {
            PlayState::Idle
        };

        info!(
            track_id = ?track.as_ref().map(|track| track.id()),
            state = ?self.state,
            "track changed"
        );
        notifications.push(Notification::TrackChanged(track));
        if was_active {
            notifications.push(Notification::PlayChanged(false));
        }
    }

    fn apply_replay(&mut self, notifications: &mut Vec<Notification>) {
        let Some(track) = self.track.as_ref() else {
            debug!("replay ignored without a track");
            return;
        };
        let was_active = matches!(self.state, PlayState::Playing | PlayState::Completed);
        let note_count = track.note_count();
        self.reset_playthrough(note_count);
        self.state = PlayState::Loaded;
        // Re-arm so a host that is still playing starts a fresh playthrough.
        self.play_signal = false;
        info!("replay requested");
        if was_active {
            notifications.push(Notification::PlayChanged(false));
        }
    }

    fn apply_play_signal(&mut self, playing: bool, notifications: &mut Vec<Notification>) {
        let rising = playing && !self.play_signal;
        self.play_signal = playing;

        match self.state {
            PlayState::Loaded if rising => {
                // Hosts restart the song from the top on play, so every start is
                // a new playthrough. Outcomes kept by a stop are dropped here.
                let note_count = self.track.as_ref().map_or(0, |track| track.note_count());
                self.reset_playthrough(note_count);
                self.state = PlayState::Playing;
                info!("playback started");
                notifications.push(Notification::PlayChanged(true));
            }
            PlayState::Playing | PlayState::Completed if !playing => {
                self.state = PlayState::Loaded;
                info!(resolved = self.scorer.state().notes_resolved, "playback stopped");
                notifications.push(Notification::PlayChanged(false));
            }
            _ => {}
        }
    }

    fn reset_playthrough(&mut self, note_count: usize) {
        self.clock.reset();
        self.scorer.reset(note_count);
        self.ledger = ResolutionLedger::new(note_count);
    }

    fn dispatch(&mut self, mut notifications: Vec<Notification>) {
        if notifications.is_empty() {
            return;
        }
        notifications.sort_by_key(Notification::dispatch_rank);
        for notification in &notifications {
            trace!(?notification, "dispatching notification");
            for (_, subscriber) in &mut self.subscribers {
                subscriber(notification);
            }
        }
    }
}
