use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

pub const DEFAULT_MAX_RATE_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_RESYNC_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockSettings {
    pub max_rate_multiplier: f64,
    pub resync_threshold: f64,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            max_rate_multiplier: DEFAULT_MAX_RATE_MULTIPLIER,
            resync_threshold: DEFAULT_RESYNC_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceClock {
    pub raw_time: f64,
    pub smoothed_time: f64,
    pub last_delta: f64,
    pub primed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockSample {
    pub raw_time: f64,
    pub dt: f64,
    /// Set by the host when it knows the position jumped (restart, seek).
    #[serde(default)]
    pub seek: bool,
}

impl ClockSample {
    #[must_use]
    pub fn new(raw_time: f64, dt: f64) -> Self {
        Self {
            raw_time,
            dt,
            seek: false,
        }
    }

    #[must_use]
    pub fn with_seek(mut self, seek: bool) -> Self {
        self.seek = seek;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockStep {
    Started,
    Smoothed,
    /// Raw time sat behind smoothed time; smoothed time was held.
    Held,
    Resynced { anomaly: bool },
    Rejected,
}

impl ClockStep {
    #[must_use]
    pub fn is_resync(self) -> bool {
        matches!(self, Self::Started | Self::Resynced { .. })
    }

    #[must_use]
    pub fn is_anomaly(self) -> bool {
        matches!(self, Self::Resynced { anomaly: true })
    }
}

/// Computes the next clock state without touching the current one.
#[must_use]
pub fn smooth_step(
    clock: &PerformanceClock,
    sample: ClockSample,
    settings: &ClockSettings,
) -> (PerformanceClock, ClockStep) {
    if !sample.raw_time.is_finite() {
        return (
            PerformanceClock {
                last_delta: 0.0,
                ..*clock
            },
            ClockStep::Rejected,
        );
    }

    let snap = |step| {
        (
            PerformanceClock {
                raw_time: sample.raw_time,
                smoothed_time: sample.raw_time,
                last_delta: if clock.primed {
                    sample.raw_time - clock.smoothed_time
                } else {
                    0.0
                },
                primed: true,
            },
            step,
        )
    };

    if !clock.primed {
        return snap(ClockStep::Started);
    }

    let error = sample.raw_time - clock.smoothed_time;
    if sample.seek {
        return snap(ClockStep::Resynced { anomaly: false });
    }
    if error.abs() > settings.resync_threshold {
        return snap(ClockStep::Resynced {
            anomaly: error < 0.0,
        });
    }

    let dt = if sample.dt.is_finite() {
        sample.dt.max(0.0)
    } else {
        0.0
    };
    let max_step = dt * settings.max_rate_multiplier.max(0.0);
    let step = error.clamp(-max_step, max_step).max(0.0);

    let next = PerformanceClock {
        raw_time: sample.raw_time,
        smoothed_time: clock.smoothed_time + step,
        last_delta: step,
        primed: true,
    };
    let kind = if error < 0.0 {
        ClockStep::Held
    } else {
        ClockStep::Smoothed
    };
    (next, kind)
}

#[derive(Debug, Clone, Default)]
pub struct ClockAdapter {
    settings: ClockSettings,
    clock: PerformanceClock,
}

impl ClockAdapter {
    #[must_use]
    pub fn new(settings: ClockSettings) -> Self {
        Self {
            settings,
            clock: PerformanceClock::default(),
        }
    }

    #[must_use]
    pub fn clock(&self) -> &PerformanceClock {
        &self.clock
    }

    #[must_use]
    pub fn smoothed_time(&self) -> f64 {
        self.clock.smoothed_time
    }

    #[must_use]
    pub fn settings(&self) -> &ClockSettings {
        &self.settings
    }

    pub fn advance(&mut self, raw_time: f64, dt: f64) -> f64 {
        self.advance_sample(ClockSample::new(raw_time, dt));
        self.clock.smoothed_time
    }

    pub fn advance_sample(&mut self, sample: ClockSample) -> ClockStep {
        let (next, step) = self.peek(sample);
        self.commit(next, step);
        step
    }

    #[must_use]
    pub fn peek(&self, sample: ClockSample) -> (PerformanceClock, ClockStep) {
        smooth_step(&self.clock, sample, &self.settings)
    }

    pub fn commit(&mut self, next: PerformanceClock, step: ClockStep) {
        match step {
            ClockStep::Resynced { anomaly: true } => warn!(
                raw_time = next.raw_time,
                previous = self.clock.smoothed_time,
                "clock jumped backwards without a seek signal, resyncing"
            ),
            ClockStep::Resynced { anomaly: false } => debug!(
                raw_time = next.raw_time,
                previous = self.clock.smoothed_time,
                "clock resynced"
            ),
            ClockStep::Rejected => warn!("ignored non-finite clock sample"),
            ClockStep::Started | ClockStep::Smoothed | ClockStep::Held => {
                trace!(smoothed = next.smoothed_time, raw = next.raw_time, "clock advanced");
            }
        }
        self.clock = next;
    }

    pub fn reset(&mut self) {
        self.clock = PerformanceClock::default();
    }
}
