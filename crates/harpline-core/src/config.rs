use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{clock::ClockSettings, cue::CueSettings, reconcile::JudgeWindows};

pub const CONFIG_FILE_NAME: &str = "harpline.config.toml";
pub const CONFIG_PATH_ENV: &str = "HARPLINE_CONFIG_PATH";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be a finite, non-negative number (got {value})")]
    InvalidValue { field: &'static str, value: f64 },
    #[error("hit tolerance {hit} exceeds forgiving tolerance {forgiving}")]
    BandsInverted { hit: f64, forgiving: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub judge: JudgeWindows,
    pub clock: ClockSettings,
    pub cue: CueSettings,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("judge.hit_tolerance", self.judge.hit_tolerance),
            ("judge.forgiving_tolerance", self.judge.forgiving_tolerance),
            ("clock.max_rate_multiplier", self.clock.max_rate_multiplier),
            ("clock.resync_threshold", self.clock.resync_threshold),
            ("cue.lookahead_seconds", self.cue.lookahead_seconds),
            ("cue.early_tolerance", self.cue.early_tolerance),
            ("cue.late_tolerance", self.cue.late_tolerance),
        ];
        for (field, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidValue { field, value });
            }
        }
        if self.judge.hit_tolerance > self.judge.forgiving_tolerance {
            return Err(ConfigError::BandsInverted {
                hit: self.judge.hit_tolerance,
                forgiving: self.judge.forgiving_tolerance,
            });
        }
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(content).context("failed to parse engine config TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("invalid config in {}", path.display()))?;
        info!(path = %path.display(), "engine config loaded");
        Ok(config)
    }

    /// Loads the first config found via the env override, the cwd or its
    /// parent, along with the file it came from. Falls back to defaults when
    /// none exists.
    pub fn discover() -> Result<(Self, Option<PathBuf>)> {
        match discover_config_path()? {
            Some(path) => Ok((Self::load_from(&path)?, Some(path))),
            None => {
                debug!("no {CONFIG_FILE_NAME} found, using defaults");
                Ok((Self::default(), None))
            }
        }
    }
}

fn discover_config_path() -> Result<Option<PathBuf>> {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(Some(path));
        }
        anyhow::bail!("{CONFIG_PATH_ENV} points at a missing file: {}", path.display());
    }

    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let candidates = [
        cwd.join(CONFIG_FILE_NAME),
        cwd.join("..").join(CONFIG_FILE_NAME),
    ];

    Ok(candidates.into_iter().find(|path| path.is_file()))
}
