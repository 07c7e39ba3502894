use std::{fs, io::Write, path::Path};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, instrument};

use crate::replay::{PerformanceScript, ReplayReport};

fn write_json_atomic(path: &Path, value: &impl Serialize, what: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    let json = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize {what}"))?;
    let mut temp_file = tempfile::NamedTempFile::new_in(
        path.parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new(".")),
    )
    .with_context(|| format!("failed to create temp {what} file"))?;

    temp_file
        .write_all(&json)
        .with_context(|| format!("failed to write temp {what} file"))?;
    temp_file
        .persist(path)
        .map_err(|error| anyhow::anyhow!(error.error))
        .with_context(|| format!("failed to persist {what}: {}", path.display()))?;
    Ok(())
}

#[instrument(skip(script), fields(path = %path.display(), frames = script.frames.len()))]
pub fn save_script(path: &Path, script: &PerformanceScript) -> Result<()> {
    write_json_atomic(path, script, "performance script")?;
    info!("performance script saved");
    Ok(())
}

#[instrument(fields(path = %path.display()))]
pub fn load_script(path: &Path) -> Result<PerformanceScript> {
    let content =
        fs::read(path).with_context(|| format!("failed to read script: {}", path.display()))?;
    let script: PerformanceScript =
        serde_json::from_slice(&content).context("invalid performance script json")?;
    info!(frames = script.frames.len(), "performance script loaded");
    Ok(script)
}

#[instrument(skip(report), fields(path = %path.display(), session_id = %report.session_id))]
pub fn save_report(path: &Path, report: &ReplayReport) -> Result<()> {
    write_json_atomic(path, report, "replay report")?;
    info!("replay report saved");
    Ok(())
}

pub fn load_report(path: &Path) -> Result<ReplayReport> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read report: {}", path.display()))?;
    serde_json::from_slice(&bytes).context("invalid replay report json")
}
