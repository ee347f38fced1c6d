use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// `$AGENDA_HOME`, or `~/.agenda`.
pub fn agenda_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("AGENDA_HOME") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".agenda"))
}

pub fn ensure_agenda_home() -> Result<PathBuf> {
    let dir = agenda_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_agenda_home()?.join("config.toml"))
}

pub fn calendar_path() -> Result<PathBuf> {
    Ok(ensure_agenda_home()?.join("calendar.json"))
}
