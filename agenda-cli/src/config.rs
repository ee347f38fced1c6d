use agenda_core::{EngineConfig, FixedIdentity};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::state::config_path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub holidays: HolidaysSection,
    #[serde(default)]
    pub identity: IdentitySection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HolidayProvider {
    /// Only the dates listed in `dates`.
    #[default]
    Static,
    /// Public holidays from date.nager.at.
    Nager,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HolidaysSection {
    pub provider: HolidayProvider,
    /// ISO 3166-1 alpha-2, used by the `nager` provider.
    pub country_code: String,
    pub dates: Vec<NaiveDate>,
    pub timeout_secs: u64,
}

impl Default for HolidaysSection {
    fn default() -> Self {
        Self {
            provider: HolidayProvider::Static,
            country_code: "JP".to_string(),
            dates: Vec::new(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentitySection {
    pub email: Option<String>,
}

impl IdentitySection {
    /// Configured address, else `$USER@localhost`.
    pub fn resolve(&self) -> FixedIdentity {
        let email = self
            .email
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                let user = std::env::var("USER").unwrap_or_else(|_| "agenda".to_string());
                format!("{user}@localhost")
            });
        FixedIdentity(email)
    }
}

pub fn load_config() -> Result<Config> {
    load_from(&config_path()?)
}

pub fn load_from(p: &Path) -> Result<Config> {
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_config(cfg: &Config) -> Result<()> {
    let p = config_path()?;
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&Config::default())?;
    println!("Wrote {}", p.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_are_optional() {
        let cfg: Config = toml::from_str(
            r#"
[engine]
timezone = "Europe/Berlin"
windows = ["08:00-12:00"]

[holidays]
provider = "nager"
country_code = "DE"
"#,
        )
        .unwrap();
        assert_eq!(cfg.engine.timezone, chrono_tz::Europe::Berlin);
        assert_eq!(cfg.engine.min_gap_minutes, 15);
        assert_eq!(cfg.holidays.provider, HolidayProvider::Nager);
        assert_eq!(cfg.holidays.timeout_secs, 10);
        assert_eq!(cfg.identity.email, None);
    }

    #[test]
    fn default_config_survives_toml() {
        let mut cfg = Config::default();
        cfg.holidays.dates = vec![NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()];
        cfg.identity.email = Some("me@example.com".into());
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert_eq!(toml::from_str::<Config>(&text).unwrap(), cfg);
    }

    #[test]
    fn identity_prefers_configured_email() {
        let id = IdentitySection {
            email: Some(" me@example.com ".into()),
        };
        assert_eq!(id.resolve().0, "me@example.com");
        let fallback = IdentitySection { email: Some("  ".into()) }.resolve();
        assert!(fallback.0.ends_with("@localhost"));
    }
}
