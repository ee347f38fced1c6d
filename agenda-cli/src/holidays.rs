//! Holiday providers selectable from `[holidays]` in config.toml.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use agenda_core::{HolidayOracle, SchedulerError, StaticHolidays};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{HolidayProvider, HolidaysSection};

const NAGER_BASE_URL: &str = "https://date.nager.at/api/v3";

/// How long a failed year is answered from cache before the API is retried.
const FAILURE_BACKOFF: Duration = Duration::from_secs(60);

enum YearEntry {
    Loaded(BTreeSet<NaiveDate>),
    Failed(Instant),
}

#[derive(Debug, Deserialize)]
struct PublicHoliday {
    date: NaiveDate,
}

fn parse_public_holidays(body: &str) -> serde_json::Result<BTreeSet<NaiveDate>> {
    let items: Vec<PublicHoliday> = serde_json::from_str(body)?;
    Ok(items.into_iter().map(|h| h.date).collect())
}

/// Public holidays from the Nager.Date API, cached per year.
pub struct NagerHolidays {
    client: reqwest::Client,
    base_url: String,
    country_code: String,
    extra: BTreeSet<NaiveDate>,
    cache: Mutex<HashMap<i32, YearEntry>>,
}

impl NagerHolidays {
    pub fn new(country_code: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            client,
            base_url: NAGER_BASE_URL.to_string(),
            country_code: country_code.trim().to_uppercase(),
            extra: BTreeSet::new(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Additional local holidays on top of the public ones.
    pub fn with_extra_dates(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.extra.extend(dates);
        self
    }

    async fn fetch_year(&self, year: i32) -> agenda_core::Result<BTreeSet<NaiveDate>> {
        let url = format!("{}/PublicHolidays/{}/{}", self.base_url, year, self.country_code);
        debug!(%url, "fetching public holidays");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SchedulerError::backend(format!("holiday request failed: {e}")))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| SchedulerError::backend(format!("holiday response unreadable: {e}")))?;
        if !status.is_success() {
            return Err(SchedulerError::backend(format!(
                "holiday API returned {status} for {year}/{}",
                self.country_code
            )));
        }
        parse_public_holidays(&body)
            .map_err(|e| SchedulerError::backend(format!("holiday response malformed: {e}")))
    }
}

#[async_trait]
impl HolidayOracle for NagerHolidays {
    async fn is_holiday(&self, date: NaiveDate) -> agenda_core::Result<bool> {
        if self.extra.contains(&date) {
            return Ok(true);
        }
        let year = date.year();
        match self.cache.lock().await.get(&year) {
            Some(YearEntry::Loaded(days)) => return Ok(days.contains(&date)),
            Some(YearEntry::Failed(at)) if at.elapsed() < FAILURE_BACKOFF => {
                return Err(SchedulerError::backend(format!(
                    "holiday lookup for {year} failed recently"
                )));
            }
            _ => {}
        }

        // Lock is not held across the request.
        let fetched = self.fetch_year(year).await;
        let mut cache = self.cache.lock().await;
        match fetched {
            Ok(days) => {
                let hit = days.contains(&date);
                cache.insert(year, YearEntry::Loaded(days));
                Ok(hit)
            }
            Err(e) => {
                cache.insert(year, YearEntry::Failed(Instant::now()));
                Err(e)
            }
        }
    }
}

pub fn holiday_oracle(section: &HolidaysSection) -> Result<Arc<dyn HolidayOracle>> {
    let dates = section.dates.iter().copied();
    Ok(match section.provider {
        HolidayProvider::Static => Arc::new(StaticHolidays::new(dates)),
        HolidayProvider::Nager => Arc::new(
            NagerHolidays::new(&section.country_code, Duration::from_secs(section.timeout_secs.max(1)))?
                .with_extra_dates(dates),
        ),
    })
}
