use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;

use crate::browser::Locator;
use crate::error::{AppError, Result};

pub const LISTING_URL: &str = "https://betboom.ru/";
pub const WEBDRIVER_URL: &str = "http://localhost:9515";
pub const DATA_DIR: &str = "data";
pub const MATCHES_FILE: &str = "matches.csv";

/// Reference frame for schedule text, launch arguments and polling windows.
/// The source site renders kick-off times in Moscow time (UTC+3).
pub const REFERENCE_UTC_OFFSET_MINUTES: i32 = 180;

/// Pause between discovery + scheduling passes (seconds).
pub const CYCLE_INTERVAL_SECS: u64 = 3600;

/// Cadence of odds captures inside a polling window (seconds).
pub const POLL_INTERVAL_SECS: u64 = 60;

/// Polling starts this many minutes before the scheduled start.
pub const PRE_ROLL_MINUTES: i64 = 10;

/// Assumed event length when computing the end of a polling window.
pub const EVENT_DURATION_MINUTES: i64 = 80;

/// How often a waiting worker re-checks whether its window has opened.
pub const WAIT_CHECK_MILLIS: u64 = 1000;

/// Page-wait bounds.
pub mod timeouts {
    pub const LISTING_MS: u64 = 20_000;
    pub const DETAIL_HEADER_MS: u64 = 15_000;
    pub const TOTALS_TAB_MS: u64 = 7_000;
}

/// Settle delays after page actions.
pub mod settle {
    pub const CARDS_MS: u64 = 2_000;
    pub const SCROLL_MS: u64 = 500;
    pub const DETAIL_MS: u64 = 2_000;
    pub const TOTALS_MS: u64 = 4_000;
}

#[derive(Debug, Clone)]
pub struct Timing {
    pub cycle_interval: Duration,
    pub poll_interval: Duration,
    pub pre_roll: chrono::Duration,
    pub event_duration: chrono::Duration,
    pub wait_check: Duration,
    pub listing_timeout: Duration,
    pub detail_timeout: Duration,
    pub totals_timeout: Duration,
    pub cards_settle: Duration,
    pub scroll_settle: Duration,
    pub detail_settle: Duration,
    pub totals_settle: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(CYCLE_INTERVAL_SECS),
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
            pre_roll: chrono::Duration::minutes(PRE_ROLL_MINUTES),
            event_duration: chrono::Duration::minutes(EVENT_DURATION_MINUTES),
            wait_check: Duration::from_millis(WAIT_CHECK_MILLIS),
            listing_timeout: Duration::from_millis(timeouts::LISTING_MS),
            detail_timeout: Duration::from_millis(timeouts::DETAIL_HEADER_MS),
            totals_timeout: Duration::from_millis(timeouts::TOTALS_TAB_MS),
            cards_settle: Duration::from_millis(settle::CARDS_MS),
            scroll_settle: Duration::from_millis(settle::SCROLL_MS),
            detail_settle: Duration::from_millis(settle::DETAIL_MS),
            totals_settle: Duration::from_millis(settle::TOTALS_MS),
        }
    }
}

impl Timing {
    /// Zero settle delays and short waits, for driving fakes in tests.
    #[cfg(test)]
    pub fn immediate() -> Self {
        Self {
            cycle_interval: Duration::ZERO,
            poll_interval: Duration::from_secs(60),
            wait_check: Duration::from_secs(1),
            listing_timeout: Duration::from_millis(5),
            detail_timeout: Duration::from_millis(5),
            totals_timeout: Duration::from_millis(5),
            cards_settle: Duration::ZERO,
            scroll_settle: Duration::ZERO,
            detail_settle: Duration::ZERO,
            totals_settle: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Page locators. Class prefixes track the site's hashed CSS module names.
#[derive(Debug, Clone)]
pub struct Selectors {
    pub category_button: Locator,
    pub match_card: Locator,
    pub card_time: Locator,
    pub card_teams: Locator,
    pub page_header: Locator,
    pub totals_tab: Locator,
    pub odds_block: Locator,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            category_button: Locator::css(r#"button[data-at-title="Баскетбол"]"#),
            match_card: Locator::css("div[class^='Ur2bE-']"),
            card_time: Locator::css("time[class^='dHlnp-']"),
            card_teams: Locator::css("span[class^='rzys6-']"),
            page_header: Locator::css("header"),
            totals_tab: Locator::xpath("//button[contains(normalize-space(.), 'Тотал')]"),
            odds_block: Locator::css("div"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub data_dir: PathBuf,
    pub listing_url: String,
    pub webdriver_url: String,
    pub headless: bool,
    /// Program started for each polling worker; defaults to this executable.
    pub worker_program: Option<PathBuf>,
    pub reference_offset: FixedOffset,
    pub timing: Timing,
    pub selectors: Selectors,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let offset_minutes = env_parse("REFERENCE_UTC_OFFSET_MINUTES", REFERENCE_UTC_OFFSET_MINUTES)?;
        let reference_offset = reference_offset(offset_minutes)?;

        let timing = Timing {
            cycle_interval: Duration::from_secs(env_parse("CYCLE_INTERVAL_SECS", CYCLE_INTERVAL_SECS)?),
            poll_interval: Duration::from_secs(env_parse("POLL_INTERVAL_SECS", POLL_INTERVAL_SECS)?),
            pre_roll: chrono::Duration::minutes(env_parse("PRE_ROLL_MINUTES", PRE_ROLL_MINUTES)?),
            event_duration: chrono::Duration::minutes(env_parse(
                "EVENT_DURATION_MINUTES",
                EVENT_DURATION_MINUTES,
            )?),
            wait_check: Duration::from_millis(env_parse("WAIT_CHECK_MILLIS", WAIT_CHECK_MILLIS)?),
            ..Timing::default()
        };
        if timing.poll_interval.is_zero() {
            return Err(AppError::Config("POLL_INTERVAL_SECS must be positive".to_string()));
        }

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| DATA_DIR.to_string())
                .into(),
            listing_url: std::env::var("LISTING_URL").unwrap_or_else(|_| LISTING_URL.to_string()),
            webdriver_url: std::env::var("WEBDRIVER_URL")
                .unwrap_or_else(|_| WEBDRIVER_URL.to_string()),
            headless: env_parse("BROWSER_HEADLESS", true)?,
            worker_program: std::env::var("WORKER_PROGRAM").ok().map(PathBuf::from),
            reference_offset,
            timing,
            selectors: Selectors::default(),
        })
    }

    pub fn matches_path(&self) -> PathBuf {
        self.data_dir.join(MATCHES_FILE)
    }
}

fn reference_offset(minutes: i32) -> Result<FixedOffset> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| {
            AppError::Config(format!("REFERENCE_UTC_OFFSET_MINUTES out of range: {minutes}"))
        })
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} has invalid value {raw:?}"))),
        Err(_) => Ok(default),
    }
}
