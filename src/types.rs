use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Wire format for every timestamp the system writes or accepts.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_ts(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_ts(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).ok()
}

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

/// One discovered event. `url` is the identity key across the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub title: String,
    pub url: String,
    pub schedule: Schedule,
    pub status: MatchStatus,
}

impl Match {
    pub fn discovered(title: String, url: String, schedule: Schedule) -> Self {
        Self {
            title,
            url,
            schedule,
            status: MatchStatus::Undetermined,
        }
    }
}

/// Absolute start time, or whatever text was stored when it could not be read.
/// Unreadable values are kept verbatim so a rewrite never loses them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Schedule {
    At(NaiveDateTime),
    Unknown(String),
}

impl Schedule {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn unknown() -> Self {
        Schedule::Unknown(Self::UNKNOWN.to_string())
    }

    pub fn start(&self) -> Option<NaiveDateTime> {
        match self {
            Schedule::At(ts) => Some(*ts),
            Schedule::Unknown(_) => None,
        }
    }
}

impl From<String> for Schedule {
    fn from(raw: String) -> Self {
        match parse_ts(&raw) {
            Some(ts) => Schedule::At(ts),
            None => Schedule::Unknown(raw),
        }
    }
}

impl From<Schedule> for String {
    fn from(s: Schedule) -> Self {
        s.to_string()
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Schedule::At(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            Schedule::Unknown(raw) => write!(f, "{raw}"),
        }
    }
}

/// Scheduling state of a match. On disk: `None` or empty = eligible, `Scheduled`
/// (or legacy `ProcessCreated`) = worker launched, anything else = handled elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MatchStatus {
    Undetermined,
    Scheduled,
    Other(String),
}

impl MatchStatus {
    pub fn is_eligible(&self) -> bool {
        matches!(self, MatchStatus::Undetermined)
    }
}

impl From<String> for MatchStatus {
    fn from(raw: String) -> Self {
        match raw.trim() {
            "None" | "" => MatchStatus::Undetermined,
            "Scheduled" | "ProcessCreated" => MatchStatus::Scheduled,
            _ => MatchStatus::Other(raw),
        }
    }
}

impl From<MatchStatus> for String {
    fn from(s: MatchStatus) -> Self {
        s.to_string()
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchStatus::Undetermined => write!(f, "None"),
            MatchStatus::Scheduled => write!(f, "Scheduled"),
            MatchStatus::Other(raw) => write!(f, "{raw}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Polling window
// ---------------------------------------------------------------------------

/// Arguments handed to one polling worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollJob {
    pub url: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl PollJob {
    /// `[start - pre_roll, start + duration]`
    pub fn for_start(
        url: &str,
        start: NaiveDateTime,
        pre_roll: chrono::Duration,
        duration: chrono::Duration,
    ) -> Self {
        Self {
            url: url.to_string(),
            start: start - pre_roll,
            end: start + duration,
        }
    }
}

// ---------------------------------------------------------------------------
// Odds
// ---------------------------------------------------------------------------

/// One over/under line: `threshold` with the under (`lower`) and over (`upper`) prices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotalsLine {
    pub threshold: String,
    pub lower: String,
    pub upper: String,
}

impl std::fmt::Display for TotalsLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: <{}, >{}", self.threshold, self.lower, self.upper)
    }
}

/// Result of one extraction attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TotalsOutcome {
    Found { quarter: String, lines: Vec<TotalsLine> },
    NotFound,
    Failed(String),
}

impl TotalsOutcome {
    pub fn quarter(&self) -> &str {
        match self {
            TotalsOutcome::Found { quarter, .. } => quarter,
            TotalsOutcome::NotFound => "not found",
            TotalsOutcome::Failed(_) => "error",
        }
    }

    pub fn totals(&self) -> String {
        match self {
            TotalsOutcome::Found { lines, .. } if lines.is_empty() => "No coefficients".to_string(),
            TotalsOutcome::Found { lines, .. } => lines
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" | "),
            TotalsOutcome::NotFound => "No suitable block found".to_string(),
            TotalsOutcome::Failed(message) => message.clone(),
        }
    }
}

/// One row of a match's time series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OddsSnapshot {
    pub timestamp: String,
    pub url: String,
    pub quarter: String,
    pub totals: String,
}

impl OddsSnapshot {
    pub fn capture(timestamp: NaiveDateTime, url: &str, outcome: &TotalsOutcome) -> Self {
        Self {
            timestamp: format_ts(timestamp),
            url: url.to_string(),
            quarter: outcome.quarter().to_string(),
            totals: outcome.totals(),
        }
    }
}
