//! Data models for the glucose webhook receiver.

use std::{collections::BTreeMap, str::FromStr};

use chrono::{DateTime, Utc};
use serde::Deserialize;

// ---

/// Trend indicator reported alongside each glucose value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    // ---
    DoubleUp,
    SingleUp,
    FortyFiveUp,
    Flat,
    FortyFiveDown,
    SingleDown,
    DoubleDown,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown trend direction: {0}")]
pub struct UnknownDirection(pub String);

impl FromStr for Direction {
    // ---
    type Err = UnknownDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        match s {
            "DoubleUp" => Ok(Direction::DoubleUp),
            "SingleUp" => Ok(Direction::SingleUp),
            "FortyFiveUp" => Ok(Direction::FortyFiveUp),
            "Flat" => Ok(Direction::Flat),
            "FortyFiveDown" => Ok(Direction::FortyFiveDown),
            "SingleDown" => Ok(Direction::SingleDown),
            "DoubleDown" => Ok(Direction::DoubleDown),
            other => Err(UnknownDirection(other.to_string())),
        }
    }
}

impl Direction {
    // ---
    /// Glyph used in plain-text alert bodies.
    pub fn arrow(self) -> &'static str {
        match self {
            Direction::DoubleUp => "⟰",
            Direction::SingleUp => "⇑",
            Direction::FortyFiveUp => "⇗",
            Direction::Flat => "⇒",
            Direction::FortyFiveDown => "⇘",
            Direction::SingleDown => "⇓",
            Direction::DoubleDown => "⟱",
        }
    }

    /// HTML entity sequence used on the status page.
    pub fn html_arrow(self) -> &'static str {
        match self {
            Direction::DoubleUp => "&uarr;&uarr;",
            Direction::SingleUp => "&uarr;",
            Direction::FortyFiveUp => "&nearr;",
            Direction::Flat => "&rarr;",
            Direction::FortyFiveDown => "&searr;",
            Direction::SingleDown => "&darr;",
            Direction::DoubleDown => "&darr;&darr;",
        }
    }
}

/// Text glyph for a raw direction string; unknown values map to "".
pub fn trend_arrow(direction: &str) -> &'static str {
    direction.parse::<Direction>().map_or("", Direction::arrow)
}

/// HTML glyph for a raw direction string; unknown values map to "".
pub fn trend_arrow_html(direction: &str) -> &'static str {
    direction.parse::<Direction>().map_or("", Direction::html_arrow)
}

// ---

/// One glucose entry as posted by the uploader.
///
/// `{"device":"xDrip-LimiTTer","date":1526317585929,"dateString":"2018-05-14T12:06:25.929-0500","sgv":136,"direction":"Flat"}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPayload {
    // ---
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub date: Option<i64>,
    #[serde(default)]
    pub date_string: Option<String>,
    pub sgv: f64,
    #[serde(default)]
    pub direction: Option<String>,
}

/// Uploaders post either a single entry or a batch when catching up.
///
/// Elements are kept as raw JSON so that one record without a usable `sgv`
/// (a meter `mbg` or `cal` record, say) does not reject its neighbours.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EntriesBody {
    // ---
    Many(Vec<serde_json::Value>),
    One(serde_json::Value),
}

/// Usable entries of a body plus the reason each other element was dropped.
#[derive(Debug, Default)]
pub struct OrderedEntries {
    pub usable: Vec<EntryPayload>,
    pub skipped: Vec<String>,
}

impl EntriesBody {
    // ---
    /// Parse every element on its own and order the usable ones by device
    /// timestamp, oldest first.
    pub fn into_ordered(self) -> OrderedEntries {
        // ---
        let raw = match self {
            EntriesBody::Many(values) => values,
            EntriesBody::One(value) => vec![value],
        };

        let mut out = OrderedEntries::default();
        for value in raw {
            match serde_json::from_value::<EntryPayload>(value) {
                Ok(entry) => out.usable.push(entry),
                Err(e) => out.skipped.push(e.to_string()),
            }
        }
        out.usable.sort_by_key(|e| e.date);
        out
    }
}

/// Device battery/uploader status.
///
/// `{"device":"LimiTTer","uploader":{"battery":100}}`
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceStatusPayload {
    // ---
    pub device: String,
    #[serde(default)]
    pub uploader: serde_json::Value,
}

/// A single reading as seen by the alert evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    // ---
    pub value: f64,
    pub direction: String,
    pub observed_at: String,
}

impl EntryPayload {
    // ---
    pub fn to_reading(&self) -> Reading {
        // ---
        let observed_at = match (&self.date_string, self.date) {
            (Some(s), _) => s.clone(),
            (None, Some(ms)) => DateTime::from_timestamp_millis(ms)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            (None, None) => String::new(),
        };

        Reading {
            value: self.sgv,
            direction: self.direction.clone().unwrap_or_default(),
            observed_at,
        }
    }
}

// ---

/// Persisted per-user record; the single source of truth for a device owner.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct UserState {
    // ---
    pub user_name: String,
    pub email: Option<String>,
    pub sgv: Option<f64>,
    pub direction: Option<String>,
    pub test_time: Option<String>,
    pub high_threshold: Option<f64>,
    pub high_wait_minutes: Option<i32>,
    pub low_threshold: Option<f64>,
    pub low_wait_minutes: Option<i32>,
    pub last_high_notification_at: Option<DateTime<Utc>>,
    pub last_low_notification_at: Option<DateTime<Utc>>,
    #[sqlx(json)]
    pub devices: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserState {
    // ---
    /// Fresh record for a user seen for the first time.
    pub fn new(user_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        // ---
        UserState {
            user_name: user_name.into(),
            email: None,
            sgv: None,
            direction: None,
            test_time: None,
            high_threshold: None,
            high_wait_minutes: None,
            low_threshold: None,
            low_wait_minutes: None,
            last_high_notification_at: None,
            last_low_notification_at: None,
            devices: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Alert recipients parsed from the comma separated `email` field.
    pub fn recipients(&self) -> Vec<String> {
        // ---
        self.email
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn record_device_status(&mut self, status: DeviceStatusPayload) {
        self.devices.insert(status.device, status.uploader);
    }
}
