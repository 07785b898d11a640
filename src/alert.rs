//! Threshold and cooldown evaluation for incoming glucose readings.
//!
//! [`evaluate`] is pure: it takes the reading, the user's current state and
//! the current time, and returns the state to persist together with the
//! alerts to dispatch. Persistence and delivery are left to the caller.

use chrono::{DateTime, Duration, Utc};

use crate::models::{trend_arrow, Reading, UserState};

// ---

/// Thresholds and wait windows substituted for users that have none set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertPolicy {
    // ---
    pub high_threshold: f64,
    pub high_wait_minutes: i32,
    pub low_threshold: f64,
    pub low_wait_minutes: i32,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        AlertPolicy {
            high_threshold: 225.0,
            high_wait_minutes: 60,
            low_threshold: 70.0,
            low_wait_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    High,
    Low,
}

impl AlertKind {
    // ---
    pub fn subject(self) -> &'static str {
        match self {
            AlertKind::High => "high bs",
            AlertKind::Low => "low bs",
        }
    }
}

/// A notification ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    // ---
    pub kind: AlertKind,
    pub subject: String,
    pub message: String,
    pub recipients: Vec<String>,
}

/// An alert that would have fired but is still inside its wait window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deferral {
    // ---
    pub kind: AlertKind,
    pub last_sent_at: DateTime<Utc>,
}

/// Result of evaluating one reading.
#[derive(Debug, Clone)]
pub struct Evaluation {
    // ---
    pub state: UserState,
    pub alerts: Vec<Alert>,
    pub deferred: Vec<Deferral>,
}

// ---

/// Evaluate a reading against the user's thresholds and cooldowns.
///
/// Unset thresholds are filled from `policy` and written into the returned
/// state, so a user keeps the values in effect at first contact. Alerts are
/// only produced when the user has a contact address. A high alert fires
/// when `value > high_threshold` and at least `high_wait_minutes` have passed
/// since the last high alert; the low check is symmetric and independent.
pub fn evaluate(
    reading: &Reading,
    mut state: UserState,
    policy: &AlertPolicy,
    now: DateTime<Utc>,
) -> Evaluation {
    // ---
    let high_threshold = *state.high_threshold.get_or_insert(policy.high_threshold);
    let high_wait = *state.high_wait_minutes.get_or_insert(policy.high_wait_minutes);
    let low_threshold = *state.low_threshold.get_or_insert(policy.low_threshold);
    let low_wait = *state.low_wait_minutes.get_or_insert(policy.low_wait_minutes);

    let recipients = state.recipients();
    let arrow = trend_arrow(&reading.direction);
    let mut alerts = Vec::new();
    let mut deferred = Vec::new();

    if !recipients.is_empty() && reading.value > high_threshold {
        match state.last_high_notification_at {
            Some(last) if !wait_elapsed(last, high_wait, now) => deferred.push(Deferral {
                kind: AlertKind::High,
                last_sent_at: last,
            }),
            _ => {
                let message = format!(
                    "HIGH BS: {} {} {} {}.\nUser considers {} to be high.\nNext msg in {} minutes.",
                    reading.value,
                    arrow,
                    reading.direction,
                    reading.observed_at,
                    high_threshold,
                    high_wait
                );
                alerts.push(Alert {
                    kind: AlertKind::High,
                    subject: AlertKind::High.subject().to_string(),
                    message,
                    recipients: recipients.clone(),
                });
                state.last_high_notification_at = Some(now);
            }
        }
    }

    if !recipients.is_empty() && reading.value < low_threshold {
        match state.last_low_notification_at {
            Some(last) if !wait_elapsed(last, low_wait, now) => deferred.push(Deferral {
                kind: AlertKind::Low,
                last_sent_at: last,
            }),
            _ => {
                let message = format!(
                    "LOW BS: {} {} {} {}.\nUser considers {} to be low.\nNext msg in {} minutes.",
                    reading.value,
                    arrow,
                    reading.direction,
                    reading.observed_at,
                    low_threshold,
                    low_wait
                );
                alerts.push(Alert {
                    kind: AlertKind::Low,
                    subject: AlertKind::Low.subject().to_string(),
                    message,
                    recipients,
                });
                state.last_low_notification_at = Some(now);
            }
        }
    }

    state.sgv = Some(reading.value);
    state.direction = Some(reading.direction.clone());
    state.test_time = Some(reading.observed_at.clone());

    Evaluation {
        state,
        alerts,
        deferred,
    }
}

/// A clock that runs backwards never reopens the window.
fn wait_elapsed(last: DateTime<Utc>, wait_minutes: i32, now: DateTime<Utc>) -> bool {
    now - last >= Duration::minutes(i64::from(wait_minutes))
}
