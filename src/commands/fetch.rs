//! Retrieve and decrypt readings.
//!
//! | View          | Default window | Default limit | Order        |
//! |---------------|----------------|---------------|--------------|
//! | `latest`      | 5 min          | 1             | newest only  |
//! | `history`     | 30 min         | 50            | oldest first |
//! | `transitions` | 60 min         | 100           | oldest first |

use anyhow::{Context, Result, bail};
use chrono::{DateTime, TimeDelta, Utc};
use clap::ValueEnum;
use serde::Serialize;

use super::{build_api, print_ok};
use crate::config::ClientConfig;
use crate::consumer::{
    DecodedReading, Transition, decode_entries, detect_transitions, sort_chronologically,
};
use crate::utils::format_duration;

/// Which view of the fetched readings to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum View {
    Latest,
    History,
    Transitions,
}

impl View {
    pub fn default_window_minutes(self) -> i64 {
        match self {
            Self::Latest => 5,
            Self::History => 30,
            Self::Transitions => 60,
        }
    }

    pub fn default_limit(self) -> usize {
        match self {
            Self::Latest => 1,
            Self::History => 50,
            Self::Transitions => 100,
        }
    }
}

#[derive(Debug, Serialize)]
struct Latest {
    /// How long ago the reading was taken, e.g. `3m 12s`.
    age: String,
    #[serde(flatten)]
    reading: DecodedReading,
}

#[derive(Debug, Serialize)]
struct Transitions {
    transitions: Vec<Transition>,
    current_state: Option<String>,
    readings: usize,
}

/// Fetch, decrypt and print one view.
pub async fn execute(
    client: &ClientConfig,
    view: View,
    window_minutes: Option<i64>,
    limit: Option<usize>,
) -> Result<()> {
    let api = build_api(client)?;
    let key = client.key()?;

    let minutes = window_minutes.unwrap_or(view.default_window_minutes());
    let since = window_start(Utc::now(), minutes)?;
    let entries = api
        .fetch(Some(since), Some(limit.unwrap_or(view.default_limit())))
        .await
        .context("Failed to fetch telemetry")?;

    let mut readings = decode_entries(&entries, key.as_bytes());
    if readings.len() < entries.len() {
        tracing::info!(
            fetched = entries.len(),
            decoded = readings.len(),
            "Some entries could not be decrypted"
        );
    }

    match view {
        View::Latest => {
            // Entries arrive newest-first.
            let latest = readings.into_iter().next().map(|reading| Latest {
                age: age_of(reading.reading.timestamp, Utc::now()),
                reading,
            });
            print_ok(&latest)
        },
        View::History => {
            sort_chronologically(&mut readings);
            print_ok(&readings)
        },
        View::Transitions => {
            sort_chronologically(&mut readings);
            print_ok(&Transitions {
                transitions: detect_transitions(&readings),
                current_state: readings
                    .last()
                    .and_then(|r| r.reading.motion_state())
                    .map(str::to_string),
                readings: readings.len(),
            })
        },
    }
}

/// Start of a look-back window of `minutes` ending at `now`.
fn window_start(now: DateTime<Utc>, minutes: i64) -> Result<DateTime<Utc>> {
    if minutes < 0 {
        bail!("--minutes must not be negative, got {minutes}");
    }
    TimeDelta::try_minutes(minutes)
        .and_then(|window| now.checked_sub_signed(window))
        .with_context(|| format!("--minutes {minutes} is out of range"))
}

fn age_of(taken: DateTime<Utc>, now: DateTime<Utc>) -> String {
    format_duration(now - taken)
}
