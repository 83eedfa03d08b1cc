//! Outcome aggregation and the summary notice.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Serialize, Serializer};
use serde_json::Value;
use trellis_core::{Claims, Notification, NotificationKind};

use crate::worker::RowOutcome;

/// Samples kept per failure message.
pub const PREVIEW_LIMIT: usize = 10;

/// What an import did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    /// Up to [`PREVIEW_LIMIT`] row diagnostics per failure message.
    pub failed_list: BTreeMap<String, Vec<Value>>,
    /// Rows read from the file.
    pub total_data: usize,
    /// Rows that failed.
    pub total_failed: usize,
    /// Wall time of the whole import, serialized in seconds.
    #[serde(serialize_with = "as_secs")]
    pub execution_time: Duration,
}

impl ImportSummary {
    /// Rows that were committed.
    pub fn total_succeeded(&self) -> usize {
        self.total_data - self.total_failed
    }

    /// Returns `true` when every row was committed.
    pub fn is_clean(&self) -> bool {
        self.total_failed == 0
    }
}

fn as_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Folds row outcomes into counts and grouped previews.
#[derive(Debug, Default)]
pub(crate) struct Aggregator {
    total: usize,
    failed: usize,
    groups: BTreeMap<String, Vec<Value>>,
}

impl Aggregator {
    pub fn record(&mut self, outcome: RowOutcome) {
        self.total += 1;
        let Some(error) = outcome.error else {
            return;
        };
        self.failed += 1;
        let samples = self.groups.entry(error.message).or_default();
        if samples.len() < PREVIEW_LIMIT {
            samples.push(error.data.unwrap_or(Value::Null));
        }
    }

    pub fn finish(self, execution_time: Duration) -> ImportSummary {
        ImportSummary {
            failed_list: self.groups,
            total_data: self.total,
            total_failed: self.failed,
            execution_time,
        }
    }
}

/// When the summary notice is sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NotifyPreference {
    /// After every import.
    #[default]
    Always,
    /// Only when at least one row failed.
    OnFailure,
    /// Never.
    Never,
}

impl NotifyPreference {
    /// Whether `summary` warrants a notice.
    pub fn wants(self, summary: &ImportSummary) -> bool {
        match self {
            Self::Always => true,
            Self::OnFailure => !summary.is_clean(),
            Self::Never => false,
        }
    }
}

pub(crate) fn summary_notification(
    label: &str,
    process: &str,
    summary: &ImportSummary,
    claims: Option<&Claims>,
) -> Notification {
    let prefix = if label.is_empty() {
        String::new()
    } else {
        format!("{label} ")
    };
    let (title, kind) = if summary.is_clean() {
        (format!("{prefix}import {process} completed"), NotificationKind::Info)
    } else {
        (
            format!("{prefix}import {process} finished with {} failed rows", summary.total_failed),
            NotificationKind::Warn,
        )
    };

    let mut notification = Notification::new(title)
        .kind(kind)
        .field("Process", process)
        .field("Total Data", summary.total_data.to_string())
        .field("Total Failed", summary.total_failed.to_string())
        .field("Execution Time", format!("{:.2}s", summary.execution_time.as_secs_f64()));

    if let Some(claims) = claims {
        notification = notification.field("-Requested By", claims.as_value().to_string());
    }
    for (message, samples) in &summary.failed_list {
        let preview = serde_json::to_string_pretty(samples).unwrap_or_default();
        notification = notification.field(format!("-Failed: {message}"), preview);
    }
    notification
}
