//! Turning dispatch reports into summaries, log records and API views.

use crate::core::{Channel, Delivered, DeliveryOutcome, DispatchReport, ReportEntry};
use serde::Serialize;
use tracing::{info, warn};

/// Aggregate view of a dispatch report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSummary {
    pub total_tasks: usize,
    pub fulfilled_count: usize,
    pub rejected: Vec<RejectedDetail>,
}

/// A rejected task, described for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedDetail {
    pub index: usize,
    pub channel: Channel,
    pub target: String,
    pub kind: &'static str,
    pub message: String,
}

/// Summarizes `report`. Counts always add up to `total_tasks`.
pub fn summarize(report: &DispatchReport) -> DispatchSummary {
    let rejected: Vec<RejectedDetail> = report
        .entries()
        .iter()
        .filter_map(|entry| {
            entry.outcome.error().map(|e| RejectedDetail {
                index: entry.index,
                channel: entry.channel,
                target: entry.target.clone(),
                kind: e.kind(),
                message: e.public_message(),
            })
        })
        .collect();

    DispatchSummary {
        total_tasks: report.len(),
        fulfilled_count: report.len() - rejected.len(),
        rejected,
    }
}

/// Records a completed task in the log and in the delivery counters.
pub fn log_outcome(index: usize, channel: Channel, target: &str, outcome: &DeliveryOutcome) {
    match outcome {
        DeliveryOutcome::Fulfilled(delivered) => {
            match delivered {
                Delivered::Email => info!(index, %channel, recipient = target, "Delivery fulfilled"),
                Delivered::Push(id) => {
                    info!(index, %channel, recipient = target, message_id = %id, "Delivery fulfilled")
                }
            }
            metrics::counter!("deliveries_total", "channel" => channel.as_str(), "status" => "fulfilled")
                .increment(1);
        }
        DeliveryOutcome::Rejected(e) => {
            warn!(index, %channel, recipient = target, kind = e.kind(), error = %e, "Delivery rejected");
            metrics::counter!("deliveries_total", "channel" => channel.as_str(), "status" => "rejected")
                .increment(1);
        }
    }
}

/// The caller-facing shape of a single outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeView {
    pub index: usize,
    pub channel: Channel,
    pub target: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Fulfilled,
    Rejected,
}

impl From<&ReportEntry> for OutcomeView {
    fn from(entry: &ReportEntry) -> Self {
        let (status, value, error, error_kind) = match &entry.outcome {
            DeliveryOutcome::Fulfilled(Delivered::Email) => (OutcomeStatus::Fulfilled, None, None, None),
            DeliveryOutcome::Fulfilled(Delivered::Push(id)) => {
                (OutcomeStatus::Fulfilled, Some(id.to_string()), None, None)
            }
            DeliveryOutcome::Rejected(e) => (
                OutcomeStatus::Rejected,
                None,
                Some(e.public_message()),
                Some(e.kind()),
            ),
        };
        Self {
            index: entry.index,
            channel: entry.channel,
            target: entry.target.clone(),
            status,
            value,
            error,
            error_kind,
        }
    }
}

/// Response body for a dispatch call.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResponse {
    pub message: &'static str,
    pub results: Vec<OutcomeView>,
}

/// Response body for a push probe.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResponse {
    pub message: &'static str,
    pub result: OutcomeView,
}

pub fn dispatch_response(report: &DispatchReport) -> DispatchResponse {
    DispatchResponse {
        message: "Notifications processed",
        results: report.entries().iter().map(OutcomeView::from).collect(),
    }
}

pub fn probe_response(entry: &ReportEntry) -> ProbeResponse {
    let message = if entry.outcome.is_fulfilled() {
        "Test notification sent successfully"
    } else {
        "Test notification failed"
    };
    ProbeResponse {
        message,
        result: OutcomeView::from(entry),
    }
}
