//! JSON report output
//!
//! Machine-readable scan results for downstream tooling. Structures here
//! mirror the in-memory reports but flatten timestamps to RFC 3339
//! strings.

use crate::report::{FleetReport, NodeReport};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::time::Duration;

/// Per-node entry in the scan report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonNodeReport {
    pub node: String,
    pub success: bool,
    pub counter: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<String>,
    pub flagged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: f64,
}

/// Fleet-wide rollup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonFleetSummary {
    pub total_counter: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_counter: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_failure: Option<String>,
    pub flagged: Vec<String>,
    pub success_count: usize,
    pub failure_count: usize,
    pub avg_duration_ms: f64,
}

/// Complete scan report document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonScanReport {
    pub account: String,
    pub generated_at: String,
    pub elapsed_ms: f64,
    pub requested_nodes: usize,
    pub reported_nodes: usize,
    pub fleet: JsonFleetSummary,
    pub nodes: Vec<JsonNodeReport>,
}

/// Convert a node report to its JSON form
pub fn node_report_to_json(report: &NodeReport) -> JsonNodeReport {
    JsonNodeReport {
        node: report.node.name.clone(),
        success: report.success,
        counter: report.counter,
        last_failure: report.last_failure.as_ref().map(format_timestamp),
        locked_at: report.locked_at.as_ref().map(format_timestamp),
        flagged: report.flagged,
        error: report.error.as_ref().map(|e| e.to_string()),
        duration_ms: report.duration_ms(),
    }
}

/// Build the complete report document
pub fn build_scan_report(
    account: &str,
    reports: &[NodeReport],
    fleet: &FleetReport,
    requested: usize,
    elapsed: Duration,
) -> JsonScanReport {
    JsonScanReport {
        account: account.to_string(),
        generated_at: format_timestamp(&Utc::now()),
        elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        requested_nodes: requested,
        reported_nodes: reports.len(),
        fleet: JsonFleetSummary {
            total_counter: fleet.total,
            peak_node: fleet.peak.as_ref().map(|r| r.node.name.clone()),
            peak_counter: fleet.peak.as_ref().map(|r| r.counter),
            latest_failure: fleet.latest_failure.as_ref().map(format_timestamp),
            flagged: fleet.flagged.clone(),
            success_count: fleet.success_count,
            failure_count: fleet.failure_count,
            avg_duration_ms: fleet.avg_duration_ms,
        },
        nodes: reports.iter().map(node_report_to_json).collect(),
    }
}

/// Write the scan report as pretty-printed JSON
pub fn write_json_report(output_path: &Path, report: &JsonScanReport) -> Result<()> {
    let file = File::create(output_path)?;
    serde_json::to_writer_pretty(file, report)?;

    Ok(())
}

/// Format a timestamp as RFC 3339
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RawAttributes;
    use crate::directory::Node;
    use crate::error::QueryError;
    use crate::util::time::datetime_to_raw_timestamp;
    use chrono::TimeZone;

    fn sample_reports() -> Vec<NodeReport> {
        let failure_time = Utc.with_ymd_and_hms(2024, 6, 15, 12, 30, 45).unwrap();
        let attrs = RawAttributes {
            counter: 3,
            last_failure_raw: Some(datetime_to_raw_timestamp(&failure_time)),
            lock_raw: None,
        };

        vec![
            NodeReport::completed(Node::new("dc01"), attrs, Duration::from_millis(40)),
            NodeReport::failed(
                Node::new("dc02"),
                QueryError::Unreachable("connection refused".to_string()),
                Duration::from_millis(5),
            ),
        ]
    }

    #[test]
    fn test_build_scan_report_maps_fields() {
        let reports = sample_reports();
        let fleet = FleetReport::reduce(&reports);

        let doc = build_scan_report("svc-backup", &reports, &fleet, 3, Duration::from_secs(1));

        assert_eq!(doc.account, "svc-backup");
        assert_eq!(doc.elapsed_ms, 1000.0);
        assert_eq!(doc.requested_nodes, 3);
        assert_eq!(doc.reported_nodes, 2);
        assert_eq!(doc.fleet.total_counter, 3);
        assert_eq!(doc.fleet.peak_node.as_deref(), Some("dc01"));
        assert_eq!(doc.fleet.peak_counter, Some(3));
        assert_eq!(doc.fleet.success_count, 1);
        assert_eq!(doc.fleet.failure_count, 1);

        assert_eq!(doc.nodes.len(), 2);
        assert!(doc.nodes[0].success);
        assert_eq!(doc.nodes[0].counter, 3);
        assert!(doc.nodes[0]
            .last_failure
            .as_deref()
            .unwrap()
            .starts_with("2024-06-15T12:30:45"));
        assert!(!doc.nodes[1].success);
        assert_eq!(
            doc.nodes[1].error.as_deref(),
            Some("node unreachable: connection refused")
        );
    }

    #[test]
    fn test_serialized_report_omits_empty_options() {
        let reports = sample_reports();
        let fleet = FleetReport::reduce(&reports);
        let doc = build_scan_report("svc", &reports, &fleet, 2, Duration::from_millis(500));

        let rendered = serde_json::to_string_pretty(&doc).unwrap();

        // dc01 has a last failure but no lock, so locked_at never appears
        assert!(rendered.contains("\"last_failure\""));
        assert!(!rendered.contains("\"locked_at\""));
    }

    #[test]
    fn test_write_json_report_round_trips() {
        let reports = sample_reports();
        let fleet = FleetReport::reduce(&reports);
        let doc = build_scan_report("svc", &reports, &fleet, 2, Duration::from_millis(500));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.json");
        write_json_report(&path, &doc).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: JsonScanReport = serde_json::from_str(&contents).unwrap();

        assert_eq!(parsed.account, "svc");
        assert_eq!(parsed.nodes.len(), 2);
        assert_eq!(parsed.fleet.total_counter, doc.fleet.total_counter);
    }
}
