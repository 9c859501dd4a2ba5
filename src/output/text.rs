//! Human-readable text output

use crate::config::ScanPlan;
use crate::report::{FleetReport, NodeReport};
use crate::util::time::format_duration;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Print scan results to console
///
/// Displays the fleet rollup followed by one line per reporting node.
/// Nodes that produced nothing before the deadline show up only in the
/// missing count.
pub fn print_results(
    reports: &[NodeReport],
    fleet: &FleetReport,
    requested: usize,
    duration: Duration,
    plan: &ScanPlan,
) {
    println!("═══════════════════════════════════════════════════════════");
    println!("                    SCAN RESULTS");
    println!("═══════════════════════════════════════════════════════════");
    println!();

    println!("Account:      {}", plan.account);
    if let Some(ref base) = plan.search_base {
        println!("Search base:  {}", base);
    }
    println!("Elapsed:      {:.3}s", duration.as_secs_f64());
    println!("Strategy:     {}", plan.strategy);
    println!();

    println!("Fleet:");
    println!("  Total counter:  {}", fleet.total);
    match fleet.peak {
        Some(ref peak) => {
            println!("  Peak node:      {} (counter {})", peak.node, peak.counter)
        }
        None => println!("  Peak node:      none"),
    }
    match fleet.latest_failure {
        Some(ts) => println!("  Latest failure: {}", format_timestamp(&ts)),
        None => println!("  Latest failure: never"),
    }
    if !fleet.flagged.is_empty() {
        println!("  Locked on:      {}", fleet.flagged.join(", "));
    }
    println!(
        "  Responses:      {} ok, {} failed, {} missing",
        fleet.success_count,
        fleet.failure_count,
        requested.saturating_sub(reports.len())
    );
    if fleet.success_count > 0 {
        println!("  Avg query time: {:.1}ms", fleet.avg_duration_ms);
    }
    println!();

    println!("Nodes:");
    println!(
        "  {:<16} {:>8}  {:<24} {:<7} STATUS",
        "NODE", "COUNTER", "LAST FAILURE", "LOCKED"
    );
    for report in reports {
        if report.success {
            let last_failure = report
                .last_failure
                .map(|ts| format_timestamp(&ts))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:<16} {:>8}  {:<24} {:<7} ok ({})",
                report.node.name,
                report.counter,
                last_failure,
                if report.flagged { "yes" } else { "-" },
                format_duration(report.elapsed)
            );
        } else {
            let error = report
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown failure".to_string());
            println!(
                "  {:<16} {:>8}  {:<24} {:<7} {}",
                report.node.name, "-", "-", "-", error
            );
        }
    }

    println!();
    println!("═══════════════════════════════════════════════════════════");
}

/// Format a calendar timestamp for display
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
