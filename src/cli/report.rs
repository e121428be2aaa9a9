//! End-of-run summary report.
//!
//! Renders the rolled-up stat counters as terminal tables: per-phase request
//! outcomes, per-phase execution outcomes, and complete protocol runs with
//! throughput rates.

use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};
use console::style;

use crate::domain::models::attempt::HumanDuration;
use crate::services::stats::{GlobalStats, ProtocolStats, RequestStats, StatCounter};

/// `H:MM:SS` rendering of a seconds count.
pub fn clock_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

fn duration_cell(duration: Option<f64>) -> String {
    duration.map_or_else(String::new, |d| HumanDuration(d).to_string())
}

fn percent_cell(percentage: Option<f64>) -> String {
    percentage.map_or_else(String::new, |p| format!("{:.1}%", p * 100.0))
}

fn decimal_cell(rate: Option<f64>) -> String {
    rate.map_or_else(String::new, |r| format!("{r:.2}"))
}

fn integer_cell(rate: Option<f64>) -> String {
    rate.map_or_else(String::new, |r| format!("{}", r.round()))
}

fn base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn push_row(table: &mut Table, label: &str, cells: Vec<String>) {
    let mut row = vec![Cell::new(label)];
    row.extend(cells.into_iter().map(|c| Cell::new(c).set_alignment(CellAlignment::Right)));
    table.add_row(row);
}

fn counter_rows(table: &mut Table, counters: &[&StatCounter]) {
    push_row(
        table,
        "Number",
        counters.iter().map(|c| c.count().to_string()).collect(),
    );
    push_row(
        table,
        "Percentage",
        counters.iter().map(|c| percent_cell(c.percentage())).collect(),
    );
    push_row(
        table,
        "Average",
        counters
            .iter()
            .map(|c| duration_cell(c.average_duration()))
            .collect(),
    );
    push_row(
        table,
        "Shortest",
        counters
            .iter()
            .map(|c| duration_cell(c.shortest_duration()))
            .collect(),
    );
    push_row(
        table,
        "Longest",
        counters
            .iter()
            .map(|c| duration_cell(c.longest_duration()))
            .collect(),
    );
}

/// Table for one phase's individual request outcomes.
pub fn request_table(stats: &RequestStats) -> Table {
    let mut table = base_table();
    table.set_header(vec!["", "ok", "retry", "fail", "all"]);
    counter_rows(
        &mut table,
        &[
            stats.ok.as_ref(),
            stats.retry.as_ref(),
            stats.fail.as_ref(),
            stats.all.as_ref(),
        ],
    );
    table
}

/// Table for one phase's (or the whole protocol's) execution outcomes.
/// When a tracked duration is supplied, throughput rate rows are appended.
pub fn protocol_table(stats: &ProtocolStats, track_duration: Option<f64>) -> Table {
    let mut table = base_table();
    table.set_header(vec!["", "success", "fail", "all"]);
    let counters: [&StatCounter; 3] = [
        stats.success.as_ref(),
        stats.fail.as_ref(),
        stats.all.as_ref(),
    ];
    counter_rows(&mut table, &counters);

    if let Some(seconds) = track_duration {
        let minutes = seconds / 60.0;
        let hours = minutes / 60.0;
        push_row(
            &mut table,
            "Per second",
            counters.iter().map(|c| decimal_cell(c.rate(seconds))).collect(),
        );
        push_row(
            &mut table,
            "Per minute",
            counters.iter().map(|c| decimal_cell(c.rate(minutes))).collect(),
        );
        push_row(
            &mut table,
            "Per hour",
            counters.iter().map(|c| integer_cell(c.rate(hours))).collect(),
        );
    }

    table
}

/// Print the full test result summary.
pub fn print_summary(stats: &GlobalStats) {
    let track_duration = stats.track_duration();
    let attestations = stats.full_protocol_runs.all.count();

    println!();
    println!("{}", style("TEST RESULT SUMMARY").bold().reverse());
    println!();

    let seconds = if track_duration > 60.0 {
        format!(" ({:.1}s)", track_duration)
    } else {
        String::new()
    };
    println!(
        "  Performed {attestations} attestations in {}{seconds}",
        clock_duration(track_duration)
    );
    println!(
        "  Used {} worker processes and {} mock agents",
        stats.worker_count(),
        stats.agent_count()
    );

    println!();
    println!("{}", style("Capabilities Negotiation Phase").bold());
    println!("Create Requests:");
    println!("{}", request_table(&stats.create_requests));
    println!("Executions:");
    println!("{}", protocol_table(&stats.create_phases, None));

    println!();
    println!("{}", style("Evidence Handling Phase").bold());
    println!("Update Requests:");
    println!("{}", request_table(&stats.update_requests));
    println!("Executions:");
    println!("{}", protocol_table(&stats.update_phases, None));

    println!();
    println!("{}", style("Complete Protocol Runs").bold());
    println!("Attestation Tasks:");
    println!(
        "{}",
        protocol_table(&stats.full_protocol_runs, Some(track_duration))
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_duration() {
        assert_eq!(clock_duration(0.0), "0:00:00");
        assert_eq!(clock_duration(61.4), "0:01:01");
        assert_eq!(clock_duration(3725.0), "1:02:05");
    }

    #[test]
    fn test_blank_cells_for_empty_bins() {
        assert_eq!(duration_cell(None), "");
        assert_eq!(percent_cell(None), "");
        assert_eq!(decimal_cell(None), "");
        assert_eq!(percent_cell(Some(0.25)), "25.0%");
        assert_eq!(decimal_cell(Some(1.234)), "1.23");
        assert_eq!(integer_cell(Some(719.6)), "720");
    }

    #[test]
    fn test_request_table_carries_counts() {
        let stats = RequestStats::new();
        stats.ok.record(Some(0.5));
        stats.retry.record(Some(1.0));

        let rendered = request_table(&stats).to_string();
        assert!(rendered.contains("Number"));
        assert!(rendered.contains("ok"));
        assert!(rendered.contains("retry"));
        assert!(rendered.contains("500ms"));
    }

    #[test]
    fn test_protocol_table_appends_rates_when_tracked() {
        let stats = ProtocolStats::new();
        stats.success.record(Some(2.0));
        stats.success.record(Some(2.0));

        let without = protocol_table(&stats, None).to_string();
        assert!(!without.contains("Per second"));

        let with = protocol_table(&stats, Some(4.0)).to_string();
        assert!(with.contains("Per second"));
        assert!(with.contains("0.50"));
        assert!(with.contains("Per hour"));
    }
}
