//! Pretty-print case results, CSV and JSON export.

use crate::case::{CaseResult, PhaseStatus};
use crate::config::BenchConfig;
use crate::metric::{numerize, round4, MetricName};
use crate::BenchResult;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use std::path::{Path, PathBuf};

const DID_NOT_FINISH: &str = "did not finish";

// ────────────────────────────────────────────────────────────────────────────────
// Terminal output
// ────────────────────────────────────────────────────────────────────────────────

/// Phase whose outcome a metric is read from.
fn phase_of(result: &CaseResult, name: MetricName) -> &PhaseStatus {
    match name {
        MetricName::Qps => &result.parallel_search,
        MetricName::Recall if !result.serial_search.is_completed() => &result.parallel_search,
        MetricName::Recall | MetricName::SerialLatencyP99 => &result.serial_search,
        MetricName::LoadDuration | MetricName::MaxLoadCount => &result.load,
    }
}

/// Display value of one metric, or why there is none.
pub fn format_metric(result: &CaseResult, name: MetricName) -> String {
    match phase_of(result, name) {
        PhaseStatus::TimedOut => return DID_NOT_FINISH.to_string(),
        PhaseStatus::Failed(_) => return "failed".to_string(),
        PhaseStatus::Skipped => return "-".to_string(),
        PhaseStatus::Completed => {}
    }
    let m = &result.metric;
    match name {
        MetricName::MaxLoadCount => numerize(m.max_load_count as u64),
        other => format!("{}", round4(m.value(other))),
    }
}

/// Print one case as a metric table in display order.
pub fn print_case(result: &CaseResult) {
    println!(
        "\n{}",
        format!("━━━ {} · {} ━━━", result.db_name, result.dataset)
            .bold()
            .cyan()
    );

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(vec!["Metric", "Value", "Unit", "Better"]);

    for name in MetricName::DISPLAY_ORDER {
        let value = format_metric(result, name);
        let value_cell = match phase_of(result, name) {
            PhaseStatus::Completed => Cell::new(value),
            PhaseStatus::TimedOut => Cell::new(value).fg(Color::Yellow),
            PhaseStatus::Failed(_) => Cell::new(value).fg(Color::Red),
            PhaseStatus::Skipped => Cell::new(value).fg(Color::DarkGrey),
        };
        let better = if name.is_lower_better() { "lower" } else { "higher" };
        table.add_row(vec![
            Cell::new(name.as_str()),
            value_cell,
            Cell::new(name.unit()),
            Cell::new(better),
        ]);
    }
    println!("{table}");

    for (phase, status) in [
        ("load", &result.load),
        ("serial_search", &result.serial_search),
        ("parallel_search", &result.parallel_search),
    ] {
        if let PhaseStatus::Failed(msg) = status {
            println!("  {} {}", phase.red(), msg.dimmed());
        }
    }
}

/// Print every non-timeout setting.
pub fn print_config(config: &BenchConfig) {
    println!("\n{}", "── Configuration ──".bold().yellow());
    for (key, value) in config.display() {
        println!("  {:>22} {}", key.bold(), value);
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// CSV export
// ────────────────────────────────────────────────────────────────────────────────

pub fn export_csv(results: &[CaseResult], path: &Path) -> BenchResult<()> {
    let mut wtr = csv::Writer::from_path(path).map_err(std::io::Error::from)?;

    let mut header = vec!["database".to_string(), "dataset".to_string()];
    header.extend(MetricName::DISPLAY_ORDER.iter().map(|m| m.as_str().to_string()));
    header.extend(["load", "serial_search", "parallel_search"].map(String::from));
    wtr.write_record(&header).map_err(std::io::Error::from)?;

    for r in results {
        let mut row = vec![r.db_name.clone(), r.dataset.clone()];
        for name in MetricName::DISPLAY_ORDER {
            row.push(if phase_of(r, name).is_completed() {
                format!("{}", round4(r.metric.value(name)))
            } else {
                String::new()
            });
        }
        row.extend([&r.load, &r.serial_search, &r.parallel_search].map(|s| s.to_string()));
        wtr.write_record(&row).map_err(std::io::Error::from)?;
    }

    wtr.flush()?;
    println!("  CSV exported to {}", path.display());
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────────
// JSON export
// ────────────────────────────────────────────────────────────────────────────────

pub fn export_json(results: &[CaseResult], path: &Path) -> BenchResult<()> {
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(path, json)?;
    println!("  JSON exported to {}", path.display());
    Ok(())
}

/// Write `results.json` and `results.csv` under `dir`, creating it if needed.
pub fn export_all(results: &[CaseResult], dir: &Path) -> BenchResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let json = dir.join("results.json");
    let csv = dir.join("results.csv");
    export_json(results, &json)?;
    export_csv(results, &csv)?;
    Ok(vec![json, csv])
}
