use crate::models::{Severity, Signal, SignalRecord};
use crate::scanner::{AssetStatus, ScanReport, SkipReason};
use chrono::{DateTime, Utc};
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_BORDERS_ONLY,
};

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%d-%m-%Y %H:%M").to_string()
}

fn fmt_pct(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:+.2}%", v))
        .unwrap_or_else(|| "n/a".to_string())
}

fn severity_cell(severity: Severity) -> Cell {
    let color = match severity {
        Severity::High => Color::Red,
        Severity::Medium => Color::Yellow,
    };
    Cell::new(severity.as_str()).fg(color).add_attribute(Attribute::Bold)
}

fn header(extra_first: Option<&str>) -> Vec<Cell> {
    let mut cols: Vec<&str> = extra_first.into_iter().collect();
    cols.extend([
        "Asset", "Severity", "Drop (%)", "Peak", "Current", "RSI", "vs Benchmark", "Generated (UTC)",
    ]);
    cols.into_iter()
        .map(|c| Cell::new(c).add_attribute(Attribute::Bold))
        .collect()
}

fn signal_row(signal: &Signal) -> Vec<Cell> {
    let o = &signal.payload.observation;
    vec![
        Cell::new(&signal.asset).fg(Color::Cyan),
        severity_cell(signal.severity),
        Cell::new(format!("{:.2}%", signal.drop_pct)).set_alignment(CellAlignment::Right),
        Cell::new(format!("{:.4} @ {}", o.peak_price, format_timestamp(o.peak_time))),
        Cell::new(format!("{:.4}", o.current_price)).set_alignment(CellAlignment::Right),
        Cell::new(o.rsi.map(|r| format!("{:.2}", r)).unwrap_or_else(|| "n/a".into()))
            .set_alignment(CellAlignment::Right),
        Cell::new(fmt_pct(signal.payload.benchmark_change_pct)).set_alignment(CellAlignment::Right),
        Cell::new(format_timestamp(signal.generated_at)).fg(Color::DarkGrey),
    ]
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Signals of one scan plus a line per skipped asset.
pub fn render_report(report: &ScanReport) -> String {
    let mut out = String::new();

    if report.signals.is_empty() {
        out.push_str("No qualifying drawdowns this scan.\n");
    } else {
        let mut table = new_table();
        table.set_header(header(None));
        for signal in &report.signals {
            table.add_row(signal_row(signal));
        }
        out.push_str(&format!("{}\n", table));
    }

    for outcome in &report.outcomes {
        let line = match &outcome.status {
            AssetStatus::Skipped(SkipReason::Unresolved) => format!("skipped {}: unknown symbol", outcome.asset),
            AssetStatus::Skipped(SkipReason::NoData(reasons)) => {
                format!("skipped {}: {}", outcome.asset, reasons.join("; "))
            }
            AssetStatus::Cancelled => format!("not scanned {}: cancelled", outcome.asset),
            AssetStatus::Signalled | AssetStatus::Quiet => continue,
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Stored signals, newest first, as returned by the store.
pub fn render_records(records: &[SignalRecord]) -> String {
    if records.is_empty() {
        return "No stored signals.".to_string();
    }

    let mut table = new_table();
    table.set_header(header(Some("Id")));
    for record in records {
        let mut row = vec![Cell::new(record.id).fg(Color::DarkGrey)];
        row.extend(signal_row(&record.signal));
        table.add_row(row);
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::t0;
    use crate::models::{DrawdownObservation, SignalKind, SignalPayload};
    use crate::scanner::AssetOutcome;

    fn signal() -> Signal {
        Signal {
            asset: "ripple".to_string(),
            kind: SignalKind::NewHighDrop,
            severity: Severity::High,
            drop_pct: 30.0,
            payload: SignalPayload {
                observation: DrawdownObservation {
                    peak_time: t0(),
                    peak_price: 0.75,
                    current_price: 0.525,
                    drop_pct: 30.0,
                    rsi: Some(18.25),
                },
                benchmark: "bitcoin".to_string(),
                benchmark_change_pct: Some(-5.0),
            },
            generated_at: t0(),
        }
    }

    #[test]
    fn report_lists_signals_and_skips() {
        let report = ScanReport {
            signals: vec![signal()],
            outcomes: vec![
                AssetOutcome {
                    asset: "ripple".into(),
                    status: AssetStatus::Signalled,
                },
                AssetOutcome {
                    asset: "nonexistent-coin-xyz".into(),
                    status: AssetStatus::Skipped(SkipReason::Unresolved),
                },
            ],
            cancelled: false,
        };

        let text = render_report(&report);
        assert!(text.contains("ripple"));
        assert!(text.contains("30.00%"));
        assert!(text.contains("-5.00%"));
        assert!(text.contains("skipped nonexistent-coin-xyz: unknown symbol"));
    }

    #[test]
    fn empty_outputs() {
        assert!(render_report(&ScanReport::default()).contains("No qualifying drawdowns"));
        assert_eq!(render_records(&[]), "No stored signals.");
    }
}
