//! CSV output of the per-ticker report

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;

use crate::position_log::ReportRow;
use crate::{DatedMetric, Money};

/// One rendered CSV line
#[derive(Debug, Serialize)]
struct CsvRow {
    ticker: String,
    filled: usize,
    avg_volume: String,
    buy_value: String,
    end_value: String,
    avg_bid: String,
    max_bid: String,
    max_bid_date: String,
    min_bid: String,
    min_bid_date: String,
    avg_ask: String,
    max_ask: String,
    max_ask_date: String,
    min_ask: String,
    min_ask_date: String,
    pct_return: String,
    alpha: String,
}

fn money(value: Money) -> String {
    format!("{:.2}", value.round_dp(2).inner())
}

fn percent(value: f64) -> String {
    format!("{:.2}", value)
}

fn date(metric: &DatedMetric) -> String {
    metric.date.to_rfc3339()
}

impl From<&ReportRow> for CsvRow {
    fn from(row: &ReportRow) -> Self {
        CsvRow {
            ticker: row.symbol.to_string(),
            filled: row.filled,
            avg_volume: money(row.avg_volume),
            buy_value: money(row.buy_value),
            end_value: money(row.end_value),
            avg_bid: money(row.avg_bid),
            max_bid: money(row.max_bid.amount),
            max_bid_date: date(&row.max_bid),
            min_bid: money(row.min_bid.amount),
            min_bid_date: date(&row.min_bid),
            avg_ask: money(row.avg_ask),
            max_ask: money(row.max_ask.amount),
            max_ask_date: date(&row.max_ask),
            min_ask: money(row.min_ask.amount),
            min_ask_date: date(&row.min_ask),
            pct_return: percent(row.pct_return),
            alpha: row.alpha.map(percent).unwrap_or_default(),
        }
    }
}

/// Write `rows` as CSV with a header line
pub fn write_rows<W: io::Write>(writer: W, rows: &[ReportRow]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    if rows.is_empty() {
        csv.write_record([
            "ticker", "filled", "avg_volume", "buy_value", "end_value", "avg_bid", "max_bid",
            "max_bid_date", "min_bid", "min_bid_date", "avg_ask", "max_ask", "max_ask_date",
            "min_ask", "min_ask_date", "pct_return", "alpha",
        ])?;
    }
    for row in rows {
        csv.serialize(CsvRow::from(row))?;
    }
    csv.flush()?;
    Ok(())
}

/// Write the report to `path`, creating parent directories
pub fn write_csv(path: impl AsRef<Path>, rows: &[ReportRow]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = fs::File::create(path)
        .with_context(|| format!("Failed to create report {}", path.display()))?;
    write_rows(file, rows).with_context(|| format!("Failed to write report {}", path.display()))
}
