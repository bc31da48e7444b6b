//! Tick ingestion
//!
//! Reads quote files with a configurable column layout and feeds the parsed
//! ticks into the bounded queue consumed by the simulation.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{Money, Symbol, Tick};

/// Unit of numeric timestamps, counted from midnight of the file date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampUnit {
    Ns,
    Us,
    #[default]
    Ms,
    S,
}

impl TimestampUnit {
    /// `None` when the offset does not fit a `TimeDelta`
    pub fn to_duration(self, value: i64) -> Option<TimeDelta> {
        match self {
            TimestampUnit::Ns => Some(TimeDelta::nanoseconds(value)),
            TimestampUnit::Us => Some(TimeDelta::microseconds(value)),
            TimestampUnit::Ms => TimeDelta::try_milliseconds(value),
            TimestampUnit::S => TimeDelta::try_seconds(value),
        }
    }
}

/// Zero-based column positions of each tick field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickColumns {
    pub ticker: usize,
    pub timestamp: usize,
    pub bid: usize,
    pub bid_size: usize,
    pub ask: usize,
    pub ask_size: usize,
}

impl Default for TickColumns {
    fn default() -> Self {
        TickColumns {
            ticker: 0,
            timestamp: 1,
            bid: 2,
            bid_size: 3,
            ask: 4,
            ask_size: 5,
        }
    }
}

impl TickColumns {
    fn all(&self) -> [usize; 6] {
        [
            self.ticker,
            self.timestamp,
            self.bid,
            self.bid_size,
            self.ask,
            self.ask_size,
        ]
    }

    /// Each field must come from its own column
    pub fn validate(&self) -> Result<()> {
        if !self.all().iter().all_unique() {
            bail!("tick columns must be distinct: {:?}", self);
        }
        Ok(())
    }

    /// Minimum number of fields a row needs
    pub fn width(&self) -> usize {
        self.all().iter().max().map_or(0, |max| max + 1)
    }
}

/// Input file layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// File paths or glob patterns. Each entry expands to its matches in
    /// sorted order and entries are read in the order given; ticks must
    /// already be in time order across files
    pub paths: Vec<PathBuf>,
    pub delimiter: String,
    pub headers: bool,
    /// chrono format of the date suffix after the last `_` in file names
    pub file_date_format: String,
    pub timestamp_unit: TimestampUnit,
    pub columns: TickColumns,
}

impl Default for FileConfig {
    fn default() -> Self {
        FileConfig {
            paths: Vec::new(),
            delimiter: "|".to_string(),
            headers: true,
            file_date_format: "%Y%m%d".to_string(),
            timestamp_unit: TimestampUnit::Ms,
            columns: TickColumns::default(),
        }
    }
}

/// Date encoded in a file name such as `quotes_20240102.txt`
pub fn file_date(path: &Path, format: &str) -> Option<NaiveDate> {
    let stem = path.file_stem()?.to_str()?;
    let suffix = stem.rsplit('_').next()?;
    NaiveDate::parse_from_str(suffix, format).ok()
}

/// Expand every glob pattern in `patterns` into the files it matches.
///
/// Matches of one pattern come back sorted; a pattern matching nothing is
/// an error.
pub fn resolve_paths(patterns: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let text = pattern
            .to_str()
            .with_context(|| format!("tick file pattern is not UTF-8: {}", pattern.display()))?;
        let mut matched = glob::glob(text)
            .with_context(|| format!("Invalid tick file pattern {:?}", text))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to expand tick file pattern {:?}", text))?;
        if matched.is_empty() {
            bail!("no tick files match {:?}", text);
        }
        matched.sort();
        debug!(pattern = text, files = matched.len(), "expanded tick file pattern");
        files.extend(matched);
    }
    Ok(files)
}

/// Column-mapped delimited tick file reader
#[derive(Debug, Clone)]
pub struct TickReader {
    config: FileConfig,
}

impl TickReader {
    pub fn new(config: FileConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FileConfig {
        &self.config
    }

    /// Load every valid tick of one file
    pub fn read_file(&self, path: impl AsRef<Path>) -> Result<Vec<Tick>> {
        let mut ticks = Vec::new();
        self.for_each_tick(path.as_ref(), |tick| {
            ticks.push(tick);
            true
        })?;
        Ok(ticks)
    }

    /// Stream one file's ticks into `sink` until it returns `false`.
    ///
    /// Rows that do not parse are skipped with a warning. Returns the number
    /// of ticks delivered.
    pub fn for_each_tick(&self, path: &Path, mut sink: impl FnMut(Tick) -> bool) -> Result<usize> {
        let delimiter = match self.config.delimiter.as_bytes() {
            [byte] => *byte,
            _ => bail!("delimiter must be a single byte (got {:?})", self.config.delimiter),
        };
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(self.config.headers)
            .flexible(true)
            .trim(Trim::All)
            .from_path(path)
            .with_context(|| format!("Failed to open tick file {}", path.display()))?;

        let date = file_date(path, &self.config.file_date_format);
        let mut delivered = 0;
        let mut skipped = 0;

        for (row, result) in reader.records().enumerate() {
            let record =
                result.with_context(|| format!("Failed to read row {} of {}", row + 1, path.display()))?;
            match self.parse_record(&record, date) {
                Ok(tick) => {
                    delivered += 1;
                    if !sink(tick) {
                        debug!(file = %path.display(), "tick consumer closed, stopping read");
                        break;
                    }
                }
                Err(e) => {
                    skipped += 1;
                    warn!(file = %path.display(), row = row + 1, "skipping row: {:#}", e);
                }
            }
        }

        info!(
            "Read {} ticks from {} ({} rows skipped)",
            delivered,
            path.display(),
            skipped
        );
        Ok(delivered)
    }

    /// Build a tick from one row
    pub fn parse_record(&self, record: &StringRecord, date: Option<NaiveDate>) -> Result<Tick> {
        let cols = &self.config.columns;
        if record.len() < cols.width() {
            bail!("expected at least {} fields, found {}", cols.width(), record.len());
        }
        let field = |i: usize| record.get(i).unwrap_or_default();

        let ticker = field(cols.ticker);
        if ticker.is_empty() {
            bail!("empty ticker");
        }
        let bid = price(field(cols.bid)).context("bad bid")?;
        let ask = price(field(cols.ask)).context("bad ask")?;
        let bid_size = field(cols.bid_size).parse::<Money>().unwrap_or_default();
        let ask_size = field(cols.ask_size).parse::<Money>().unwrap_or_default();
        let timestamp = self.timestamp(field(cols.timestamp), date)?;

        Ok(Tick::new(
            Symbol::new(ticker),
            bid,
            ask,
            bid_size,
            ask_size,
            timestamp,
        ))
    }

    fn timestamp(&self, raw: &str, date: Option<NaiveDate>) -> Result<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
            return Ok(ndt.and_utc());
        }

        let offset: i64 = raw
            .parse()
            .with_context(|| format!("unrecognised timestamp {:?}", raw))?;
        let midnight = date
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .context("numeric timestamp needs a date in the file name")?
            .and_utc();
        let unit = self.config.timestamp_unit;
        let Some(delta) = unit.to_duration(offset) else {
            bail!("timestamp offset {} out of range for unit {:?}", offset, unit);
        };
        match midnight.checked_add_signed(delta) {
            Some(ts) => Ok(ts),
            None => bail!("timestamp offset {} overflows the file date", offset),
        }
    }
}

fn price(raw: &str) -> Result<Money> {
    let value: Money = raw
        .parse()
        .map_err(|_| anyhow::anyhow!("not a number: {:?}", raw))?;
    if !value.is_positive() {
        bail!("price must be positive, got {}", value);
    }
    Ok(value)
}

/// Read the configured files in order on a blocking thread and push their
/// ticks into `tx`.
///
/// Path patterns are expanded first; if any matches nothing the task fails
/// before a tick is sent. Blocks while the queue is full. Dropping `tx` at the end signals end of
/// stream to the consumer. Resolves to the number of ticks sent.
pub fn spawn_producer(config: FileConfig, tx: mpsc::Sender<Tick>) -> JoinHandle<Result<usize>> {
    tokio::task::spawn_blocking(move || {
        let files = resolve_paths(&config.paths)?;
        info!("Reading {} tick files", files.len());
        let reader = TickReader::new(config);
        let mut sent = 0;
        for path in &files {
            let mut open = true;
            sent += reader.for_each_tick(path, |tick| {
                open = tx.blocking_send(tick).is_ok();
                open
            })?;
            if !open {
                warn!("tick queue closed before all files were read");
                break;
            }
        }
        Ok(sent)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn write_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lot_ledger_data_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_file_date_from_suffix() {
        let date = file_date(Path::new("data/taq_quotes_20240102.txt"), "%Y%m%d");
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(file_date(Path::new("quotes.txt"), "%Y%m%d"), None);
    }

    #[test]
    fn test_numeric_offsets_and_bad_rows() {
        let path = write_file(
            "quotes_20240102.txt",
            "ticker|ts|bid|bid_size|ask|ask_size\n\
             AAPL|34200000|185.10|3|185.12|5\n\
             AAPL|34200500|0|3|185.12|5\n\
             MSFT|34201000|370.00|1\n\
             MSFT|34201000|370.00|1|370.05|2\n",
        );
        let ticks = TickReader::new(FileConfig::default()).read_file(&path).unwrap();

        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].symbol, Symbol::new("AAPL"));
        assert_eq!(ticks[0].bid, "185.10".parse::<Money>().unwrap());
        assert_eq!(
            ticks[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap()
        );
        assert_eq!(ticks[1].symbol, Symbol::new("MSFT"));
        assert_eq!(ticks[1].ask_size, Money::from_i64(2));
    }

    #[test]
    fn test_custom_layout_with_string_timestamps() {
        let config = FileConfig {
            delimiter: ",".to_string(),
            headers: false,
            columns: TickColumns {
                ticker: 1,
                timestamp: 0,
                bid: 2,
                bid_size: 4,
                ask: 3,
                ask_size: 5,
            },
            ..FileConfig::default()
        };
        let path = write_file(
            "custom.csv",
            "2024-01-02 09:30:00,SPY,470.5,470.6,10,12\n\
             2024-01-02T09:30:01Z,SPY,470.4,470.5,10,12\n",
        );
        let ticks = TickReader::new(config).read_file(&path).unwrap();

        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].ask, "470.6".parse::<Money>().unwrap());
        assert_eq!(
            ticks[1].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 1).unwrap()
        );
    }

    #[test]
    fn test_out_of_range_offsets_are_skipped() {
        let path = write_file(
            "overflow_20240102.txt",
            "ticker|ts|bid|bid_size|ask|ask_size\n\
             AAPL|9223372036854775807|1|1|2|1\n\
             AAPL|34200000|1|1|2|1\n",
        );
        let ticks = TickReader::new(FileConfig::default()).read_file(&path).unwrap();
        assert_eq!(ticks.len(), 1);

        let path = write_file(
            "overflow_secs_20240102.txt",
            "ticker|ts|bid|bid_size|ask|ask_size\n\
             AAPL|99999999999999999|1|1|2|1\n\
             AAPL|34200|1|1|2|1\n",
        );
        let config = FileConfig {
            timestamp_unit: TimestampUnit::S,
            ..FileConfig::default()
        };
        let ticks = TickReader::new(config).read_file(&path).unwrap();
        assert_eq!(ticks.len(), 1);
        assert_eq!(
            ticks[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_resolve_paths_expands_globs_in_order() {
        let dir = std::env::temp_dir().join(format!("lot_ledger_glob_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["quotes_20240103.txt", "quotes_20240102.txt", "trades_20240102.txt"] {
            std::fs::write(dir.join(name), "ticker|ts|bid|bid_size|ask|ask_size\n").unwrap();
        }

        let files = resolve_paths(&[dir.join("quotes_*.txt")]).unwrap();
        assert_eq!(
            files,
            vec![dir.join("quotes_20240102.txt"), dir.join("quotes_20240103.txt")]
        );

        let err = resolve_paths(&[dir.join("missing_*.txt")]).unwrap_err();
        assert!(err.to_string().contains("no tick files match"));
    }

    #[tokio::test]
    async fn test_producer_reads_glob_matches_by_date() {
        let dir = std::env::temp_dir().join(format!("lot_ledger_glob_run_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("quotes_20240103.txt"),
            "ticker|ts|bid|bid_size|ask|ask_size\nB|1000|2.0|1|2.1|1\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("quotes_20240102.txt"),
            "ticker|ts|bid|bid_size|ask|ask_size\nA|1000|1.0|1|1.1|1\n",
        )
        .unwrap();

        let config = FileConfig {
            paths: vec![dir.join("quotes_*.txt")],
            ..FileConfig::default()
        };
        let (tx, mut rx) = mpsc::channel(4);
        let handle = spawn_producer(config, tx);

        let mut seen = Vec::new();
        while let Some(tick) = rx.recv().await {
            seen.push((tick.symbol.to_string(), tick.timestamp.date_naive()));
        }
        assert_eq!(
            seen,
            vec![
                ("A".to_string(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
                ("B".to_string(), NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()),
            ]
        );
        assert_eq!(handle.await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_producer_fails_when_pattern_matches_nothing() {
        let config = FileConfig {
            paths: vec![PathBuf::from("does/not/exist/quotes_*.txt")],
            ..FileConfig::default()
        };
        let (tx, mut rx) = mpsc::channel(1);
        let handle = spawn_producer(config, tx);

        assert!(rx.recv().await.is_none());
        assert!(handle.await.unwrap().is_err());
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let reader = TickReader::new(FileConfig::default());
        assert!(reader.read_file("does/not/exist_20240102.txt").is_err());
    }

    #[test]
    fn test_columns_validation() {
        assert!(TickColumns::default().validate().is_ok());
        assert_eq!(TickColumns::default().width(), 6);
        let dup = TickColumns {
            ask: 2,
            ..TickColumns::default()
        };
        assert!(dup.validate().is_err());
    }

    #[tokio::test]
    async fn test_producer_fills_queue_and_closes() {
        let path = write_file(
            "stream_20240103.txt",
            "ticker|ts|bid|bid_size|ask|ask_size\n\
             A|1000|1.0|1|1.1|1\n\
             B|2000|2.0|1|2.1|1\n\
             C|3000|3.0|1|3.1|1\n",
        );
        let config = FileConfig {
            paths: vec![path],
            ..FileConfig::default()
        };
        let (tx, mut rx) = mpsc::channel(1);
        let handle = spawn_producer(config, tx);

        let mut seen = Vec::new();
        while let Some(tick) = rx.recv().await {
            seen.push(tick.symbol.to_string());
        }
        assert_eq!(seen, vec!["A", "B", "C"]);
        assert_eq!(handle.await.unwrap().unwrap(), 3);
    }
}
