//! Configuration management
//!
//! Loads the JSON run configuration: input file layout, backtest accounting
//! settings, benchmark toggle and free-form strategy parameters.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::data::FileConfig;
use crate::{CostMethod, Money, Symbol};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub file: FileConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
    /// Strategy parameters; `name` selects the implementation
    #[serde(default)]
    pub strategy: serde_json::Value,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        Ok(config)
    }

    /// Reject settings no run can proceed with
    pub fn validate(&self) -> Result<()> {
        if self.backtest.start_cash < 0.0 {
            bail!("start_cash must not be negative (got {})", self.backtest.start_cash);
        }
        if self.backtest.queue_capacity == 0 {
            bail!("queue_capacity must be at least 1");
        }
        self.file.columns.validate()?;
        if self.file.delimiter.len() != 1 {
            bail!("delimiter must be a single byte (got {:?})", self.file.delimiter);
        }
        Ok(())
    }

    /// Get strategy name from strategy config
    pub fn strategy_name(&self) -> Result<String> {
        self.strategy
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .context("'name' is required in the 'strategy' section of config. Example: \"strategy\": { \"name\": \"spread_capture\", ... }")
    }

    pub fn start_cash(&self) -> Money {
        Money::from_f64(self.backtest.start_cash)
    }

    /// Tickers whose ticks are dropped before reaching the matcher
    pub fn ignored(&self) -> HashSet<Symbol> {
        self.backtest.ignore.iter().map(Symbol::new).collect()
    }
}

/// Backtest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub start_cash: f64,
    pub cost_method: CostMethod,
    pub ignore: Vec<String>,
    /// Ticks buffered between the file reader and the matcher
    pub queue_capacity: usize,
    pub results_path: PathBuf,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            start_cash: 10_000.0,
            cost_method: CostMethod::Fifo,
            ignore: Vec::new(),
            queue_capacity: 6000,
            results_path: PathBuf::from("results/sim_output.csv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    pub enabled: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig { enabled: true }
    }
}
