//! Built-in strategies
//!
//! Selected by the `name` field of the `strategy` config section.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::oms::{Order, Strategy};
use crate::portfolio::Portfolio;
use crate::{Config, Money, Tick};

/// Names accepted in `strategy.name`
pub const AVAILABLE: &[&str] = &["spread_capture"];

/// Build the strategy named in `config`
pub fn from_config(config: &Config) -> Result<Box<dyn Strategy>> {
    let name = config.strategy_name()?;
    info!("Creating strategy: {}", name);
    match name.as_str() {
        "spread_capture" => {
            let params: SpreadCaptureConfig = serde_json::from_value(config.strategy.clone())
                .map_err(|e| anyhow::anyhow!("Failed to parse spread_capture config: {}", e))?;
            Ok(Box::new(SpreadCapture::new(params)))
        }
        other => bail!(
            "Unknown strategy: {}. Available strategies: {}",
            other,
            AVAILABLE.join(", ")
        ),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpreadCaptureConfig {
    /// Shares bought per entry
    pub volume: f64,
    /// Enter only while the quoted spread is at most this percent of the ask
    pub max_spread_pct: f64,
    /// Exit once the bid has moved this percent away from the entry ask
    pub exit_move_pct: f64,
    /// Open lots allowed per ticker
    pub max_lots: u32,
}

impl Default for SpreadCaptureConfig {
    fn default() -> Self {
        SpreadCaptureConfig {
            volume: 100.0,
            max_spread_pct: 0.05,
            exit_move_pct: 0.5,
            max_lots: 1,
        }
    }
}

/// Buys on tight spreads, sells on a fixed move either way
#[derive(Debug, Clone)]
pub struct SpreadCapture {
    config: SpreadCaptureConfig,
    volume: Money,
}

impl SpreadCapture {
    pub fn new(config: SpreadCaptureConfig) -> Self {
        let volume = Money::from_f64(config.volume);
        Self { config, volume }
    }
}

impl Strategy for SpreadCapture {
    fn name(&self) -> &str {
        "spread_capture"
    }

    fn entry_check(&self, tick: &Tick) -> Option<Order> {
        (tick.spread_pct() <= self.config.max_spread_pct)
            .then(|| Order::market_buy(tick, self.volume))
    }

    fn exit_check(&self, open: &Order, tick: &Tick) -> Option<Order> {
        let entry = open.quote.ask;
        if entry.is_zero() {
            return None;
        }
        let moved = ((tick.bid - entry) / entry).to_f64() * 100.0;
        (moved.abs() >= self.config.exit_move_pct)
            .then(|| Order::market_sell(tick, open.quote.volume))
    }

    fn valid_order(&self, portfolio: &Portfolio, order: &Order) -> bool {
        if !order.is_buy() {
            return true;
        }
        let cap = self.volume * Money::from_u64(u64::from(self.config.max_lots));
        portfolio.position(&order.quote.symbol) + order.quote.volume <= cap
    }
}
