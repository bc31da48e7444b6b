//! Backtest command implementation

use anyhow::{Context, Result};
use lot_ledger::{data, report, strategies, Config, CostMethod, Simulation, SimulationSettings};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub fn run(
    config_path: String,
    cash_override: Option<f64>,
    cost_method_override: Option<CostMethod>,
    output_override: Option<PathBuf>,
) -> Result<()> {
    info!("Starting backtest");

    // Load configuration
    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    // Apply overrides
    if let Some(cash) = cash_override {
        info!("Overriding start cash to: {:.2}", cash);
        config.backtest.start_cash = cash;
    }

    if let Some(method) = cost_method_override {
        info!("Overriding cost method to: {}", method);
        config.backtest.cost_method = method;
    }

    if let Some(output) = output_override {
        info!("Overriding results path to: {}", output.display());
        config.backtest.results_path = output;
    }

    config.validate().context("Invalid configuration")?;
    debug!("Tick files: {:?}", config.file.paths);

    let strategy = strategies::from_config(&config)?;
    let mut simulation = Simulation::new(SimulationSettings::from_config(&config), strategy);

    let runtime = tokio::runtime::Runtime::new()?;
    let summary = runtime.block_on(async {
        let (tx, rx) = mpsc::channel(config.backtest.queue_capacity);
        let producer = data::spawn_producer(config.file.clone(), tx);

        info!("Running backtest...");
        let summary = simulation.run(rx).await;
        let sent = producer.await.context("Tick reader task failed")??;
        info!("Replayed {} ticks", sent);
        Ok::<_, anyhow::Error>(summary)
    })?;

    let rows = simulation.report();
    report::write_csv(&config.backtest.results_path, &rows)?;
    info!("Report written to: {}", config.backtest.results_path.display());

    let d = &summary.diagnostics;
    let total_return = if summary.start_cash.is_zero() {
        0.0
    } else {
        ((summary.final_cash - summary.start_cash) / summary.start_cash).to_f64() * 100.0
    };

    // Print results
    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS");
    println!("{}", "=".repeat(60));
    println!("Start Cash:         {:.2}", summary.start_cash.to_f64());
    println!("Final Cash:         {:.2}", summary.final_cash.to_f64());
    println!("Total Return:       {:.2}%", total_return);
    println!("Realized Gain:      {:.2}", summary.realized_gain.to_f64());
    println!("Closed Lots:        {}", summary.closed_lots);
    println!("Tickers Traded:     {}", rows.len());
    println!("{}", "-".repeat(60));
    println!("Ticks Processed:    {}", d.ticks);
    println!("Ticks Ignored:      {}", d.ignored);
    println!("Out Of Order:       {}", d.out_of_order);
    println!("Orders Opened:      {}", d.orders_opened);
    println!("Orders Cancelled:   {}", d.orders_cancelled);
    println!("Orders Closed:      {}", d.orders_closed);
    println!("Structural Errors:  {}", d.structural_errors);
    println!("Policy Errors:      {}", d.policy_errors);
    println!("{}", "=".repeat(60));

    info!("Backtest completed successfully");

    Ok(())
}
