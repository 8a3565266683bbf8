//! Dispatch simulator entry point: CLI wiring and config-driven run.

mod cli;
mod telemetry;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{error, info};

use dispatch_sim::config::SiteConfig;
use dispatch_sim::series::{CsvSeries, ForecastProvider, check_spacing};
use dispatch_sim::sim::{KpiReport, Simulation};

use cli::Cli;

fn load_config(cli: &Cli) -> Result<SiteConfig> {
    // --config takes priority, then --preset, then residential default
    let mut config = match (&cli.config, &cli.preset) {
        (Some(path), _) => SiteConfig::from_toml_file(path)?,
        (None, Some(name)) => SiteConfig::from_preset(name)?,
        (None, None) => SiteConfig::residential(),
    };

    if let Some(strategy) = cli.strategy {
        config.simulation.strategy = strategy.into();
    }
    if let Some(soc) = cli.initial_soc {
        config.simulation.initial_soc_pct = soc;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("{e}");
        }
        bail!("{} configuration error(s)", errors.len());
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);

    let config = load_config(&cli)?;
    let provider = CsvSeries::new(&cli.series);
    let series = provider
        .series()
        .with_context(|| format!("loading {}", cli.series.display()))?;
    check_spacing(&series, config.simulation.slot_minutes)?;

    info!(
        slots = series.len(),
        strategy = ?config.simulation.strategy,
        "starting simulation"
    );

    let dt = config.slot_hours();
    let capacity = config.battery.capacity_kwh;
    let mut sim = Simulation::new(config, series);
    let results = sim.run();

    for r in &results {
        println!("{r}");
    }

    let kpi = KpiReport::from_results(&results, dt, capacity);
    println!("\n{kpi}");
    Ok(())
}
