//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use dispatch_sim::config::StrategyKind;

#[derive(Debug, Parser)]
#[command(name = "dispatch-sim")]
#[command(author, version, about = "Site dispatch simulator")]
#[command(
    long_about = "Runs the per-slot dispatch engine over a CSV slot series and prints\n\
    one decision line per slot followed by a KPI report.\n\
    \nExamples:\n  \
    dispatch-sim --series day.csv\n  \
    dispatch-sim --preset commercial --series day.csv --strategy peak-shaving\n  \
    dispatch-sim --config site.toml --series day.csv --initial-soc 80 -v"
)]
pub struct Cli {
    /// Site configuration TOML file
    #[arg(long, conflicts_with = "preset")]
    pub config: Option<PathBuf>,

    /// Built-in site preset (residential, commercial)
    #[arg(long)]
    pub preset: Option<String>,

    /// CSV slot series to simulate
    #[arg(long)]
    pub series: PathBuf,

    /// Override the configured dispatch strategy
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Override the initial battery SoC (percent)
    #[arg(long)]
    pub initial_soc: Option<f32>,

    /// Log policy decisions at debug level
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    CostOptimization,
    PeakShaving,
}

impl From<StrategyArg> for StrategyKind {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::CostOptimization => StrategyKind::CostOptimization,
            StrategyArg::PeakShaving => StrategyKind::PeakShaving,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_preset_run() {
        let cli = Cli::try_parse_from([
            "dispatch-sim",
            "--preset",
            "commercial",
            "--series",
            "day.csv",
            "--strategy",
            "peak-shaving",
        ]);
        assert!(cli.is_ok(), "{:?}", cli.err());
        let cli = cli.ok();
        assert_eq!(cli.as_ref().and_then(|c| c.preset.as_deref()), Some("commercial"));
        assert_eq!(
            cli.as_ref().and_then(|c| c.strategy),
            Some(StrategyArg::PeakShaving)
        );
    }

    #[test]
    fn series_is_required() {
        assert!(Cli::try_parse_from(["dispatch-sim", "--preset", "residential"]).is_err());
    }

    #[test]
    fn config_and_preset_are_exclusive() {
        let cli = Cli::try_parse_from([
            "dispatch-sim",
            "--config",
            "site.toml",
            "--preset",
            "residential",
            "--series",
            "day.csv",
        ]);
        assert!(cli.is_err());
    }
}
