//! Reservoir-operations simulator entry point.

use std::process;

use anyhow::Context;
use log::info;

use resop_sim::cli;
use resop_sim::config::ScenarioConfig;
use resop_sim::hydrology::HydrologyRecord;
use resop_sim::io::export::{export_annual_csv, export_daily_csv};
use resop_sim::runner::run_scenario;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = match cli::parse_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("error: {e}");
            cli::print_usage();
            process::exit(1);
        }
    };

    let scenario = if let Some(ref path) = opts.scenario {
        ScenarioConfig::from_toml_file(path)?
    } else if let Some(ref name) = opts.preset {
        ScenarioConfig::from_preset(name)?
    } else {
        ScenarioConfig::demo()
    };

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let record = if let Some(ref path) = opts.hydrology {
        HydrologyRecord::from_csv(path, &scenario.simulation.key)
            .with_context(|| format!("loading hydrology from {}", path.display()))?
    } else {
        info!(
            "no hydrology file given, using the synthetic record ({} water years)",
            scenario.simulation.years
        );
        HydrologyRecord::synthetic(
            &scenario.simulation.key,
            scenario.simulation.start_year,
            scenario.simulation.years,
        )
    };

    let result = run_scenario(&scenario, &record)?;
    println!("{}", result.summary);

    if let Some(ref path) = opts.daily_out {
        export_daily_csv(&result, path)
            .with_context(|| format!("writing daily series to {}", path.display()))?;
        eprintln!("Daily series written to {}", path.display());
    }
    if let Some(ref path) = opts.annual_out {
        export_annual_csv(&result, path)
            .with_context(|| format!("writing annual series to {}", path.display()))?;
        eprintln!("Annual series written to {}", path.display());
    }

    Ok(())
}
