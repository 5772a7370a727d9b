use std::env;
use std::path::PathBuf;

pub struct CliOptions {
    pub scenario: Option<PathBuf>,
    pub preset: Option<String>,
    pub hydrology: Option<PathBuf>,
    pub daily_out: Option<PathBuf>,
    pub annual_out: Option<PathBuf>,
}

pub fn parse_args() -> Result<CliOptions, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(args)
}

fn parse_args_from(args: Vec<String>) -> Result<CliOptions, String> {
    if args.len() == 1 && (args[0] == "--help" || args[0] == "-h") {
        print_usage();
        std::process::exit(0);
    }
    parse_options(&args)
}

fn parse_options(args: &[String]) -> Result<CliOptions, String> {
    let mut i = 0usize;
    let mut scenario = None;
    let mut preset = None;
    let mut hydrology = None;
    let mut daily_out = None;
    let mut annual_out = None;

    fn take_path(
        args: &[String],
        i: &mut usize,
        name: &str,
        slot: &mut Option<PathBuf>,
    ) -> Result<(), String> {
        *i += 1;
        let value = args
            .get(*i)
            .ok_or_else(|| format!("missing value for {name} (expected a file path)"))?;
        if slot.replace(PathBuf::from(value)).is_some() {
            return Err(format!("{name} provided more than once"));
        }
        Ok(())
    }

    while i < args.len() {
        match args[i].as_str() {
            "--scenario" => take_path(args, &mut i, "--scenario", &mut scenario)?,
            "--hydrology" => take_path(args, &mut i, "--hydrology", &mut hydrology)?,
            "--daily-out" => take_path(args, &mut i, "--daily-out", &mut daily_out)?,
            "--annual-out" => take_path(args, &mut i, "--annual-out", &mut annual_out)?,
            "--preset" => {
                i += 1;
                let name = args.get(i).ok_or_else(|| {
                    "missing value for --preset (expected a preset name)".to_string()
                })?;
                if preset.replace(name.clone()).is_some() {
                    return Err("--preset provided more than once".to_string());
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    if scenario.is_some() && preset.is_some() {
        return Err(
            "arguments `--scenario` and `--preset` are mutually exclusive; choose one source"
                .to_string(),
        );
    }

    if scenario.is_none() && preset.is_none() {
        preset = Some("demo".to_string());
    }

    Ok(CliOptions {
        scenario,
        preset,
        hydrology,
        daily_out,
        annual_out,
    })
}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!(
        "  resop-sim [--scenario <path> | --preset <name>] [--hydrology <csv>] \
         [--daily-out <csv>] [--annual-out <csv>]"
    );
    eprintln!();
    eprintln!("Without --hydrology, the built-in synthetic record is simulated.");
}

#[cfg(test)]
mod tests {
    use super::parse_args_from;

    #[test]
    fn supports_scenario_cli() {
        let opts = parse_args_from(vec!["--scenario".to_string(), "rules.toml".to_string()])
            .expect("parse should succeed");
        assert_eq!(
            opts.scenario.as_deref().and_then(|p| p.to_str()),
            Some("rules.toml")
        );
        assert!(opts.preset.is_none());
    }

    #[test]
    fn defaults_to_demo_preset() {
        let opts = parse_args_from(vec![]).expect("parse should succeed");
        assert_eq!(opts.preset.as_deref(), Some("demo"));
        assert!(opts.scenario.is_none());
    }

    #[test]
    fn rejects_scenario_and_preset_together() {
        let err = parse_args_from(vec![
            "--scenario".to_string(),
            "rules.toml".to_string(),
            "--preset".to_string(),
            "demo".to_string(),
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_duplicate_output_path() {
        let err = parse_args_from(vec![
            "--daily-out".to_string(),
            "a.csv".to_string(),
            "--daily-out".to_string(),
            "b.csv".to_string(),
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_unknown_argument() {
        let err = parse_args_from(vec!["--bogus".to_string()]);
        assert!(err.is_err());
    }
}
