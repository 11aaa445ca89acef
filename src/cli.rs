use std::env;
use std::path::PathBuf;

/// Parsed command-line options.
#[derive(Debug, Default)]
pub struct CliOptions {
    pub scenario: Option<PathBuf>,
    pub preset: Option<String>,
    pub seed: Option<u64>,
    pub threads: Option<usize>,
    pub output: Option<PathBuf>,
    pub help: bool,
}

pub fn parse_args() -> Result<CliOptions, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(&args)
}

/// Parses options from `args`, program name excluded.
///
/// Defaults to the `demo` preset when neither `--scenario` nor `--preset`
/// is given.
pub fn parse_args_from(args: &[String]) -> Result<CliOptions, String> {
    let mut opts = CliOptions::default();
    let mut i = 0usize;

    while i < args.len() {
        match args[i].as_str() {
            "--scenario" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --scenario (expected a TOML file path)")?;
                if opts.scenario.replace(PathBuf::from(path)).is_some() {
                    return Err("--scenario provided more than once".to_string());
                }
            }
            "--preset" => {
                i += 1;
                let name = args.next_or_err(i, "missing value for --preset (expected a preset name)")?;
                if opts.preset.replace(name.to_string()).is_some() {
                    return Err("--preset provided more than once".to_string());
                }
            }
            "--seed" => {
                i += 1;
                let raw = args.next_or_err(i, "missing value for --seed (expected a u64)")?;
                let seed = raw
                    .parse::<u64>()
                    .map_err(|_| format!("--seed value \"{raw}\" is not a valid u64"))?;
                opts.seed = Some(seed);
            }
            "--threads" => {
                i += 1;
                let raw = args.next_or_err(i, "missing value for --threads (expected a positive integer)")?;
                let threads = raw
                    .parse::<usize>()
                    .ok()
                    .filter(|t| *t > 0)
                    .ok_or_else(|| format!("--threads value \"{raw}\" is not a positive integer"))?;
                opts.threads = Some(threads);
            }
            "--output" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --output (expected a directory)")?;
                opts.output = Some(PathBuf::from(path));
            }
            "--help" | "-h" => {
                opts.help = true;
                return Ok(opts);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    if opts.scenario.is_some() && opts.preset.is_some() {
        return Err(
            "arguments `--scenario` and `--preset` are mutually exclusive; choose one source"
                .to_string(),
        );
    }

    if opts.scenario.is_none() && opts.preset.is_none() {
        opts.preset = Some("demo".to_string());
    }

    Ok(opts)
}

trait SliceArgExt {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String>;
}

impl SliceArgExt for [String] {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String> {
        self.get(index)
            .map(String::as_str)
            .ok_or_else(|| err.to_string())
    }
}

pub fn print_usage() {
    eprintln!("simbev: EV mobility and charging-demand simulator");
    eprintln!();
    eprintln!("Usage: simbev [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>   Load scenario from TOML config file");
    eprintln!("  --preset <name>     Use a built-in preset (demo, private_only, fast_charging)");
    eprintln!("  --seed <u64>        Override random seed");
    eprintln!("  --threads <n>       Override worker thread count");
    eprintln!("  --output <dir>      Override output directory");
    eprintln!("  --help              Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the demo preset is used.");
    eprintln!("Log verbosity follows RUST_LOG (default: info).");
}

#[cfg(test)]
mod tests {
    use super::parse_args_from;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn supports_scenario_cli() {
        let opts = parse_args_from(&args(&["--scenario", "scenario.toml"])).expect("parse should succeed");
        assert_eq!(
            opts.scenario.as_deref().and_then(|p| p.to_str()),
            Some("scenario.toml")
        );
        assert!(opts.preset.is_none());
    }

    #[test]
    fn defaults_to_demo_preset() {
        let opts = parse_args_from(&[]).expect("parse should succeed");
        assert_eq!(opts.preset.as_deref(), Some("demo"));
    }

    #[test]
    fn parses_overrides() {
        let opts = parse_args_from(&args(&["--preset", "private_only", "--seed", "7", "--threads", "4", "--output", "out"]))
            .expect("parse should succeed");
        assert_eq!(opts.preset.as_deref(), Some("private_only"));
        assert_eq!(opts.seed, Some(7));
        assert_eq!(opts.threads, Some(4));
        assert_eq!(opts.output.as_deref().and_then(|p| p.to_str()), Some("out"));
    }

    #[test]
    fn rejects_conflicting_sources() {
        let err = parse_args_from(&args(&["--scenario", "a.toml", "--preset", "demo"]));
        assert!(err.is_err());
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(parse_args_from(&args(&["--seed", "-1"])).is_err());
        assert!(parse_args_from(&args(&["--threads", "0"])).is_err());
        assert!(parse_args_from(&args(&["--seed"])).is_err());
        assert!(parse_args_from(&args(&["--bogus"])).is_err());
    }

    #[test]
    fn help_short_circuits() {
        let opts = parse_args_from(&args(&["--help", "--bogus"])).expect("parse should succeed");
        assert!(opts.help);
    }
}
