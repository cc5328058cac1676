//! Security Mark command line
//!
//! Watermarks a single image and reports the degradation tier reached.
//!
//! Run with: security-mark <input> <output> [--seed N] [--config file.json] [--json]

use std::{env, path::PathBuf, process};

use security_mark::{
    MarkError, PipelineConfig, PipelineController, ProcessReport, error::Result,
};

struct Args {
    input: PathBuf,
    output: PathBuf,
    seed: Option<u64>,
    config: Option<PathBuf>,
    json: bool,
}

fn print_usage(program: &str) {
    println!("Security Mark - frequency-domain watermarking with face protection");
    println!();
    println!("Usage: {program} <input> <output> [--seed N] [--config file.json] [--json]");
    println!();
    println!("Arguments:");
    println!("  input     - Image to mark");
    println!("  output    - Where to write the marked image (format follows extension)");
    println!("  --seed    - Fixed seed for reproducible noise");
    println!("  --config  - JSON file overriding pipeline defaults");
    println!("  --json    - Print the result as JSON");
}

fn parse_args(raw: &[String]) -> Result<Option<Args>> {
    let mut positional = Vec::new();
    let mut seed = None;
    let mut config = None;
    let mut json = false;

    let mut iter = raw.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "--json" => json = true,
            "--seed" => {
                let value = iter
                    .next()
                    .ok_or_else(|| MarkError::InvalidParameter("--seed needs a value".into()))?;
                seed = Some(value.parse::<u64>().map_err(|e| {
                    MarkError::InvalidParameter(format!("bad --seed '{value}': {e}"))
                })?);
            }
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| MarkError::InvalidParameter("--config needs a path".into()))?;
                config = Some(PathBuf::from(value));
            }
            other => positional.push(PathBuf::from(other)),
        }
    }

    match <[PathBuf; 2]>::try_from(positional) {
        Ok([input, output]) => Ok(Some(Args {
            input,
            output,
            seed,
            config,
            json,
        })),
        Err(positional) if positional.is_empty() => Ok(None),
        Err(positional) => Err(MarkError::InvalidParameter(format!(
            "expected <input> <output>, got {} path(s)",
            positional.len()
        ))),
    }
}

fn run(args: &Args) -> Result<ProcessReport> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let controller = PipelineController::with_config(config)?;
    let result = controller.process(&args.input, &args.output)?;
    Ok(ProcessReport::from(&result))
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let raw: Vec<String> = env::args().collect();
    let program = raw.first().map(String::as_str).unwrap_or("security-mark");

    let args = match parse_args(&raw) {
        Ok(Some(args)) => args,
        Ok(None) => {
            print_usage(program);
            return;
        }
        Err(err) => {
            eprintln!("Error: {err}");
            process::exit(2);
        }
    };

    let (report, failed) = match run(&args) {
        Ok(report) => (report, false),
        Err(err) => (ProcessReport::from(&err), true),
    };

    if args.json {
        match report.to_json() {
            Ok(json) => println!("{json}"),
            Err(err) => eprintln!("Error: cannot serialise report: {err}"),
        }
    } else {
        println!("{}", report.summary());
    }

    if failed {
        process::exit(1);
    }
}
