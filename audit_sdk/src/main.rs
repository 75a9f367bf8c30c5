//! # GKE CIS Audit CLI
//!
//! Loads run inputs and control definitions, wires up the fetcher registry
//! (node-level fetchers plus an optional fixture-backed cloud source), runs
//! the evaluation pool and writes the report.

use audit_controls::{catalog, load_controls_str, ControlDefinition, RunInputs, Severity};
use audit_engine::{run_audit, CancelToken, EvaluationContext, PoolConfig};
use audit_sdk::sinks::{ConsoleSink, JsonFileSink, MultiSink};
use audit_sdk::{create_node_registry, create_registry_with_fixtures};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "gke-audit",
    about = "Evaluate CIS GKE benchmark controls against cluster and node state"
)]
struct Args {
    /// Run inputs file (TOML).
    #[arg(long)]
    inputs: PathBuf,

    /// Control definition file or directory of .toml files. Defaults to the
    /// built-in CIS GKE catalog.
    #[arg(long)]
    controls: Option<PathBuf>,

    /// Directory of <selector>.json fixtures serving the cloud selectors.
    #[arg(long)]
    fixtures: Option<PathBuf>,

    /// Worker pool size. Defaults to the inputs file, then the CPU count.
    #[arg(long)]
    workers: Option<usize>,

    /// Write the JSON report here.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Minimum severity of a failed scored control that fails the run
    /// (none, low, medium, high). Overrides the inputs file.
    #[arg(long)]
    fail_on: Option<String>,

    /// Only print failed controls.
    #[arg(long)]
    quiet: bool,
}

fn default_workers() -> usize {
    num_cpus::get().min(8)
}

fn parse_severity(name: &str) -> Result<Severity, String> {
    match name {
        "none" => Ok(Severity::None),
        "low" => Ok(Severity::Low),
        "medium" => Ok(Severity::Medium),
        "high" => Ok(Severity::High),
        other => Err(format!(
            "unknown severity '{}' (expected none, low, medium or high)",
            other
        )),
    }
}

fn load_inputs(path: &Path) -> Result<RunInputs, String> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("cannot read inputs file '{}': {}", path.display(), e))?;
    toml::from_str(&contents).map_err(|e| format!("invalid inputs file '{}': {}", path.display(), e))
}

fn load_controls(path: &Path, inputs: &RunInputs) -> Result<Vec<ControlDefinition>, String> {
    let mut files = Vec::new();
    if path.is_dir() {
        for entry in fs::read_dir(path)
            .map_err(|e| format!("cannot read controls directory '{}': {}", path.display(), e))?
        {
            let entry = entry.map_err(|e| e.to_string())?;
            let file = entry.path();
            if file.extension().and_then(|ext| ext.to_str()) == Some("toml") {
                files.push(file);
            }
        }
        files.sort();
        if files.is_empty() {
            return Err(format!(
                "no .toml control files found in '{}'",
                path.display()
            ));
        }
    } else {
        files.push(path.to_path_buf());
    }

    let mut controls = Vec::new();
    for file in files {
        let contents = fs::read_to_string(&file)
            .map_err(|e| format!("cannot read control file '{}': {}", file.display(), e))?;
        let loaded = load_controls_str(&contents, inputs)
            .map_err(|e| format!("{}: {}", file.display(), e))?;
        controls.extend(loaded);
    }
    Ok(controls)
}

fn run(args: Args) -> Result<bool, String> {
    let inputs = load_inputs(&args.inputs)?;
    let workers = args
        .workers
        .or(inputs.workers)
        .unwrap_or_else(default_workers);
    let fail_on = match &args.fail_on {
        Some(name) => parse_severity(name)?,
        None => inputs.fail_on,
    };

    let controls = match &args.controls {
        Some(path) => load_controls(path, &inputs)?,
        None => catalog::cis_gke_catalog(&inputs),
    };
    if controls.is_empty() {
        return Err("no controls to evaluate".to_string());
    }

    let registry = match &args.fixtures {
        Some(dir) => create_registry_with_fixtures(dir),
        None => create_node_registry(),
    }
    .map_err(|e| format!("fetcher registry setup failed: {}", e))?;

    let context = EvaluationContext::new(inputs);
    let pool = PoolConfig::with_workers(workers);
    let cancel = CancelToken::new();

    let mut sink = MultiSink::new();
    sink.push(Box::new(if args.quiet {
        ConsoleSink::quiet()
    } else {
        ConsoleSink::new()
    }));
    let mut json_path = None;
    if let Some(path) = &args.output {
        sink.push(Box::new(JsonFileSink::new(path)));
        json_path = Some(path.clone());
    }

    let report = run_audit(&controls, &context, &registry, &pool, &cancel, &mut sink);

    if let Some(path) = json_path {
        println!("report written to {}", path.display());
    }

    Ok(report.breaches(fail_on))
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::FAILURE,
        Err(message) => {
            eprintln!("error: {}", message);
            ExitCode::from(2)
        }
    }
}
