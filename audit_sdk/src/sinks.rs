//! Report sinks: console summary and JSON file output.

use audit_engine::report::{ControlOutcome, ControlResult, ReportSink, RunReport};
use std::fs;
use std::io;
use std::path::PathBuf;

/// Prints one line per finished control and a final summary, the scanner's
/// console shape.
#[derive(Default)]
pub struct ConsoleSink {
    quiet: bool,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quiet() -> Self {
        Self { quiet: true }
    }
}

impl ReportSink for ConsoleSink {
    fn accept(&mut self, result: &ControlResult) {
        if self.quiet && result.outcome != ControlOutcome::Fail {
            return;
        }
        println!(
            "cis-gke-{:<8} {:<14} [{}] {}",
            result.control_id,
            result.outcome.as_str().to_uppercase(),
            result.severity,
            result.title
        );
        for verdict in result.failed_verdicts() {
            println!("    {} -> {}", verdict.resource, verdict.message);
        }
    }

    fn finish(&mut self, report: &RunReport) {
        println!(
            "\n{} controls: {} passed, {} failed, {} not applicable, {} errors, {} skipped ({:.2}s)",
            report.totals.total,
            report.totals.passed,
            report.totals.failed,
            report.totals.not_applicable,
            report.totals.errors,
            report.totals.skipped,
            report.duration_ms as f64 / 1000.0
        );
    }
}

/// Writes the full report envelope as pretty JSON when the run finishes.
pub struct JsonFileSink {
    path: PathBuf,
    error: Option<io::Error>,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            error: None,
        }
    }

    /// Write failure, if any; checked after the run.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }
}

impl ReportSink for JsonFileSink {
    fn accept(&mut self, _result: &ControlResult) {}

    fn finish(&mut self, report: &RunReport) {
        let json = match report.to_json() {
            Ok(json) => json,
            Err(e) => {
                self.error = Some(io::Error::new(io::ErrorKind::InvalidData, e));
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, json) {
            log::warn!("cannot write report to '{}': {}", self.path.display(), e);
            self.error = Some(e);
        }
    }
}

/// Fan one run out to several sinks.
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn ReportSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn ReportSink>) {
        self.sinks.push(sink);
    }
}

impl ReportSink for MultiSink {
    fn accept(&mut self, result: &ControlResult) {
        for sink in &mut self.sinks {
            sink.accept(result);
        }
    }

    fn finish(&mut self, report: &RunReport) {
        for sink in &mut self.sinks {
            sink.finish(report);
        }
    }
}
