//! Process table inspection via `/proc`.
//!
//! Replaces the benchmark's `ps -ef | grep ... | sed` pipelines: command
//! lines are read from `/proc/<pid>/cmdline` (NUL-separated argv) and flag
//! values extracted structurally, handling both `--flag=value` and
//! `--flag value` spellings.

use std::fs;
use std::path::Path;

/// One running process: pid and argv.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: u32,
    pub argv: Vec<String>,
}

impl ProcessInfo {
    /// Basename of argv[0].
    pub fn command(&self) -> Option<&str> {
        self.argv
            .first()
            .map(|arg0| arg0.rsplit('/').next().unwrap_or(arg0))
    }

    /// Extract a `--flag` value from the argv.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        let prefix = format!("{}=", flag);
        let mut args = self.argv.iter();
        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix(&prefix) {
                return Some(value);
            }
            if arg == flag {
                return args.next().map(String::as_str);
            }
        }
        None
    }
}

/// List processes from a proc filesystem root (`/proc` outside tests).
pub fn list_processes(proc_root: &Path) -> Vec<ProcessInfo> {
    let entries = match fs::read_dir(proc_root) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("cannot read {}: {}", proc_root.display(), e);
            return Vec::new();
        }
    };

    let mut processes = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        let Ok(raw) = fs::read(entry.path().join("cmdline")) else {
            continue;
        };
        let argv: Vec<String> = raw
            .split(|b| *b == 0)
            .filter(|part| !part.is_empty())
            .map(|part| String::from_utf8_lossy(part).to_string())
            .collect();
        if !argv.is_empty() {
            processes.push(ProcessInfo { pid, argv });
        }
    }
    processes
}

/// Find the first process whose command matches `name`.
pub fn find_process(proc_root: &Path, name: &str) -> Option<ProcessInfo> {
    list_processes(proc_root)
        .into_iter()
        .find(|process| process.command() == Some(name))
}
