//! Search-trace logging for the synthesizer.
//!
//! The CLI keeps stdout for the candidate stream, so everything worth
//! keeping about a run (solver verdicts and their latency, which frame
//! refuted which candidate, the completeness outcome) goes to a trace file
//! with timestamps relative to the start of the trace. A failed or slow
//! search can then be reconstructed offline without rerunning Z3.
//!
//! Entries are structured per event rather than free-form strings: the
//! search loop reports candidates by examination index, and refuting
//! frames are written out line by line under the candidate they killed.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

struct Trace {
    file: File,
    started: Instant,
}

/// Global trace handle; absent until one of the init functions runs.
static TRACE: OnceLock<Mutex<Option<Trace>>> = OnceLock::new();

/// Start tracing to a file. The first initialization wins.
pub fn init_file_logging(path: impl Into<PathBuf>) {
    let trace = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.into())
        .ok()
        .map(|file| Trace {
            file,
            started: Instant::now(),
        });

    let _ = TRACE.set(Mutex::new(trace));
}

/// Start tracing to the default location under the system temp dir.
pub fn init_default_logging() {
    init_file_logging(std::env::temp_dir().join("modalsynth-trace.log"));
}

fn write_line(line: &str) {
    let Some(mutex) = TRACE.get() else { return };
    let Ok(mut guard) = mutex.lock() else { return };
    let Some(trace) = guard.as_mut() else { return };

    let elapsed = trace.started.elapsed().as_secs_f64();
    let _ = writeln!(trace.file, "[{:>10.3}s] {}", elapsed, line);
    let _ = trace.file.flush();
}

/// A satisfiability check finished with the given verdict.
pub fn solver_check(verdict: &str, elapsed: Duration) {
    write_line(&format!("check: {} ({} ms)", verdict, elapsed.as_millis()));
}

/// The search decoded its `index`-th candidate formula.
pub fn candidate(index: usize, formula: &dyn fmt::Display) {
    write_line(&format!("candidate #{}: {}", index, formula));
}

/// The `index`-th candidate survived the countermodel search.
pub fn accepted(index: usize) {
    write_line(&format!("candidate #{} accepted", index));
}

/// The `index`-th candidate was refuted; the frame is recorded line by
/// line so multi-line structure dumps stay readable in the trace.
pub fn rejected(index: usize, countermodel: &dyn fmt::Display) {
    write_line(&format!("candidate #{} refuted by:", index));
    for line in countermodel.to_string().lines() {
        write_line(&format!("    {}", line));
    }
}

/// Outcome of the bounded completeness check.
pub fn completeness(complete: bool, model_size: usize) {
    let outcome = if complete { "complete" } else { "incomplete" };
    write_line(&format!("axiomatization {} up to size {}", outcome, model_size));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_entries() {
        init_default_logging();
        solver_check("Sat", Duration::from_millis(3));
        candidate(1, &"(□p → p)");
        rejected(1, &"sort W = {0..1}\nrelation R = {}");
        accepted(2);
        completeness(true, 3);
    }
}
