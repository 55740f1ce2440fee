//! Phase timing and human-readable formatting

use crate::Result;
use std::fmt;
use std::time::{Duration, Instant};

/// One timed phase
#[derive(Debug, Clone)]
pub struct PhaseReport {
    pub name: String,
    pub elapsed: Duration,
    /// Outcome summary, e.g. "1,234 students"
    pub detail: Option<String>,
}

/// Timings of one scenario run
#[derive(Debug, Clone)]
pub struct Report {
    pub title: String,
    pub phases: Vec<PhaseReport>,
    /// Storage footprint measured after the mutation phases
    pub size_bytes: Option<u64>,
}

impl Report {
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        tracing::info!(scenario = %title, "scenario started");
        Self {
            title,
            phases: Vec::new(),
            size_bytes: None,
        }
    }

    /// Run `f`, recording how long it took
    ///
    /// The phase is recorded only when `f` succeeds.
    pub fn phase<T>(&mut self, name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let started = Instant::now();
        let value = f()?;
        let elapsed = started.elapsed();
        tracing::info!(phase = name, elapsed_ms = elapsed.as_millis() as u64, "phase finished");
        self.phases.push(PhaseReport {
            name: name.to_string(),
            elapsed,
            detail: None,
        });
        Ok(value)
    }

    /// Attach a summary to the last recorded phase
    pub fn note(&mut self, detail: impl Into<String>) {
        if let Some(last) = self.phases.last_mut() {
            last.detail = Some(detail.into());
        }
    }

    pub fn record_size(&mut self, bytes: u64) {
        tracing::info!(bytes, "storage size measured");
        self.size_bytes = Some(bytes);
    }

    pub fn phase_named(&self, name: &str) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.name == name)
    }

    pub fn total_elapsed(&self) -> Duration {
        self.phases.iter().map(|p| p.elapsed).sum()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== {} ==", self.title)?;
        for phase in &self.phases {
            write!(f, "{:<40} {:>10.3}s", phase.name, phase.elapsed.as_secs_f64())?;
            if let Some(detail) = &phase.detail {
                write!(f, "  ({})", detail)?;
            }
            writeln!(f)?;
        }
        if let Some(bytes) = self.size_bytes {
            writeln!(f, "{:<40} {:>11}", "Storage size", format_bytes(bytes))?;
        }
        write!(f, "{:<40} {:>10.3}s", "Total", self.total_elapsed().as_secs_f64())
    }
}

/// `1234567` -> `"1,234,567"`
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Decimal byte units: `1_500_000` -> `"1.5 MB"`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1000 {
        return format!("{} bytes", bytes);
    }
    let mut value = bytes as f64 / 1000.0;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
