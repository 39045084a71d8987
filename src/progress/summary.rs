//! Final run report
//!
//! A run ends with exactly one [`Outcome`], handed to a [`Report`]
//! implementation. The core never prints; presentation belongs to the
//! `Report` side.

use crate::config::OutputFormat;
use crate::core::CopyResult;
use crate::error::MirrorCopyError;
use serde::Serialize;
use std::io::Write;

/// Maximum number of error lines carried by a failure
pub const MAX_DETAIL_LINES: usize = 10;

const GB: u64 = 1_000_000_000;
const MB: f64 = 1_000_000.0;

/// Result of a run as seen by the front end
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Everything was copied
    Success {
        /// Regular files copied (hard links included)
        files_copied: u64,
        /// Total size, e.g. "12.34 MB"
        size_display: String,
    },
    /// The run failed or finished with errors
    Failure {
        /// One-line summary
        reason: String,
        /// First errors, one per line
        detail_lines: Vec<String>,
    },
}

impl Outcome {
    /// Summarise a finished copy pass
    pub fn from_result(result: &CopyResult) -> Self {
        if result.errors.is_empty() {
            return Outcome::Success {
                files_copied: result.files_copied,
                size_display: format_size(result.bytes_copied),
            };
        }

        let count = result.errors.len();
        let noun = if count == 1 { "error" } else { "errors" };
        let reason = if result.aborted {
            format!("Copy aborted after {} {}", count, noun)
        } else {
            format!("{} {} occurred while copying", count, noun)
        };

        Outcome::Failure {
            reason,
            detail_lines: result
                .errors
                .iter()
                .take(MAX_DETAIL_LINES)
                .map(|e| e.to_string())
                .collect(),
        }
    }

    /// A run that ended before copying
    pub fn from_error(error: &MirrorCopyError) -> Self {
        Outcome::Failure {
            reason: error.to_string(),
            detail_lines: Vec::new(),
        }
    }

    /// Is this a success?
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// Render a byte count in decimal MB, or GB from one billion bytes up
pub fn format_size(bytes: u64) -> String {
    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else {
        format!("{:.2} MB", bytes as f64 / MB)
    }
}

/// Receives the single outcome of a run
pub trait Report {
    /// Present the outcome
    fn report(&mut self, outcome: &Outcome);
}

/// Prints outcomes as text or JSON
pub struct ConsoleReport<O: Write, E: Write> {
    format: OutputFormat,
    quiet: bool,
    out: O,
    err: E,
}

impl ConsoleReport<std::io::Stdout, std::io::Stderr> {
    /// Report on the process's stdout/stderr
    pub fn stdio(format: OutputFormat, quiet: bool) -> Self {
        Self::new(format, quiet, std::io::stdout(), std::io::stderr())
    }
}

impl<O: Write, E: Write> ConsoleReport<O, E> {
    /// Report into arbitrary writers
    pub fn new(format: OutputFormat, quiet: bool, out: O, err: E) -> Self {
        Self {
            format,
            quiet,
            out,
            err,
        }
    }

    /// Give the writers back
    pub fn into_inner(self) -> (O, E) {
        (self.out, self.err)
    }

    fn write_text(&mut self, outcome: &Outcome) -> std::io::Result<()> {
        match outcome {
            Outcome::Success {
                files_copied,
                size_display,
            } => {
                if !self.quiet {
                    let noun = if *files_copied == 1 { "file" } else { "files" };
                    writeln!(self.out, "Copied {} {} ({})", files_copied, noun, size_display)?;
                }
            }
            Outcome::Failure {
                reason,
                detail_lines,
            } => {
                writeln!(self.err, "Error: {}", reason)?;
                for line in detail_lines {
                    writeln!(self.err, "  {}", line)?;
                }
            }
        }
        Ok(())
    }

    fn write_json(&mut self, outcome: &Outcome) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.out, outcome)?;
        writeln!(self.out)
    }
}

impl<O: Write, E: Write> Report for ConsoleReport<O, E> {
    fn report(&mut self, outcome: &Outcome) {
        let written = match self.format {
            OutputFormat::Text => self.write_text(outcome),
            OutputFormat::Json => self.write_json(outcome),
        };
        if let Err(e) = written {
            tracing::error!(error = %e, "could not write report");
        }
    }
}
