//! MirrorCopy CLI - mirror a folder to the desktop
//!
//! Exit code 0 on success or when no source is given, 1 on any failure.

use clap::Parser;
use mirrorcopy::config::{CliArgs, SyncConfig};
use mirrorcopy::core::{run, strip_quotes, RunStatus};
use mirrorcopy::progress::{ConsoleReport, Outcome, ProgressReporter, Report};
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    init_logging(&args);

    // no source is a silent no-op, whatever the rest of the configuration says
    let Some(source) = args.source_arg().filter(|s| !strip_quotes(s).is_empty()) else {
        tracing::debug!("no source given, nothing to do");
        std::process::exit(RunStatus::NoOp.exit_code());
    };

    let mut report = ConsoleReport::stdio(args.output_format, args.quiet);

    let config = match SyncConfig::from_cli(&args) {
        Ok(config) => config,
        Err(e) => {
            tracing::debug!(error = %e, "invalid configuration");
            report.report(&Outcome::from_error(&e));
            std::process::exit(RunStatus::Failure.exit_code());
        }
    };

    let progress = (args.progress && !args.quiet).then(ProgressReporter::new);

    let status = run(Some(source), &config, &mut report, progress);
    std::process::exit(status.exit_code());
}

/// `RUST_LOG` wins; otherwise the level follows `-v`. Logs go to stderr so
/// stdout carries only the report.
fn init_logging(args: &CliArgs) {
    let level = match args.verbose {
        0 => "error",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mirrorcopy={}", level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}
