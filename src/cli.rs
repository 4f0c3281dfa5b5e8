//! Command-line entry: argument contract, logging setup, engine assembly,
//! and the mapping from worker errors to stable exit codes.

use std::io;
use std::process;

use clap::Parser;

use crate::config::types::{EvalMode, Result, WorkerError, DEFANG_BLOCKLIST, SANDBOX_IDENTITY};
use crate::engine::clock::{SnapshotClock, TimeSnapshot};
use crate::engine::fixture::FixtureEngine;
use crate::protocol::FrameSink;
use crate::sandbox::phases::Worker;

/// Argument contract: exactly `<expressions> <mode-bits> <base>`, or the
/// single word `update`. Help and version flags are disabled so the parent
/// can pass arbitrary expression text positionally, leading hyphens
/// included.
#[derive(Parser, Debug)]
#[command(name = "worker", disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    /// Newline-separated expression batch, or the word `update`.
    #[arg(allow_hyphen_values = true)]
    expressions: String,

    /// Bitmask: bit 0 high precision, bit 1 exact, bit 2 no color.
    #[arg(allow_hyphen_values = true)]
    mode_bits: Option<String>,

    /// Output base for formatting.
    #[arg(allow_hyphen_values = true)]
    base: Option<String>,
}

#[derive(Debug)]
enum Invocation {
    Update,
    Evaluate {
        input: String,
        mode: EvalMode,
        base: i32,
    },
}

/// Sort a parsed argument vector into one of the two invocation shapes.
///
/// Three positionals always evaluate, even when the first one happens to be
/// the word `update`; only the bare single argument selects the refresh
/// branch.
fn classify(cli: Cli) -> Result<Invocation> {
    match (cli.mode_bits, cli.base) {
        (None, None) if cli.expressions == "update" => Ok(Invocation::Update),
        (Some(mode), Some(base)) => {
            let bits: u32 = mode.parse().map_err(|_| {
                WorkerError::Usage(format!("mode bits are not an unsigned integer: {mode}"))
            })?;
            let base: i32 = base
                .parse()
                .map_err(|_| WorkerError::Usage(format!("base is not an integer: {base}")))?;
            Ok(Invocation::Evaluate {
                input: cli.expressions,
                mode: EvalMode::from_bits(bits),
                base,
            })
        }
        _ => Err(WorkerError::Usage(
            "expected <expressions> <mode-bits> <base>, or `update`".to_string(),
        )),
    }
}

fn parse_args() -> Result<Invocation> {
    let cli = Cli::try_parse().map_err(|err| WorkerError::Usage(err.to_string()))?;
    classify(cli)
}

/// Binary entry point behind `main`. Never returns: after lockdown the
/// runtime's normal exit path issues syscalls the filter kills, so every
/// outcome leaves through `process::exit`, which goes straight to
/// `exit_group`.
pub fn run() -> ! {
    // Logging goes to stderr; stdout belongs to the protocol. Timestamps
    // stay off because the formatter would query the clock after lockdown.
    env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .init();

    let outcome = match parse_args() {
        Ok(Invocation::Update) => update(),
        Ok(Invocation::Evaluate { input, mode, base }) => evaluate(&input, mode, base),
        Err(err) => Err(err),
    };

    let code = match outcome {
        Ok(()) => 0,
        Err(err) => {
            log::error!("{err}");
            i32::from(&err)
        }
    };
    process::exit(code)
}

/// The time snapshot is captured here, while clock syscalls still work; the
/// engine keeps the only copy and answers every later time query from it.
fn build_engine() -> FixtureEngine {
    let snapshot = TimeSnapshot::capture();
    log::debug!(
        "time pinned at {:04}-{:02}-{:02}",
        snapshot.year,
        snapshot.month,
        snapshot.day
    );
    FixtureEngine::new(Box::new(SnapshotClock::new(snapshot)))
}

fn evaluate(input: &str, mode: EvalMode, base: i32) -> Result<()> {
    let stdout = io::stdout().lock();
    let mut sink = FrameSink::new(stdout);

    Worker::new(build_engine())
        .deescalate(SANDBOX_IDENTITY)
        .pin_environment()
        .load_definitions()?
        .defang(DEFANG_BLOCKLIST)
        .lockdown()
        .evaluate(&mut sink, input, mode, base)
}

fn update() -> Result<()> {
    Worker::new(build_engine())
        .deescalate(SANDBOX_IDENTITY)
        .update_rates()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Invocation> {
        let cli = Cli::try_parse_from(args).map_err(|err| WorkerError::Usage(err.to_string()))?;
        classify(cli)
    }

    #[test]
    fn three_positionals_evaluate() {
        match parse(&["worker", "1+1", "6", "10"]) {
            Ok(Invocation::Evaluate { input, mode, base }) => {
                assert_eq!(input, "1+1");
                assert!(mode.exact());
                assert!(mode.no_color());
                assert!(!mode.high_precision());
                assert_eq!(base, 10);
            }
            other => panic!("unexpected parse outcome: {other:?}"),
        }
    }

    #[test]
    fn bare_update_selects_the_refresh_branch() {
        assert!(matches!(
            parse(&["worker", "update"]),
            Ok(Invocation::Update)
        ));
    }

    #[test]
    fn update_with_mode_and_base_is_an_expression() {
        match parse(&["worker", "update", "0", "10"]) {
            Ok(Invocation::Evaluate { input, .. }) => assert_eq!(input, "update"),
            other => panic!("unexpected parse outcome: {other:?}"),
        }
    }

    #[test]
    fn two_positionals_are_a_usage_error() {
        assert!(matches!(
            parse(&["worker", "1+1", "6"]),
            Err(WorkerError::Usage(_))
        ));
    }

    #[test]
    fn no_positionals_are_a_usage_error() {
        assert!(matches!(parse(&["worker"]), Err(WorkerError::Usage(_))));
    }

    #[test]
    fn non_numeric_mode_bits_are_a_usage_error() {
        assert!(matches!(
            parse(&["worker", "1+1", "exact", "10"]),
            Err(WorkerError::Usage(_))
        ));
    }

    #[test]
    fn negative_mode_bits_are_a_usage_error() {
        assert!(matches!(
            parse(&["worker", "1+1", "-2", "10"]),
            Err(WorkerError::Usage(_))
        ));
    }

    #[test]
    fn negative_base_parses_through() {
        match parse(&["worker", "1+1", "0", "-16"]) {
            Ok(Invocation::Evaluate { base, .. }) => assert_eq!(base, -16),
            other => panic!("unexpected parse outcome: {other:?}"),
        }
    }

    #[test]
    fn leading_hyphen_expressions_stay_positional() {
        match parse(&["worker", "-1+2", "0", "10"]) {
            Ok(Invocation::Evaluate { input, .. }) => assert_eq!(input, "-1+2"),
            other => panic!("unexpected parse outcome: {other:?}"),
        }
    }
}
