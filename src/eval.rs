//! The evaluation loop: a batch of expressions in, frames out.

use std::io::Write;

use crate::config::types::{
    EvalMode, Result, WorkerError, CALC_BUDGET, FETCH_BUDGET, PRINT_BUDGET,
};
use crate::engine::{CalcOutcome, Engine, EvalProfile};
use crate::protocol::FrameSink;

/// Evaluate a newline-delimited batch and frame the outcome into `sink`.
///
/// Lines run in order and engine state carries between them, so earlier
/// lines exist for side effects and diagnostics; the last line's value
/// becomes the single result frame. Diagnostics flush per line: a timeout on
/// line k leaves lines 1..k's messages already on the wire and no result
/// frame behind them.
pub fn evaluate_batch<E: Engine, W: Write>(
    engine: &mut E,
    sink: &mut FrameSink<W>,
    input: &str,
    mode: EvalMode,
    base: i32,
) -> Result<()> {
    let profile = EvalProfile::new(mode, base);
    engine.configure(&profile);

    let mut lines: Vec<&str> = input.lines().collect();
    if lines.is_empty() {
        // an empty argument still evaluates one empty line
        lines.push("");
    }

    let mut value = None;
    for (idx, line) in lines.iter().enumerate() {
        let number = idx + 1;
        match engine.calculate(line, CALC_BUDGET) {
            CalcOutcome::Complete(v) => value = Some(v),
            CalcOutcome::TimedOut => {
                log::warn!("line {number}: evaluation exceeded its budget");
                return Err(WorkerError::Timeout);
            }
        }
        for diagnostic in engine.drain_messages() {
            sink.message(diagnostic.severity, number, &diagnostic.text)?;
        }
    }

    let value = value.ok_or_else(|| WorkerError::Engine("batch produced no value".into()))?;
    let formatted = engine.format(&value, PRINT_BUDGET);
    if formatted.text.ends_with(engine.timed_out_marker()) {
        log::warn!("formatting exceeded its budget");
        return Err(WorkerError::Timeout);
    }

    sink.result(&formatted.text, formatted.approximate)
}

/// One-shot exchange-rate refresh, for `worker update`.
///
/// Only a missing fetch path is an error. The refresh call's own verdict is
/// advisory; rate files may or may not have changed and the caller retries
/// on its own schedule either way.
pub fn update_rates<E: Engine>(engine: &mut E) -> Result<()> {
    if !engine.can_fetch() {
        log::error!("exchange-rate fetching is not possible in this build");
        return Err(WorkerError::CantFetch);
    }
    if !engine.fetch_rates(FETCH_BUDGET) {
        log::warn!("exchange-rate refresh reported failure");
    }
    Ok(())
}
