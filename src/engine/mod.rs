//! The calculation engine behind a narrow trait.
//!
//! Everything the worker knows about expression evaluation goes through
//! [`Engine`]: load definitions, remove dangerous builtins, evaluate, drain
//! messages, format. Real implementations wrap an external CAS library; the
//! in-tree [`fixture`] implementation is deterministic and self-contained so
//! the binary runs end-to-end without one.
//!
//! Budgets are plain [`Duration`]s enforced inside the engine. The worker
//! never spawns watcher threads; a call that comes back is the only signal it
//! gets.

pub mod clock;
pub mod fixture;

use std::time::Duration;

use crate::config::types::{EvalMode, Result, PRECISION_DEFAULT, PRECISION_HIGH};

/// Severity of an engine-emitted message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
    /// The engine reported a category this build does not know.
    Unknown,
}

/// One engine message, without line attribution. The evaluation loop knows
/// which input line was running and adds it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub text: String,
}

/// What came back from a calculate call.
#[derive(Debug)]
pub enum CalcOutcome<V> {
    Complete(V),
    /// The engine gave up inside its budget window. The batch is dead.
    TimedOut,
}

/// Formatted result text plus the engine's exactness verdict.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Formatted {
    pub text: String,
    pub approximate: bool,
}

/// Engine configuration derived from the mode bits and the output base.
///
/// The base is carried unvalidated; engines enforce their own range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvalProfile {
    /// Working precision in decimal digits.
    pub precision: u32,
    /// Force exact arithmetic and exact-fraction formatting.
    pub exact: bool,
    /// Mark non-terminating expansions instead of silently truncating.
    pub indicate_infinite_series: bool,
    /// Terminal styling in formatted output.
    pub color: bool,
    /// Output base for formatting.
    pub base: i32,
}

impl EvalProfile {
    /// Derive a profile from the command-line mode bits.
    ///
    /// The exact bit wins over the high-precision bit when both are set:
    /// exact arithmetic runs at default precision with series indication on.
    pub fn new(mode: EvalMode, base: i32) -> Self {
        let (precision, exact, indicate_infinite_series) = if mode.exact() {
            (PRECISION_DEFAULT, true, true)
        } else if mode.high_precision() {
            (PRECISION_HIGH, false, false)
        } else {
            (PRECISION_DEFAULT, false, true)
        };

        Self {
            precision,
            exact,
            indicate_infinite_series,
            color: !mode.no_color(),
            base,
        }
    }
}

/// The evaluation dependency, reduced to what the pipeline actually calls.
///
/// Implementations own all evaluation state: variable bindings accumulated
/// across a batch, the message queue, and budget enforcement. The worker
/// holds exactly one engine for its lifetime and drives it from one thread.
pub trait Engine {
    /// Result value carried from [`calculate`](Engine::calculate) to
    /// [`format`](Engine::format).
    type Value;

    /// Load global definitions and cached exchange-rate data. Staleness
    /// warnings for old rates are suppressed; diagnostics must depend only
    /// on the input batch.
    fn load_definitions(&mut self) -> Result<()>;

    /// Remove `name` from the active namespace. Names the build never had
    /// are a no-op.
    fn defang(&mut self, name: &str);

    /// Apply `profile` to evaluation and formatting for the rest of the
    /// session.
    fn configure(&mut self, profile: &EvalProfile);

    /// Evaluate one expression, giving up once `budget` is spent.
    fn calculate(&mut self, expr: &str, budget: Duration) -> CalcOutcome<Self::Value>;

    /// Messages accumulated since the previous drain, in emission order.
    fn drain_messages(&mut self) -> Vec<Diagnostic>;

    /// Format `value`. A run cut short by `budget` returns text ending in
    /// [`timed_out_marker`](Engine::timed_out_marker).
    fn format(&mut self, value: &Self::Value, budget: Duration) -> Formatted;

    /// Suffix that marks a formatting run cut short by its budget.
    fn timed_out_marker(&self) -> &str;

    /// Whether external exchange-rate fetching is possible at all in this
    /// build and environment.
    fn can_fetch(&self) -> bool;

    /// Refresh exchange rates from the network. The returned flag is the
    /// engine's own claim of success and is treated as advisory.
    fn fetch_rates(&mut self, budget: Duration) -> bool;
}
