//! Shared type definitions and build-time policy constants.

use std::time::Duration;
use thiserror::Error;

/// Unprivileged identity the worker must hold before touching input.
///
/// Fixed at build time, never derived from the argument vector. The default
/// is nobody/nogroup on common distributions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentityTarget {
    pub uid: u32,
    pub gid: u32,
}

pub const SANDBOX_IDENTITY: IdentityTarget = IdentityTarget {
    uid: 65534,
    gid: 65534,
};

/// One engine builtin that must be inert before any expression is evaluated.
#[derive(Clone, Copy, Debug)]
pub struct BlocklistEntry {
    pub name: &'static str,
    /// The attack surface this entry closes, for the hardening log.
    pub risk: &'static str,
}

/// Builtins removed from the engine namespace ahead of evaluation.
///
/// Engine builds may or may not ship a given builtin; removal tolerates
/// absent entries.
pub const DEFANG_BLOCKLIST: &[BlocklistEntry] = &[
    BlocklistEntry {
        name: "command",
        risk: "arbitrary command execution",
    },
    BlocklistEntry {
        name: "plot",
        risk: "subprocess plotting, possible command execution",
    },
    BlocklistEntry {
        name: "uptime",
        risk: "system information leakage",
    },
    BlocklistEntry {
        name: "export",
        risk: "local file write",
    },
    BlocklistEntry {
        name: "load",
        risk: "local file inclusion",
    },
];

/// Working precision in decimal digits for ordinary evaluation.
pub const PRECISION_DEFAULT: u32 = 20;

/// Working precision when the high-precision mode bit is set.
pub const PRECISION_HIGH: u32 = 1024;

/// Engine-internal budget for one calculate call.
pub const CALC_BUDGET: Duration = Duration::from_millis(2000);

/// Engine-internal budget for the final format call.
pub const PRINT_BUDGET: Duration = Duration::from_millis(2000);

/// Budget for the one-shot exchange-rate refresh.
pub const FETCH_BUDGET: Duration = Duration::from_secs(30);

/// Exit code for a malformed argument vector. No frames are written.
pub const EXIT_USAGE: i32 = 101;

/// Exit code when calculate or format exhausted its budget.
pub const EXIT_TIMEOUT: i32 = 102;

/// Exit code when a refresh was requested but fetching is impossible.
pub const EXIT_CANT_FETCH: i32 = 103;

/// Evaluation mode bitmask as received on the command line.
///
/// Unknown bits are carried but ignored. Exactness dominates high precision
/// when both are set; see [`crate::engine::EvalProfile`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvalMode {
    bits: u32,
}

impl EvalMode {
    /// bit 0: raise working precision to [`PRECISION_HIGH`].
    pub const PRECISION: u32 = 1 << 0;
    /// bit 1: force exact arithmetic and exact-fraction formatting.
    pub const EXACT: u32 = 1 << 1;
    /// bit 2: strip terminal styling from the formatted result.
    pub const NO_COLOR: u32 = 1 << 2;

    pub const fn from_bits(bits: u32) -> Self {
        Self { bits }
    }

    pub const fn bits(self) -> u32 {
        self.bits
    }

    pub const fn high_precision(self) -> bool {
        self.bits & Self::PRECISION != 0
    }

    pub const fn exact(self) -> bool {
        self.bits & Self::EXACT != 0
    }

    pub const fn no_color(self) -> bool {
        self.bits & Self::NO_COLOR != 0
    }
}

/// Recoverable worker failures, mapped to stable exit codes at the outermost
/// scope. Security-invariant failures never appear here; they go through
/// [`crate::fatal`] and abort.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("usage error: {0}")]
    Usage(String),

    #[error("evaluation timed out")]
    Timeout,

    #[error("exchange rates cannot be fetched")]
    CantFetch,

    #[error("engine error: {0}")]
    Engine(String),
}

/// Exit-code mapping for the error taxonomy. IO and engine failures fall
/// through to the generic failure code.
impl From<&WorkerError> for i32 {
    fn from(err: &WorkerError) -> i32 {
        match err {
            WorkerError::Usage(_) => EXIT_USAGE,
            WorkerError::Timeout => EXIT_TIMEOUT,
            WorkerError::CantFetch => EXIT_CANT_FETCH,
            WorkerError::Io(_) | WorkerError::Engine(_) => 1,
        }
    }
}

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;
