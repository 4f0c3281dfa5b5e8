//! Phase-ordered worker chain.
//!
//! Hardening is linear and irreversible: de-escalate, pin the environment,
//! load definitions, defang, lock down, evaluate. Each phase is a zero-sized
//! type parameter and every transition consumes the worker, so skipping,
//! repeating, or reordering a step is a compile error, not a runtime finding.
//!
//! Skipping de-escalation does not compile:
//!
//! ```compile_fail,E0599
//! use calcbox::engine::clock::{SnapshotClock, TimeSnapshot};
//! use calcbox::engine::fixture::FixtureEngine;
//! use calcbox::sandbox::phases::Worker;
//!
//! let snap = TimeSnapshot { year: 2024, month: 1, day: 1, epoch_secs: 0, micros: 0 };
//! let engine = FixtureEngine::new(Box::new(SnapshotClock::new(snap)));
//! Worker::new(engine).pin_environment();
//! ```
//!
//! Neither does locking down before the builtins are defanged:
//!
//! ```compile_fail,E0599
//! use calcbox::config::types::SANDBOX_IDENTITY;
//! use calcbox::engine::clock::{SnapshotClock, TimeSnapshot};
//! use calcbox::engine::fixture::FixtureEngine;
//! use calcbox::sandbox::phases::Worker;
//!
//! let snap = TimeSnapshot { year: 2024, month: 1, day: 1, epoch_secs: 0, micros: 0 };
//! let engine = FixtureEngine::new(Box::new(SnapshotClock::new(snap)));
//! Worker::new(engine)
//!     .deescalate(SANDBOX_IDENTITY)
//!     .pin_environment()
//!     .load_definitions()
//!     .unwrap()
//!     .lockdown();
//! ```
//!
//! Nor evaluating before the filter is installed:
//!
//! ```compile_fail,E0599
//! use calcbox::config::types::{DEFANG_BLOCKLIST, EvalMode, SANDBOX_IDENTITY};
//! use calcbox::engine::clock::{SnapshotClock, TimeSnapshot};
//! use calcbox::engine::fixture::FixtureEngine;
//! use calcbox::protocol::FrameSink;
//! use calcbox::sandbox::phases::Worker;
//!
//! let snap = TimeSnapshot { year: 2024, month: 1, day: 1, epoch_secs: 0, micros: 0 };
//! let engine = FixtureEngine::new(Box::new(SnapshotClock::new(snap)));
//! let mut buf = Vec::new();
//! let mut sink = FrameSink::new(&mut buf);
//! Worker::new(engine)
//!     .deescalate(SANDBOX_IDENTITY)
//!     .pin_environment()
//!     .load_definitions()
//!     .unwrap()
//!     .defang(DEFANG_BLOCKLIST)
//!     .evaluate(&mut sink, "1+1", EvalMode::from_bits(0), 10);
//! ```
//!
//! Nor reusing a consumed worker:
//!
//! ```compile_fail,E0382
//! use calcbox::config::types::SANDBOX_IDENTITY;
//! use calcbox::engine::clock::{SnapshotClock, TimeSnapshot};
//! use calcbox::engine::fixture::FixtureEngine;
//! use calcbox::sandbox::phases::Worker;
//!
//! let snap = TimeSnapshot { year: 2024, month: 1, day: 1, epoch_secs: 0, micros: 0 };
//! let engine = FixtureEngine::new(Box::new(SnapshotClock::new(snap)));
//! let worker = Worker::new(engine);
//! let _first = worker.deescalate(SANDBOX_IDENTITY);
//! let _second = worker.deescalate(SANDBOX_IDENTITY);
//! ```

use std::io::Write;
use std::marker::PhantomData;

use crate::config::types::{BlocklistEntry, EvalMode, IdentityTarget, Result};
use crate::engine::Engine;
use crate::eval;
use crate::kernel::{capabilities, credentials, seccomp};
use crate::protocol::FrameSink;
use crate::sandbox::env;

/// Engine constructed, nothing hardened yet.
pub struct Spawned;
/// Ids and capabilities dropped.
pub struct Deescalated;
/// Engine user directory pinned.
pub struct EnvPinned;
/// Definitions and cached rates loaded.
pub struct Loaded;
/// Dangerous builtins removed.
pub struct Defanged;
/// Syscall filter installed. Terminal phase.
pub struct Locked;

/// The worker process state machine. Owns the engine for the process
/// lifetime; the phase parameter records how far hardening has progressed.
pub struct Worker<E: Engine, P> {
    engine: E,
    _phase: PhantomData<P>,
}

impl<E: Engine, P> Worker<E, P> {
    fn advance<N>(self) -> Worker<E, N> {
        Worker {
            engine: self.engine,
            _phase: PhantomData,
        }
    }
}

impl<E: Engine> Worker<E, Spawned> {
    /// Wrap a freshly constructed engine. The engine must already hold its
    /// time snapshot; nothing downstream can capture one.
    pub fn new(engine: E) -> Self {
        Worker {
            engine,
            _phase: PhantomData,
        }
    }

    /// Drop ids and capabilities. Runs first so everything after executes
    /// unprivileged; failures abort through [`crate::fatal`].
    pub fn deescalate(self, target: IdentityTarget) -> Worker<E, Deescalated> {
        credentials::drop_to(target);
        capabilities::drop_all();
        self.advance()
    }
}

impl<E: Engine> Worker<E, Deescalated> {
    /// One-shot exchange-rate refresh, the `worker update` branch. Needs the
    /// network, so the syscall filter is never installed on this path; the
    /// identity drop already happened.
    pub fn update_rates(mut self) -> Result<()> {
        eval::update_rates(&mut self.engine)
    }

    pub fn pin_environment(self) -> Worker<E, EnvPinned> {
        env::pin_user_dir();
        self.advance()
    }
}

impl<E: Engine> Worker<E, EnvPinned> {
    /// Load global definitions and cached exchange rates, before defanging
    /// so the blocklist acts on a populated namespace.
    pub fn load_definitions(mut self) -> Result<Worker<E, Loaded>> {
        self.engine.load_definitions()?;
        Ok(self.advance())
    }
}

impl<E: Engine> Worker<E, Loaded> {
    /// Remove every blocklisted builtin from the engine namespace. Names
    /// this engine build never had are no-ops.
    pub fn defang(mut self, blocklist: &[BlocklistEntry]) -> Worker<E, Defanged> {
        for entry in blocklist {
            self.engine.defang(entry.name);
            log::debug!("defanged {} ({})", entry.name, entry.risk);
        }
        self.advance()
    }
}

impl<E: Engine> Worker<E, Defanged> {
    /// Install the syscall filter. The final privilege-reducing step; the
    /// filter itself removes the syscalls every earlier step needed.
    pub fn lockdown(self) -> Worker<E, Locked> {
        let filter = seccomp::build_filter(
            seccomp::EVAL_ALLOWLIST,
            seccomp::EVAL_ERRNO_RULES,
            seccomp::FilterAction::KillProcess,
        );
        seccomp::install(&filter);
        self.advance()
    }
}

impl<E: Engine> Worker<E, Locked> {
    /// Evaluate the batch and frame the outcome into `sink`. Consumes the
    /// worker; one process evaluates one batch.
    pub fn evaluate<W: Write>(
        mut self,
        sink: &mut FrameSink<W>,
        input: &str,
        mode: EvalMode,
        base: i32,
    ) -> Result<()> {
        eval::evaluate_batch(&mut self.engine, sink, input, mode, base)
    }
}

#[cfg(test)]
mod typestate_tests {
    use super::*;
    use crate::config::types::{WorkerError, DEFANG_BLOCKLIST, SANDBOX_IDENTITY};
    use crate::engine::clock::{SnapshotClock, TimeSnapshot};
    use crate::engine::fixture::FixtureEngine;

    fn engine() -> FixtureEngine {
        let snap = TimeSnapshot {
            year: 2024,
            month: 5,
            day: 17,
            epoch_secs: 1_715_900_000,
            micros: 0,
        };
        FixtureEngine::new(Box::new(SnapshotClock::new(snap)))
    }

    #[test]
    fn chain_reaches_defanged_without_lockdown() {
        // de-escalation is a logged no-op without root; lockdown would cage
        // the test harness itself, so the chain stops one phase short here.
        let worker = Worker::new(engine())
            .deescalate(SANDBOX_IDENTITY)
            .pin_environment()
            .load_definitions()
            .expect("fixture definitions load")
            .defang(DEFANG_BLOCKLIST);
        let _ = worker;
    }

    #[test]
    fn update_branch_runs_from_deescalated() {
        let mut engine = engine();
        engine.set_fetch_possible(true);
        let outcome = Worker::new(engine)
            .deescalate(SANDBOX_IDENTITY)
            .update_rates();
        assert!(outcome.is_ok());
    }

    #[test]
    fn update_branch_reports_a_missing_fetch_path() {
        let outcome = Worker::new(engine())
            .deescalate(SANDBOX_IDENTITY)
            .update_rates();
        assert!(matches!(outcome, Err(WorkerError::CantFetch)));
    }
}
