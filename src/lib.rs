//! calcbox: a sandboxed, privilege-dropping expression evaluation worker
//!
//! One process evaluates one batch of untrusted expressions and reports over
//! a framed binary protocol on stdout. Before the first expression is
//! touched the process walks a linear, irreversible hardening chain.
//!
//! # Architecture
//!
//! ## Kernel Hardening ([`kernel`])
//! - [`kernel::credentials`]: setgroups/setresgid/setresuid de-escalation
//! - [`kernel::capabilities`]: bounding, ambient, and capset(2) clearing
//! - [`kernel::seccomp`]: hand-assembled BPF syscall allow-list
//!
//! ## Sandbox Assembly ([`sandbox`])
//! - [`sandbox::env`]: engine user-directory pinning
//! - [`sandbox::phases`]: typestate chain making the hardening order
//!   structural
//!
//! ## Evaluation ([`engine`], [`eval`], [`protocol`])
//! - [`engine`]: the narrow trait the worker drives, plus the injected
//!   clock and the deterministic in-tree fixture implementation
//! - [`eval`]: the batch loop and the one-shot rate refresh
//! - [`protocol`]: frame encoding, one flushed write per frame
//!
//! ## Process Surface ([`cli`], [`config`], [`fatal`])
//! - [`cli`]: argument contract and exit-code mapping
//! - [`config::types`]: fixed policy constants and the error taxonomy
//! - [`fatal`]: the abort channel for security-invariant failures
//!
//! # Design Principles
//!
//! 1. **Order is structural** - hardening steps are typestate transitions,
//!    not a checklist
//! 2. **Security failures abort** - a worker that cannot finish hardening
//!    never reaches input, and never exits cleanly
//! 3. **Time is injected** - one pre-lockdown snapshot answers every clock
//!    query behind the filter
//! 4. **Stdout is protocol** - diagnostics and logging stay on stderr

pub mod cli;
pub mod config;
pub mod engine;
pub mod eval;
pub mod fatal;
pub mod kernel;
pub mod protocol;
pub mod sandbox;

pub use config::types::{EvalMode, Result, WorkerError};
pub use engine::{Engine, EvalProfile};
pub use protocol::FrameSink;
pub use sandbox::phases::Worker;
