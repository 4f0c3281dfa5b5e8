//! Thin wrappers around Linux kernel primitives.
//!
//! All `unsafe` code is concentrated here with explicit SAFETY comments.
//! Hardening order: credentials -> capabilities -> seccomp. Every step is
//! irreversible; failures abort through [`crate::fatal`], never propagate.

pub mod capabilities;
pub mod credentials;
pub mod seccomp;
