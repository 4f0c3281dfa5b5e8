//! Fixed policy and shared types.
//!
//! Everything here is decided at build time; nothing is read from files or
//! from untrusted input.

pub mod types;
