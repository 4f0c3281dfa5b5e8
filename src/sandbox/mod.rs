//! Sandbox assembly: environment pinning and the phase-ordered worker chain
//! that strings the kernel hardening steps together in their one legal order.

pub mod env;
pub mod phases;
