//! Full-chain programs that must build and run cleanly. They install the
//! real syscall filter, so each one lives in its own binary where the kill
//! policy cannot take the test harness down with it.
//!
//! The inverse direction, phase-order violations that must not compile, is
//! covered by the `compile_fail` doctests on `sandbox::phases`.

#[test]
fn typestate_chains_build_and_run() {
    let t = trybuild::TestCases::new();

    t.pass("tests/typestate_ok/full_chain.rs");
    t.pass("tests/typestate_ok/update_branch.rs");
}
