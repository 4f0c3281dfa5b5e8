// Runs the whole hardening chain against the in-tree engine, syscall filter
// included, and checks the frames that come out. Lives in its own binary
// because the kill policy would take a shared harness down with it. Exits
// through process::exit: after lockdown the runtime's normal exit cleanup
// issues syscalls the filter kills.

use calcbox::config::types::{EvalMode, DEFANG_BLOCKLIST, SANDBOX_IDENTITY};
use calcbox::engine::clock::{SnapshotClock, TimeSnapshot};
use calcbox::engine::fixture::FixtureEngine;
use calcbox::protocol::{FrameSink, RESULT_EXACT, SEPARATOR, TAG_RESULT};
use calcbox::sandbox::phases::Worker;

fn main() {
    let engine = FixtureEngine::new(Box::new(SnapshotClock::new(TimeSnapshot::capture())));

    let mut buf = Vec::new();
    let mut sink = FrameSink::new(&mut buf);

    Worker::new(engine)
        .deescalate(SANDBOX_IDENTITY)
        .pin_environment()
        .load_definitions()
        .unwrap()
        .defang(DEFANG_BLOCKLIST)
        .lockdown()
        .evaluate(&mut sink, "2^6 - 22", EvalMode::from_bits(4), 10)
        .unwrap();

    drop(sink);
    assert_eq!(buf, [TAG_RESULT, RESULT_EXACT, b'4', b'2', SEPARATOR]);
    std::process::exit(0);
}
