// The refresh branch stops at privilege drop: no environment pinning, no
// filter, no frames. A fetch-capable engine must let update_rates succeed.

use calcbox::config::types::SANDBOX_IDENTITY;
use calcbox::engine::clock::{SnapshotClock, TimeSnapshot};
use calcbox::engine::fixture::FixtureEngine;
use calcbox::sandbox::phases::Worker;

fn main() {
    let mut engine = FixtureEngine::new(Box::new(SnapshotClock::new(TimeSnapshot::capture())));
    engine.set_fetch_possible(true);

    Worker::new(engine)
        .deescalate(SANDBOX_IDENTITY)
        .update_rates()
        .unwrap();
}
