//! Injected time source for the sandboxed engine.
//!
//! The syscall filter denies every wall-clock read, so "what time is it" must
//! be answered from a snapshot taken while those syscalls still work. The
//! engine receives a [`Clock`] at construction; production hands it a
//! [`SnapshotClock`] captured immediately before lockdown, tests hand it
//! whatever date they need.

/// Read-only time queries an engine may make during evaluation.
pub trait Clock {
    /// Calendar date in local time as (year, month 1-12, day 1-31).
    fn today(&self) -> (i32, u32, u32);

    /// Seconds and microseconds since the Unix epoch.
    fn now(&self) -> (i64, i64);
}

/// One pre-lockdown reading of the real clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeSnapshot {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub epoch_secs: i64,
    pub micros: i64,
}

impl TimeSnapshot {
    /// Capture the current time with `gettimeofday` and `localtime_r`.
    ///
    /// Must run before the syscall filter is installed; afterwards both
    /// calls are kill-on-sight.
    pub fn capture() -> Self {
        let mut tv = libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        // SAFETY: tv is a valid out-pointer and a null timezone argument is
        // defined behavior.
        unsafe { libc::gettimeofday(&mut tv, std::ptr::null_mut()) };

        // SAFETY: zeroed tm is a valid out-buffer for localtime_r, the
        // reentrant variant that touches no shared state.
        let mut tm: libc::tm = unsafe { std::mem::zeroed() };
        unsafe { libc::localtime_r(&tv.tv_sec, &mut tm) };

        Self {
            year: tm.tm_year + 1900,
            month: (tm.tm_mon + 1) as u32,
            day: tm.tm_mday as u32,
            epoch_secs: tv.tv_sec as i64,
            micros: tv.tv_usec as i64,
        }
    }
}

/// A [`Clock`] frozen at one [`TimeSnapshot`]. Every query for the process
/// lifetime answers from the copy; nothing touches the kernel.
#[derive(Clone, Copy, Debug)]
pub struct SnapshotClock {
    snapshot: TimeSnapshot,
}

impl SnapshotClock {
    pub fn new(snapshot: TimeSnapshot) -> Self {
        Self { snapshot }
    }
}

impl Clock for SnapshotClock {
    fn today(&self) -> (i32, u32, u32) {
        (self.snapshot.year, self.snapshot.month, self.snapshot.day)
    }

    fn now(&self) -> (i64, i64) {
        (self.snapshot.epoch_secs, self.snapshot.micros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_yields_a_plausible_date() {
        let snap = TimeSnapshot::capture();
        assert!(snap.year >= 2024);
        assert!((1..=12).contains(&snap.month));
        assert!((1..=31).contains(&snap.day));
        assert!(snap.epoch_secs > 0);
        assert!((0..1_000_000).contains(&snap.micros));
    }

    #[test]
    fn snapshot_clock_answers_from_the_copy() {
        let snap = TimeSnapshot {
            year: 2024,
            month: 5,
            day: 17,
            epoch_secs: 1_715_900_000,
            micros: 250_000,
        };
        let clock = SnapshotClock::new(snap);
        assert_eq!(clock.today(), (2024, 5, 17));
        assert_eq!(clock.now(), (1_715_900_000, 250_000));
    }
}
