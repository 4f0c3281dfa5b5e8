//! Capability clearing after the uid/gid drop.
//!
//! Changing ids does not clear capability bits by itself. CAP_SETGID in
//! particular must go explicitly, or the process could regain group
//! privilege after `setresgid`.

use crate::fatal;

/// Capability number for CAP_SETGID, the bit that made the gid drop possible.
pub const CAP_SETGID: u32 = 6;

/// Highest capability number probed when clearing the bounding set.
const MAX_CAP: u32 = 40;

const PR_CAPBSET_DROP: libc::c_int = 24;
const PR_CAP_AMBIENT: libc::c_int = 47;
const PR_CAP_AMBIENT_CLEAR_ALL: libc::c_int = 4;
const LINUX_CAPABILITY_VERSION_3: u32 = 0x20080522;

#[repr(C)]
struct CapUserHeader {
    version: u32,
    pid: i32,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct CapUserData {
    effective: u32,
    permitted: u32,
    inheritable: u32,
}

/// Clear every capability set, ending with a single `capset(2)` that applies
/// an all-zero payload with CAP_SETGID masked from the effective and
/// permitted words. The bounding and ambient clears are best-effort (they
/// need privileges that are usually already gone at this point); the final
/// `capset` is mandatory and aborts on failure.
pub fn drop_all() {
    drop_bounding_set();
    clear_ambient_set();
    apply_zeroed_sets();
}

fn drop_bounding_set() {
    for cap in 0..=MAX_CAP {
        // SAFETY: prctl(PR_CAPBSET_DROP) with any cap number is safe; the
        // kernel rejects unknown numbers with EINVAL.
        let _ = unsafe { libc::prctl(PR_CAPBSET_DROP, cap, 0, 0, 0) };
    }
}

fn clear_ambient_set() {
    // SAFETY: prctl(PR_CAP_AMBIENT, PR_CAP_AMBIENT_CLEAR_ALL) is safe; it
    // fails only on kernels without ambient capability support.
    let rc = unsafe { libc::prctl(PR_CAP_AMBIENT, PR_CAP_AMBIENT_CLEAR_ALL, 0, 0, 0) };
    if rc != 0 {
        log::warn!("couldn't clear ambient capabilities (kernel may predate them)");
    }
}

fn apply_zeroed_sets() {
    let header = CapUserHeader {
        version: LINUX_CAPABILITY_VERSION_3,
        pid: 0,
    };

    // Version 3 carries two data entries: caps 0-31 and caps 32-63.
    let mut data = [CapUserData {
        effective: 0,
        permitted: 0,
        inheritable: 0,
    }; 2];

    // The sets are zeroed wholesale; the id-changing bit is masked out on top
    // because that one bit is the reason this call exists.
    data[0].effective &= !(1 << CAP_SETGID);
    data[0].permitted &= !(1 << CAP_SETGID);

    // SAFETY: capset(2) with a valid version-3 header (pid 0 = current
    // process) and two initialized data entries. Lowering one's own
    // capabilities requires no privilege.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_capset,
            &header as *const CapUserHeader,
            data.as_ptr(),
        )
    };
    if rc != 0 {
        fatal::die_errno("couldn't drop caps");
    }

    log::info!("capability sets cleared");
}
