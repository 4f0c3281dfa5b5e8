//! UID/GID de-escalation to the fixed sandbox identity.
//!
//! CRITICAL: setresgid MUST run BEFORE setresuid. Once the user id is gone
//! there is no privilege left to change groups with, and a stale saved gid
//! would survive.

use crate::config::types::IdentityTarget;
use crate::fatal;

/// Drop to `target`: clear supplementary groups, then setresgid, then
/// setresuid, then verify. Skips with a debug log when the process was not
/// started as root (unprivileged development runs have nothing to drop).
/// When running as root every step is mandatory and any failure aborts.
pub fn drop_to(target: IdentityTarget) {
    if target.uid == 0 || target.gid == 0 {
        fatal::die("refusing to de-escalate to uid/gid 0");
    }

    if !nix::unistd::geteuid().is_root() {
        log::debug!(
            "not root; skipping uid/gid drop to {}:{}",
            target.uid,
            target.gid
        );
        return;
    }

    clear_supplementary_groups();
    // CRITICAL: GID before UID
    set_gid(target.gid);
    set_uid(target.uid);
    verify(target);

    log::info!("dropped to uid={} gid={}", target.uid, target.gid);
}

fn clear_supplementary_groups() {
    if let Err(err) = nix::unistd::setgroups(&[]) {
        fatal::die(&format!("couldn't remove groups: {err}"));
    }
}

/// MUST be called before `set_uid`.
fn set_gid(gid: u32) {
    // SAFETY: setresgid atomically sets real, effective, and saved GIDs.
    let rc = unsafe {
        libc::setresgid(
            gid as libc::gid_t,
            gid as libc::gid_t,
            gid as libc::gid_t,
        )
    };
    if rc != 0 {
        fatal::die_errno("couldn't set gid");
    }
}

/// MUST be called after `set_gid`.
fn set_uid(uid: u32) {
    // SAFETY: setresuid atomically sets real, effective, and saved UIDs.
    let rc = unsafe {
        libc::setresuid(
            uid as libc::uid_t,
            uid as libc::uid_t,
            uid as libc::uid_t,
        )
    };
    if rc != 0 {
        fatal::die_errno("couldn't set uid");
    }
}

/// Confirms the kernel reports the de-escalated identity. A mismatch means a
/// partially-dropped process and is fatal.
fn verify(target: IdentityTarget) {
    use nix::unistd::{getegid, geteuid, getgid, getuid};

    let real_uid = getuid().as_raw();
    let effective_uid = geteuid().as_raw();
    if real_uid != target.uid || effective_uid != target.uid {
        fatal::die(&format!(
            "uid verification failed: expected {}, got real={} effective={}",
            target.uid, real_uid, effective_uid
        ));
    }

    let real_gid = getgid().as_raw();
    let effective_gid = getegid().as_raw();
    if real_gid != target.gid || effective_gid != target.gid {
        fatal::die(&format!(
            "gid verification failed: expected {}, got real={} effective={}",
            target.gid, real_gid, effective_gid
        ));
    }
}
