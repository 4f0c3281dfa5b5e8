//! Seccomp-BPF syscall allow-list, installed as the terminal hardening step.
//!
//! The filter is assembled by hand (no libseccomp binding) and runs on every
//! syscall:
//!
//! 1. Verify the architecture is x86-64 (kill otherwise, in every variant)
//! 2. Load the syscall number from `seccomp_data`
//! 3. Errno rules: matching syscalls return a fixed errno instead of running
//! 4. Allow rules: matching syscalls proceed
//! 5. Everything else hits the default action
//!
//! The production default action kills the whole process, not just the
//! offending thread. [`FilterAction::Log`] exists for diagnosing a new engine
//! build whose internals touch unexpected syscalls; production installs must
//! never use it.
//!
//! Installation is irreversible. Once the filter is live, the setuid/capset
//! family is gone, which is why lockdown has to come last in the hardening
//! order.

use crate::fatal;

const SECCOMP_SET_MODE_FILTER: u32 = 1;
const SECCOMP_RET_KILL_PROCESS: u32 = 0x8000_0000;
const SECCOMP_RET_LOG: u32 = 0x7ffc_0000;
const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;
const SECCOMP_RET_ERRNO: u32 = 0x0005_0000;
const SECCOMP_RET_DATA: u32 = 0x0000_ffff;

// BPF instruction classes
const BPF_LD: u16 = 0x00;
const BPF_JMP: u16 = 0x05;
const BPF_RET: u16 = 0x06;

// BPF ld/jmp fields
const BPF_W: u16 = 0x00;
const BPF_ABS: u16 = 0x20;
const BPF_JEQ: u16 = 0x10;
const BPF_K: u16 = 0x00;

const AUDIT_ARCH_X86_64: u32 = 0xc000_003e;

// seccomp_data offsets (x86-64)
const OFFSET_SYSCALL_NR: u32 = 0;
const OFFSET_ARCH: u32 = 4;

/// BPF conditional jumps carry u8 offsets; rule counts above this would
/// overflow them.
const MAX_RULES: usize = 200;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SockFilter {
    pub code: u16,
    pub jt: u8,
    pub jf: u8,
    pub k: u32,
}

impl SockFilter {
    #[inline]
    pub const fn stmt(code: u16, k: u32) -> Self {
        Self {
            code,
            jt: 0,
            jf: 0,
            k,
        }
    }

    #[inline]
    pub const fn jump(code: u16, k: u32, jt: u8, jf: u8) -> Self {
        Self { code, jt, jf, k }
    }
}

#[repr(C)]
#[derive(Debug)]
pub struct SockFprog {
    pub len: u16,
    pub filter: *const SockFilter,
}

/// Default action for syscalls not matched by any rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterAction {
    /// Kill the whole process. The only acceptable production default.
    KillProcess,
    /// Audit-log the syscall and let it proceed. Diagnostic runs only.
    Log,
}

impl FilterAction {
    const fn ret_k(self) -> u32 {
        match self {
            FilterAction::KillProcess => SECCOMP_RET_KILL_PROCESS,
            FilterAction::Log => SECCOMP_RET_LOG,
        }
    }
}

/// Syscalls the evaluation path may use after lockdown.
///
/// File descriptors already open keep working (`read`, `write`, `close`), the
/// allocator keeps working (`mmap`, `mprotect`, `munmap`, `brk`, `madvise`),
/// and engine-internal threads keep working (`futex`, `clone`, `clone3`,
/// `set_robust_list`, `rseq`, `sched_yield`, the signal setup pair,
/// `clock_nanosleep`). `clone`/`clone3` additionally cover containerized
/// runtimes that create threads behind the allocator. Both exit forms stay so
/// single-thread and whole-process termination each work.
///
/// Deliberately absent: every wall-clock read (`gettimeofday`,
/// `clock_gettime`, `time`), everything that opens files (`open`, `openat`,
/// `getcwd`), every id/capability syscall, `execve`, and all socket calls.
pub const EVAL_ALLOWLIST: &[i64] = &[
    libc::SYS_read,
    libc::SYS_write,
    libc::SYS_close,
    libc::SYS_mmap,
    libc::SYS_mprotect,
    libc::SYS_munmap,
    libc::SYS_brk,
    libc::SYS_madvise,
    libc::SYS_rt_sigaction,
    libc::SYS_rt_sigprocmask,
    libc::SYS_sched_yield,
    libc::SYS_futex,
    libc::SYS_clone,
    libc::SYS_clone3,
    libc::SYS_clock_nanosleep,
    libc::SYS_exit,
    libc::SYS_exit_group,
    libc::SYS_set_robust_list,
    libc::SYS_rseq,
];

/// Syscalls answered with a fixed errno instead of a verdict.
///
/// `newfstatat` fails with ENOENT: the locked-down process cannot usefully
/// read files, and "not found" is a deterministic soft failure where a kill
/// would take the whole worker down over a stray stat from the runtime.
pub const EVAL_ERRNO_RULES: &[(i64, i32)] = &[(libc::SYS_newfstatat, libc::ENOENT)];

/// Assemble the filter program.
///
/// Layout:
///
/// ```text
/// [0-2]        arch check (x86-64, kill on mismatch)
/// [3]          load syscall number
/// [4..4+E]     errno-rule jumps, one per entry
/// [..+N]       allow-rule jumps, one per entry
/// [..]         RET default action
/// [..]         RET ALLOW
/// [..+E]       RET ERRNO, one per errno rule
/// ```
///
/// # Panics
///
/// Panics if the combined rule count exceeds [`MAX_RULES`].
pub fn build_filter(
    allow: &[i64],
    errno_rules: &[(i64, i32)],
    default_action: FilterAction,
) -> Vec<SockFilter> {
    assert!(
        allow.len() + errno_rules.len() <= MAX_RULES,
        "rule count {} exceeds {} (BPF jump offset overflow)",
        allow.len() + errno_rules.len(),
        MAX_RULES
    );

    let n = allow.len();
    let e = errno_rules.len();
    let mut filter = Vec::with_capacity(6 + n + 2 * e);

    // Arch check. A mismatched architecture means foreign syscall numbering,
    // so this kills even when the default action is Log.
    filter.push(SockFilter::stmt(BPF_LD | BPF_W | BPF_ABS, OFFSET_ARCH));
    filter.push(SockFilter::jump(
        BPF_JMP | BPF_JEQ | BPF_K,
        AUDIT_ARCH_X86_64,
        1,
        0,
    ));
    filter.push(SockFilter::stmt(BPF_RET | BPF_K, SECCOMP_RET_KILL_PROCESS));

    filter.push(SockFilter::stmt(BPF_LD | BPF_W | BPF_ABS, OFFSET_SYSCALL_NR));

    // Errno rules. Each jump targets its own RET ERRNO instruction past the
    // default and allow returns; the offset works out the same for every rule.
    let errno_jump = (e + n + 1) as u8;
    for &(nr, _) in errno_rules {
        filter.push(SockFilter::jump(
            BPF_JMP | BPF_JEQ | BPF_K,
            nr as u32,
            errno_jump,
            0,
        ));
    }

    // Allow rules, all targeting the single RET ALLOW.
    for (i, &nr) in allow.iter().enumerate() {
        filter.push(SockFilter::jump(
            BPF_JMP | BPF_JEQ | BPF_K,
            nr as u32,
            (n - i) as u8,
            0,
        ));
    }

    filter.push(SockFilter::stmt(BPF_RET | BPF_K, default_action.ret_k()));
    filter.push(SockFilter::stmt(BPF_RET | BPF_K, SECCOMP_RET_ALLOW));

    for &(_, errno) in errno_rules {
        filter.push(SockFilter::stmt(
            BPF_RET | BPF_K,
            SECCOMP_RET_ERRNO | (errno as u32 & SECCOMP_RET_DATA),
        ));
    }

    filter
}

/// Install `filter` on the calling thread: `PR_SET_NO_NEW_PRIVS`, then
/// `seccomp(2)` with `SECCOMP_SET_MODE_FILTER`. Either call failing aborts
/// the process; an unfiltered worker must not reach evaluation.
pub fn install(filter: &[SockFilter]) {
    log::info!("installing seccomp filter ({} instructions)", filter.len());

    let prog = SockFprog {
        len: filter.len() as u16,
        filter: filter.as_ptr(),
    };

    // SAFETY: prctl(PR_SET_NO_NEW_PRIVS, 1) is idempotent and required
    // before an unprivileged seccomp(2).
    let rc = unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
    if rc != 0 {
        fatal::die_errno("couldn't set no_new_privs");
    }

    // SAFETY: prog points at a live filter array of the declared length for
    // the duration of the call. The filter is permanent once loaded.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_seccomp,
            SECCOMP_SET_MODE_FILTER,
            0u32,
            &prog as *const SockFprog,
        )
    };
    if rc != 0 {
        fatal::die_errno("couldn't seccomp");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_structure() {
        let allow = &[libc::SYS_read, libc::SYS_write, libc::SYS_exit];
        let errno = &[(libc::SYS_newfstatat, libc::ENOENT)];
        let filter = build_filter(allow, errno, FilterAction::KillProcess);
        // 3 arch + 1 load + 1 errno jump + 3 allow jumps + default + allow + 1 errno ret
        assert_eq!(filter.len(), 11);
    }

    #[test]
    fn default_action_is_last_before_returns() {
        let allow = &[libc::SYS_read];
        let filter = build_filter(allow, &[], FilterAction::KillProcess);
        assert_eq!(filter[filter.len() - 2].k, SECCOMP_RET_KILL_PROCESS);
        assert_eq!(filter[filter.len() - 1].k, SECCOMP_RET_ALLOW);

        let logged = build_filter(allow, &[], FilterAction::Log);
        assert_eq!(logged[logged.len() - 2].k, SECCOMP_RET_LOG);
    }

    #[test]
    fn arch_mismatch_kills_even_in_log_mode() {
        let filter = build_filter(EVAL_ALLOWLIST, EVAL_ERRNO_RULES, FilterAction::Log);
        assert_eq!(filter[2].code, BPF_RET | BPF_K);
        assert_eq!(filter[2].k, SECCOMP_RET_KILL_PROCESS);
    }

    #[test]
    fn errno_rule_lands_on_its_return() {
        let filter = build_filter(EVAL_ALLOWLIST, EVAL_ERRNO_RULES, FilterAction::KillProcess);
        let jump = &filter[4];
        assert_eq!(jump.k, libc::SYS_newfstatat as u32);

        // Resolve the jump by hand and confirm the target encodes ENOENT.
        let target = 4 + 1 + jump.jt as usize;
        assert_eq!(filter[target].code, BPF_RET | BPF_K);
        assert_eq!(
            filter[target].k,
            SECCOMP_RET_ERRNO | libc::ENOENT as u32
        );
    }

    #[test]
    fn allow_rules_land_on_allow() {
        let filter = build_filter(EVAL_ALLOWLIST, EVAL_ERRNO_RULES, FilterAction::KillProcess);
        let first_allow_jump = 4 + EVAL_ERRNO_RULES.len();
        for (i, &nr) in EVAL_ALLOWLIST.iter().enumerate() {
            let jump = &filter[first_allow_jump + i];
            assert_eq!(jump.k, nr as u32);
            let target = first_allow_jump + i + 1 + jump.jt as usize;
            assert_eq!(filter[target].k, SECCOMP_RET_ALLOW);
        }
    }

    #[test]
    fn allowlist_keeps_evaluation_alive() {
        for nr in [
            libc::SYS_read,
            libc::SYS_write,
            libc::SYS_futex,
            libc::SYS_clone,
            libc::SYS_clone3,
            libc::SYS_exit,
            libc::SYS_exit_group,
            libc::SYS_clock_nanosleep,
        ] {
            assert!(EVAL_ALLOWLIST.contains(&nr), "missing syscall {nr}");
        }
    }

    #[test]
    fn allowlist_denies_clock_files_ids_and_exec() {
        for nr in [
            libc::SYS_gettimeofday,
            libc::SYS_clock_gettime,
            libc::SYS_time,
            libc::SYS_open,
            libc::SYS_openat,
            libc::SYS_getcwd,
            libc::SYS_setresuid,
            libc::SYS_setresgid,
            libc::SYS_capset,
            libc::SYS_execve,
            libc::SYS_socket,
        ] {
            assert!(!EVAL_ALLOWLIST.contains(&nr), "unexpected syscall {nr}");
        }
    }

    #[test]
    fn stat_family_soft_fails_rather_than_killing() {
        assert!(EVAL_ERRNO_RULES
            .iter()
            .any(|&(nr, errno)| nr == libc::SYS_newfstatat && errno == libc::ENOENT));
        assert!(!EVAL_ALLOWLIST.contains(&libc::SYS_newfstatat));
    }

    #[test]
    #[should_panic(expected = "rule count")]
    fn oversized_rule_set_panics() {
        let huge: Vec<i64> = (0..300).collect();
        build_filter(&huge, &[], FilterAction::KillProcess);
    }
}
