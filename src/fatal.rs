//! Terminal failure channel for security-invariant violations.
//!
//! A worker that failed to drop privileges, clear capabilities, or install its
//! syscall filter must never continue to untrusted input. These helpers end
//! the process with SIGABRT, outside the exit-code taxonomy and past any
//! unwinding or `Drop` cleanup, so no caller can catch the failure and
//! proceed half-hardened.

/// Write one line to stderr and abort the process.
///
/// Output goes through raw `libc::write`, never stdio: stdout carries protocol
/// frames and must not receive stray bytes, and this path has to stay usable
/// mid-hardening when little else is guaranteed to work.
pub fn die(msg: &str) -> ! {
    // SAFETY: write(2) to fd 2 with a live buffer; abort() never returns.
    unsafe {
        let _ = libc::write(2, msg.as_ptr() as *const libc::c_void, msg.len());
        let _ = libc::write(2, b"\n".as_ptr() as *const libc::c_void, 1);
        libc::abort()
    }
}

/// Like [`die`], appending the current OS error, in the shape of `perror`.
pub fn die_errno(context: &str) -> ! {
    let err = std::io::Error::last_os_error();
    let line = format!("{context}: {err}\n");
    // SAFETY: write(2) to fd 2 with a live buffer; abort() never returns.
    unsafe {
        let _ = libc::write(2, line.as_ptr() as *const libc::c_void, line.len());
        libc::abort()
    }
}
