use std::fs::File;

use crate::error::{Result, TransportError};

/// Take exclusive ownership of the process stdout for protocol output.
///
/// Returns a handle to the original stdout and re-points file descriptor 1 at
/// stderr, so anything a linked library prints ends up in the diagnostic
/// stream instead of corrupting framing. Must run before any collaborator is
/// constructed and before anything is written through `std::io::stdout()`.
#[cfg(unix)]
pub fn reserve_stdout() -> Result<File> {
    use std::os::fd::FromRawFd;

    // SAFETY: fcntl(F_DUPFD_CLOEXEC) only duplicates a descriptor this process
    // owns; on success the returned fd is new and owned by nobody else.
    let protocol_fd = unsafe { libc::fcntl(libc::STDOUT_FILENO, libc::F_DUPFD_CLOEXEC, 0) };
    if protocol_fd < 0 {
        return Err(TransportError::Redirect(std::io::Error::last_os_error()));
    }

    // SAFETY: both descriptors are standard streams of this process; dup2
    // atomically replaces fd 1 and does not touch `protocol_fd`.
    let rc = unsafe { libc::dup2(libc::STDERR_FILENO, libc::STDOUT_FILENO) };
    if rc < 0 {
        let err = std::io::Error::last_os_error();
        // SAFETY: `protocol_fd` was created above and has not been shared.
        unsafe { libc::close(protocol_fd) };
        return Err(TransportError::Redirect(err));
    }

    tracing::debug!(fd = protocol_fd, "stdout reserved for protocol output");
    // SAFETY: `protocol_fd` is a valid, open descriptor exclusively owned here.
    Ok(unsafe { File::from_raw_fd(protocol_fd) })
}

/// Take exclusive ownership of the process stdout for protocol output.
#[cfg(not(unix))]
pub fn reserve_stdout() -> Result<File> {
    Err(TransportError::Unsupported)
}
