//! Classification of segment writer I/O errors.
//!
//! The flush executor never retries on its own; it surfaces `PersistFailure`
//! for errors a caller may retry and `Io` for the rest. This module decides
//! which is which.

use std::io;

/// Classifies an I/O error as retryable or not.
///
/// Retryable errors are transient conditions of the storage path: timeouts,
/// dropped connections, interrupted syscalls, full disks that an operator can
/// clear. Permission and path errors are not.
pub fn is_retryable_io_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::WriteZero
            | io::ErrorKind::StorageFull
            | io::ErrorKind::ResourceBusy
    )
}
