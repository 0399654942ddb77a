//! Typed domain errors, translated to `libc::c_int` at the FUSE boundary.

use std::io;

use thiserror::Error;

/// The error kinds named in the specification's error handling design.
#[derive(Error, Debug)]
pub enum CrossFsError {
    /// Classification fell through, or every backing candidate reported
    /// not-found.
    #[error("no such file or directory")]
    Absent,
    /// Access to the control file by a non-root caller.
    #[error("permission denied")]
    PermissionDenied,
    /// Write to any target other than the control file, or open of a
    /// backed path for non-read access.
    #[error("read-only filesystem")]
    ReadOnly,
    /// An extended-attribute read supplied an undersized non-zero buffer.
    #[error("result too large for buffer")]
    RangeError,
    /// A synthesized backing path would exceed the platform bound.
    #[error("file name too long")]
    NameTooLong,
    /// Malformed control-file command.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Read issued on a virtual or root path.
    #[error("is a directory")]
    IsADirectory,
    /// Allocation failure while applying `add`.
    #[error("cannot allocate memory")]
    NoMemory,
    /// Extended attribute name not recognized.
    #[error("operation not supported")]
    NotSupported,
    /// Any underlying system-call failure not otherwise translated.
    #[error("I/O error: {0}")]
    Other(#[source] io::Error),
}

impl CrossFsError {
    /// Map this error to the `libc::c_int` errno value `fuse_mt` expects.
    pub fn errno(&self) -> libc::c_int {
        match self {
            CrossFsError::Absent => libc::ENOENT,
            CrossFsError::PermissionDenied => libc::EACCES,
            CrossFsError::ReadOnly => libc::EROFS,
            CrossFsError::RangeError => libc::ERANGE,
            CrossFsError::NameTooLong => libc::ENAMETOOLONG,
            CrossFsError::InvalidArgument(_) => libc::EINVAL,
            CrossFsError::IsADirectory => libc::EISDIR,
            CrossFsError::NoMemory => libc::ENOMEM,
            CrossFsError::NotSupported => libc::ENOTSUP,
            CrossFsError::Other(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

impl From<io::Error> for CrossFsError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => CrossFsError::Absent,
            io::ErrorKind::PermissionDenied => CrossFsError::PermissionDenied,
            _ => CrossFsError::Other(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, CrossFsError>;
