//! Resolves paths as though the process were rooted at a given stratum's
//! root directory.
//!
//! The mechanism (`chroot(2)`) is process-global and not reentrant, so
//! every call is serialized through a single mutex that also caches the
//! currently active root; a call whose required stratum matches the
//! cached one skips the re-scoping syscalls entirely. This mirrors the
//! original implementation's `fchroot_*` family and the design note that
//! manual path-walking was measured slower. It is held only for the
//! duration of one underlying operation and does not compose with the
//! routing-table lock: callers must not hold it across an indefinite wait.

use std::fs::{self, File};
use std::io;
use std::os::unix::io::RawFd;
use std::sync::Mutex;

use crate::routing::StratumRoot;

pub struct RootedIo {
    /// The fd of the root this process is currently chroot()'d into.
    current: Mutex<RawFd>,
    /// The fd of the filesystem's own initial root, restored on destroy.
    initial: RawFd,
}

impl RootedIo {
    pub fn new(initial_root: &File) -> Self {
        let fd = std::os::unix::io::AsRawFd::as_raw_fd(initial_root);
        RootedIo {
            current: Mutex::new(fd),
            initial: fd,
        }
    }

    /// Re-scope the process into `root` if it isn't already there, then
    /// run `body`. On failure of the re-scoping step, returns a generic
    /// I/O error without invoking `body`.
    fn with_root<T>(&self, root: &StratumRoot, body: impl FnOnce() -> io::Result<T>) -> io::Result<T> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if *current != root.raw_fd() {
            // Safety: `root.raw_fd()` names a directory this process opened
            // and keeps open for its entire lifetime (owned by an `Arc<StratumRoot>`
            // in the routing table), so fchdir/chroot against it are sound.
            let rv = unsafe { libc::fchdir(root.raw_fd()) };
            if rv < 0 {
                return Err(io::Error::last_os_error());
            }
            let rv = unsafe { libc::chroot(b".\0".as_ptr() as *const libc::c_char) };
            if rv < 0 {
                return Err(io::Error::last_os_error());
            }
            *current = root.raw_fd();
        }
        body()
    }

    pub fn stat(&self, root: &StratumRoot, path: &str) -> io::Result<fs::Metadata> {
        self.with_root(root, || fs::metadata(path))
    }

    /// A symlink-tolerant existence probe: succeeds for any existing file,
    /// directory, or symlink (including a dangling one) without following
    /// the final component.
    pub fn exists_tolerant(&self, root: &StratumRoot, path: &str) -> io::Result<fs::Metadata> {
        self.with_root(root, || fs::symlink_metadata(path))
    }

    pub fn open_read(&self, root: &StratumRoot, path: &str) -> io::Result<File> {
        self.with_root(root, || File::open(path))
    }

    pub fn read_to_string(&self, root: &StratumRoot, path: &str) -> io::Result<String> {
        self.with_root(root, || fs::read_to_string(path))
    }

    pub fn read_dir_names(&self, root: &StratumRoot, path: &str) -> io::Result<Vec<String>> {
        self.with_root(root, || {
            match fs::read_dir(path) {
                Ok(entries) => {
                    let mut names = Vec::new();
                    for entry in entries {
                        let entry = entry?;
                        if entry.metadata().is_ok() {
                            names.push(entry.file_name().to_string_lossy().into_owned());
                        }
                    }
                    Ok(names)
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
                Err(e) => Err(e),
            }
        })
    }

    /// Restore the process's root to its initial anchor. Called once, on
    /// filesystem teardown.
    pub fn restore_initial(&self) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        unsafe {
            libc::fchdir(self.initial);
            libc::chroot(b".\0".as_ptr() as *const libc::c_char);
        }
        *current = self.initial;
    }
}

/// Joins a stratum-relative local path with an incoming path's tail,
/// returning `None` if the result would exceed the platform path-length
/// bound rather than producing a truncated path.
pub fn join_bounded(local_path: &str, tail: &str) -> Option<String> {
    let len = local_path.len() + tail.len();
    if len + 1 > libc::PATH_MAX as usize {
        return None;
    }
    let mut out = String::with_capacity(len);
    out.push_str(local_path);
    out.push_str(tail);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_bounded_rejects_overlong() {
        let local = "/a";
        let tail = "b".repeat(libc::PATH_MAX as usize);
        assert_eq!(join_bounded(local, &tail), None);
    }

    #[test]
    fn test_join_bounded_concatenates() {
        assert_eq!(join_bounded("/usr/bin", "/vi"), Some("/usr/bin/vi".to_owned()));
        assert_eq!(join_bounded("/usr/bin", ""), Some("/usr/bin".to_owned()));
    }
}
