//! Per-request filesystem-uid/gid impersonation.
//!
//! `setfsuid(2)`/`setfsgid(2)` are per-thread, so concurrent requests
//! dispatched on different threads don't interfere with each other's
//! impersonation; unlike `chroot`, no cross-request mutex is needed here.

/// Impersonates a request's caller for the duration of its scope, restoring
/// the previous fsuid/fsgid on drop.
pub struct FsIdGuard {
    prev_uid: libc::uid_t,
    prev_gid: libc::gid_t,
}

impl FsIdGuard {
    pub fn new(uid: u32, gid: u32) -> Self {
        // Safety: setfsuid/setfsgid take plain integer ids and always
        // succeed for a process with the needed capabilities, returning
        // the previous value; no pointers involved.
        let prev_uid = unsafe { libc::setfsuid(uid as libc::uid_t) as libc::uid_t };
        let prev_gid = unsafe { libc::setfsgid(gid as libc::gid_t) as libc::gid_t };
        FsIdGuard { prev_uid, prev_gid }
    }
}

impl Drop for FsIdGuard {
    fn drop(&mut self) {
        unsafe {
            libc::setfsuid(self.prev_uid);
            libc::setfsgid(self.prev_gid);
        }
    }
}
