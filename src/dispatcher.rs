//! The FUSE request dispatcher: translates `FilesystemMT` callbacks into
//! calls against the classifier, resolver, directory synthesizer, and
//! content filters.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, SystemTime};

use fuse_mt::{
    CallbackResult, DirectoryEntry, FileAttr, FilesystemMT, FileType, RequestInfo, ResultEmpty,
    ResultEntry, ResultOpen, ResultReaddir, ResultSlice, ResultWrite, ResultXattr,
};
use log::{debug, warn};

use crate::classify::{classify, PathClass, CONTROL_PATH};
use crate::control;
use crate::dirsynth::{list_backed_directory, list_root, list_virtual_directory};
use crate::error::CrossFsError;
use crate::filters::{self, Filter};
use crate::fsid::FsIdGuard;
use crate::resolve::{locate_first, open_first, stat_first};
use crate::rooted_io::RootedIo;
use crate::routing::RoutingTable;

const XATTR_STRATUM: &str = "user.bedrock.stratum";
const XATTR_LOCALPATH: &str = "user.bedrock.localpath";

/// Mode bits stripped from a backing file's real mode before it's reported
/// to the kernel: setuid/setgid/sticky, plus every write bit (the unified
/// namespace is read-only regardless of what the backing stratum allows).
const MODE_MASK: u32 = !(libc::S_ISUID | libc::S_ISGID | libc::S_ISVTX | 0o222);

const TTL: Duration = Duration::from_secs(1);

/// What an open file handle resolves to, cached between `open`/`opendir`
/// and the `read`/`readdir`/`release` calls that name it by `fh`.
enum OpenHandle {
    Directory(Vec<(String, FileType)>),
    File(Vec<u8>),
    Control,
}

fn path_str(path: &Path) -> Result<&str, libc::c_int> {
    path.to_str().ok_or(libc::EINVAL)
}

fn to_errno(e: std::io::Error) -> libc::c_int {
    CrossFsError::from(e).errno()
}

fn dir_attr(size: u64) -> FileAttr {
    let now = SystemTime::now();
    FileAttr {
        size,
        blocks: 1,
        atime: now,
        mtime: now,
        ctime: now,
        crtime: now,
        kind: FileType::Directory,
        perm: 0o755,
        nlink: 2,
        uid: 0,
        gid: 0,
        rdev: 0,
        flags: 0,
    }
}

fn file_attr(size: u64, perm: u16) -> FileAttr {
    let now = SystemTime::now();
    FileAttr {
        size,
        blocks: (size + 511) / 512,
        atime: now,
        mtime: now,
        ctime: now,
        crtime: now,
        kind: FileType::RegularFile,
        perm,
        nlink: 1,
        uid: 0,
        gid: 0,
        rdev: 0,
        flags: 0,
    }
}

/// Split a backed path into `(cpath_len, tail)` for the entry named by
/// `PathClass::Backed`.
fn tail_for<'a>(table: &RoutingTable, idx: usize, ipath: &'a str) -> &'a str {
    &ipath[table.entries[idx].cpath.len()..]
}

/// Read and filter the content of the winning backing location for a
/// configured entry, and return its apparent size alongside the bytes.
fn synthesize_content(
    io: &RootedIo,
    table: &RoutingTable,
    idx: usize,
    tail: &str,
    redirector: &[u8],
    launcher_path: &str,
) -> std::io::Result<Vec<u8>> {
    let entry = &table.entries[idx];
    match entry.filter {
        Filter::Pass => {
            let (_, mut f) = open_first(io, entry, tail)?;
            use std::io::Read;
            let mut buf = Vec::new();
            f.read_to_end(&mut buf)?;
            Ok(buf)
        }
        Filter::Bin => Ok(redirector.to_vec()),
        Filter::Ini => {
            let (resolved, text) = {
                let (resolved, mut f) = open_first(io, entry, tail)?;
                use std::io::Read;
                let mut s = String::new();
                f.read_to_string(&mut s)?;
                (resolved, s)
            };
            let mut out = String::with_capacity(text.len());
            for line in text.split_inclusive('\n') {
                match filters::rewrite_ini_line(line, launcher_path, resolved.stratum) {
                    Some(rewritten) => out.push_str(&rewritten),
                    None => out.push_str(line),
                }
            }
            Ok(out.into_bytes())
        }
        Filter::Font if !filters::is_font_name(tail.rsplit('/').next().unwrap_or(tail)) => {
            let (_, mut f) = open_first(io, entry, tail)?;
            use std::io::Read;
            let mut buf = Vec::new();
            f.read_to_end(&mut buf)?;
            Ok(buf)
        }
        Filter::Font => {
            let base_name = tail.rsplit('/').next().unwrap_or(tail);
            let with_count = base_name == "fonts.dir";
            let mut per_file = Vec::with_capacity(entry.backing.len());
            for back in &entry.backing {
                let Some(path) = crate::rooted_io::join_bounded(&back.local_path, tail) else {
                    continue;
                };
                match io.read_to_string(&back.root, &path) {
                    Ok(text) => per_file.push(filters::parse_font_lines(&text)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
            }
            let merged = filters::merge_font_entries(&per_file);
            Ok(filters::render_font_table(&merged, with_count).into_bytes())
        }
    }
}

/// `StrataFs` holds the mutable routing table and the single
/// chroot-serializing rooted-I/O executor shared by every request.
pub struct StrataFs {
    table: RwLock<RoutingTable>,
    io: RootedIo,
    strata_root: std::fs::File,
    redirector: Vec<u8>,
    launcher_path: String,
    next_fh: AtomicU64,
    open_files: Mutex<HashMap<u64, OpenHandle>>,
}

impl StrataFs {
    pub fn new(
        initial_root: &std::fs::File,
        strata_root: std::fs::File,
        redirector: Vec<u8>,
        launcher_path: String,
    ) -> Self {
        StrataFs {
            table: RwLock::new(RoutingTable::new()),
            io: RootedIo::new(initial_root),
            strata_root,
            redirector,
            launcher_path,
            next_fh: AtomicU64::new(1),
            open_files: Mutex::new(HashMap::new()),
        }
    }

    fn alloc_fh(&self) -> u64 {
        self.next_fh.fetch_add(1, Ordering::Relaxed)
    }

    /// Pre-populate the routing table before the filesystem is mounted,
    /// using the same line syntax the control file accepts.
    pub fn apply_startup_routes(&self, lines: &[String]) -> crate::error::Result<()> {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        for line in lines {
            let mut buf = line.clone();
            buf.push('\n');
            control::apply_lines(&mut table, &self.strata_root, &buf)?;
        }
        Ok(())
    }
}

impl FilesystemMT for StrataFs {
    fn init(&self, _req: RequestInfo) -> ResultEmpty {
        debug!("initializing");
        Ok(())
    }

    fn destroy(&self) {
        debug!("unmounting, restoring initial root");
        self.io.restore_initial();
    }

    fn getattr(&self, req: RequestInfo, path: &Path, _fh: Option<u64>) -> ResultEntry {
        let ipath = path_str(path)?;
        let _guard = FsIdGuard::new(req.uid, req.gid);
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());

        match classify(&table, ipath) {
            PathClass::Root | PathClass::VirtualDirectory => Ok((TTL, dir_attr(0))),
            PathClass::Control => Ok((TTL, file_attr(table.dump_size() as u64, 0o600))),
            PathClass::Backed(idx) => {
                let tail = tail_for(&table, idx, ipath);
                let entry = &table.entries[idx];
                let (resolved, meta) = stat_first(&self.io, entry, tail).map_err(to_errno)?;
                if meta.is_dir() {
                    return Ok((TTL, dir_attr(0)));
                }
                let perm = (meta.permissions().mode() & MODE_MASK) as u16;
                let size = match entry.filter {
                    Filter::Pass => meta.len(),
                    Filter::Bin => self.redirector.len() as u64,
                    Filter::Ini => {
                        let text = self.io.read_to_string(
                            &entry.backing.iter().find(|b| b.stratum == resolved.stratum).unwrap().root,
                            &resolved.backing_path,
                        ).map_err(to_errno)?;
                        let mut total = text.len();
                        for line in text.split_inclusive('\n') {
                            if filters::rewrite_ini_line(line, &self.launcher_path, resolved.stratum).is_some() {
                                total += filters::ini_line_overhead(&self.launcher_path, resolved.stratum);
                            }
                        }
                        total as u64
                    }
                    Filter::Font => {
                        synthesize_content(&self.io, &table, idx, tail, &self.redirector, &self.launcher_path)
                            .map_err(to_errno)?
                            .len() as u64
                    }
                };
                Ok((TTL, file_attr(size, perm)))
            }
            PathClass::Absent => Err(libc::ENOENT),
        }
    }

    fn opendir(&self, req: RequestInfo, path: &Path, _flags: u32) -> ResultOpen {
        let ipath = path_str(path)?;
        let _guard = FsIdGuard::new(req.uid, req.gid);
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());

        let names: Vec<(String, FileType)> = match classify(&table, ipath) {
            PathClass::Root => list_root(&table).into_iter().map(|n| (n, FileType::RegularFile)).collect(),
            PathClass::VirtualDirectory => {
                list_virtual_directory(&self.io, &table, ipath).into_iter().map(|n| (n, FileType::Directory)).collect()
            }
            PathClass::Backed(idx) => {
                let tail = tail_for(&table, idx, ipath);
                let entry = &table.entries[idx];
                let (_, meta) = stat_first(&self.io, entry, tail).map_err(to_errno)?;
                if !meta.is_dir() {
                    return Err(libc::ENOTDIR);
                }
                list_backed_directory(&self.io, entry, tail)
                    .into_iter()
                    .map(|n| (n, FileType::RegularFile))
                    .collect()
            }
            PathClass::Control => return Err(libc::ENOTDIR),
            PathClass::Absent => return Err(libc::ENOENT),
        };

        let fh = self.alloc_fh();
        self.open_files.lock().unwrap_or_else(|e| e.into_inner()).insert(fh, OpenHandle::Directory(names));
        Ok((fh, 0))
    }

    fn readdir(&self, _req: RequestInfo, _path: &Path, fh: u64) -> ResultReaddir {
        let files = self.open_files.lock().unwrap_or_else(|e| e.into_inner());
        match files.get(&fh) {
            Some(OpenHandle::Directory(names)) => Ok(names
                .iter()
                .map(|(name, kind)| DirectoryEntry { name: std::ffi::OsString::from(name.as_str()), kind: *kind })
                .collect()),
            _ => Err(libc::EBADF),
        }
    }

    fn releasedir(&self, _req: RequestInfo, _path: &Path, fh: u64, _flags: u32) -> ResultEmpty {
        self.open_files.lock().unwrap_or_else(|e| e.into_inner()).remove(&fh);
        Ok(())
    }

    fn open(&self, req: RequestInfo, path: &Path, _flags: u32) -> ResultOpen {
        let ipath = path_str(path)?;
        let _guard = FsIdGuard::new(req.uid, req.gid);
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());

        let handle = match classify(&table, ipath) {
            PathClass::Control => {
                if req.uid != 0 {
                    return Err(libc::EACCES);
                }
                OpenHandle::Control
            }
            PathClass::Backed(idx) => {
                let tail = tail_for(&table, idx, ipath);
                let bytes = synthesize_content(&self.io, &table, idx, tail, &self.redirector, &self.launcher_path)
                    .map_err(to_errno)?;
                OpenHandle::File(bytes)
            }
            PathClass::Root | PathClass::VirtualDirectory => return Err(libc::EISDIR),
            PathClass::Absent => return Err(libc::ENOENT),
        };

        let fh = self.alloc_fh();
        self.open_files.lock().unwrap_or_else(|e| e.into_inner()).insert(fh, handle);
        Ok((fh, 0))
    }

    fn read(
        &self,
        req: RequestInfo,
        _path: &Path,
        fh: u64,
        offset: u64,
        size: u32,
        callback: impl FnOnce(ResultSlice<'_>) -> CallbackResult,
    ) -> CallbackResult {
        let _guard = FsIdGuard::new(req.uid, req.gid);
        let files = self.open_files.lock().unwrap_or_else(|e| e.into_inner());
        let is_control = matches!(files.get(&fh), Some(OpenHandle::Control));

        if is_control {
            drop(files);
            let table = self.table.read().unwrap_or_else(|e| e.into_inner());
            let dump = table.canonical_dump();
            let bytes = dump.as_bytes();
            let start = (offset as usize).min(bytes.len());
            let end = (start + size as usize).min(bytes.len());
            return callback(Ok(&bytes[start..end]));
        }

        let bytes: &[u8] = match files.get(&fh) {
            Some(OpenHandle::File(bytes)) => bytes,
            _ => return callback(Err(libc::EBADF)),
        };

        let start = offset as usize;
        if start >= bytes.len() {
            return callback(Ok(&[]));
        }
        let end = (start + size as usize).min(bytes.len());
        callback(Ok(&bytes[start..end]))
    }

    fn write(&self, req: RequestInfo, path: &Path, fh: u64, _offset: u64, data: Vec<u8>, _flags: u32) -> ResultWrite {
        let ipath = path_str(path)?;
        let _guard = FsIdGuard::new(req.uid, req.gid);
        if ipath != CONTROL_PATH {
            return Err(libc::EROFS);
        }
        if req.uid != 0 {
            return Err(libc::EACCES);
        }

        let files = self.open_files.lock().unwrap_or_else(|e| e.into_inner());
        if !matches!(files.get(&fh), Some(OpenHandle::Control)) {
            return Err(libc::EBADF);
        }
        drop(files);

        let text = String::from_utf8(data).map_err(|_| libc::EINVAL)?;
        let len = text.len();
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        match control::apply_lines(&mut table, &self.strata_root, &text) {
            Ok(()) => Ok(len as u32),
            Err(e) => {
                warn!("rejecting malformed control write: {e}");
                Err(libc::EINVAL)
            }
        }
    }

    fn release(&self, _req: RequestInfo, _path: &Path, fh: u64, _flags: u32, _lock_owner: u64, _flush: bool) -> ResultEmpty {
        self.open_files.lock().unwrap_or_else(|e| e.into_inner()).remove(&fh);
        Ok(())
    }

    fn getxattr(&self, req: RequestInfo, path: &Path, name: &OsStr, size: u32) -> ResultXattr {
        let ipath = path_str(path)?;
        let _guard = FsIdGuard::new(req.uid, req.gid);
        let name = name.to_str().ok_or(libc::EINVAL)?;
        if name != XATTR_STRATUM && name != XATTR_LOCALPATH {
            return Err(libc::ENODATA);
        }

        // A read lock suffices here: listing or reading an xattr name
        // never mutates the routing table.
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        let idx = match classify(&table, ipath) {
            PathClass::Backed(idx) => idx,
            PathClass::Absent => return Err(libc::ENOENT),
            PathClass::Root | PathClass::VirtualDirectory | PathClass::Control => return Err(libc::ENODATA),
        };

        let tail = tail_for(&table, idx, ipath);
        let entry = &table.entries[idx];
        let resolved = locate_first(&self.io, entry, tail).map_err(to_errno)?;
        let value = match name {
            XATTR_STRATUM => resolved.stratum.to_owned(),
            _ => resolved.backing_path,
        };

        if size == 0 {
            return Ok(fuse_mt::Xattr::Size(value.len() as u32));
        }
        if (size as usize) < value.len() {
            return Err(libc::ERANGE);
        }
        Ok(fuse_mt::Xattr::Data(value.into_bytes()))
    }
}
