//! Resolves a configured entry's ordered backing locations down to the
//! first one that actually exists, or collects every one that does.

use std::fs::Metadata;
use std::io;

use crate::rooted_io::{join_bounded, RootedIo};
use crate::routing::ConfiguredEntry;

/// The backing location selected by [`stat_first`]/[`open_first`], plus the
/// absolute path it resolved to within its stratum.
pub struct Resolved<'a> {
    pub stratum: &'a str,
    pub backing_path: String,
}

/// Walk `entry`'s backing locations in priority order, returning the first
/// whose `stat` succeeds. `tail` is the portion of the incoming path beyond
/// `entry.cpath`. An overlong joined path is treated like a stat failure for
/// that one backing location, not a hard error.
pub fn stat_first<'a>(io: &RootedIo, entry: &'a ConfiguredEntry, tail: &str) -> io::Result<(Resolved<'a>, Metadata)> {
    let mut last_err = None;
    for back in &entry.backing {
        let Some(path) = join_bounded(&back.local_path, tail) else {
            continue;
        };
        match io.stat(&back.root, &path) {
            Ok(meta) => {
                return Ok((
                    Resolved { stratum: &back.stratum, backing_path: path },
                    meta,
                ));
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::NotFound)))
}

/// Like [`stat_first`] but opens the winning backing file for reading
/// instead of merely stat-ing it.
pub fn open_first<'a>(io: &RootedIo, entry: &'a ConfiguredEntry, tail: &str) -> io::Result<(Resolved<'a>, std::fs::File)> {
    let mut last_err = None;
    for back in &entry.backing {
        let Some(path) = join_bounded(&back.local_path, tail) else {
            continue;
        };
        match io.open_read(&back.root, &path) {
            Ok(file) => {
                return Ok((
                    Resolved { stratum: &back.stratum, backing_path: path },
                    file,
                ));
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::NotFound)))
}

/// A symlink-tolerant existence probe across every backing location in
/// priority order, stopping at the first that exists by any type.
pub fn locate_first<'a>(io: &RootedIo, entry: &'a ConfiguredEntry, tail: &str) -> io::Result<Resolved<'a>> {
    let mut last_err = None;
    for back in &entry.backing {
        let Some(path) = join_bounded(&back.local_path, tail) else {
            continue;
        };
        match io.exists_tolerant(&back.root, &path) {
            Ok(_) => return Ok(Resolved { stratum: &back.stratum, backing_path: path }),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::NotFound)))
}

/// Read every backing location's directory listing, in priority order, for
/// the union synthesis a directory read performs.
pub fn list_all(io: &RootedIo, entry: &ConfiguredEntry, tail: &str) -> Vec<Vec<String>> {
    let mut out = Vec::with_capacity(entry.backing.len());
    for back in &entry.backing {
        let Some(path) = join_bounded(&back.local_path, tail) else {
            out.push(Vec::new());
            continue;
        };
        out.push(io.read_dir_names(&back.root, &path).unwrap_or_default());
    }
    out
}
