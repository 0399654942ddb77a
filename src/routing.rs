//! The routing table: configured paths mapped to ordered backing locations.

use std::collections::HashMap;
use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::sync::Arc;

use crate::filters::Filter;

/// A reference to an opened stratum root directory, used to scope
/// rooted-I/O operations. Shared by every [`BackingEntry`] that names the
/// same stratum; the directory is closed when the last `Arc` referring to
/// it is dropped (ordinary Rust ownership stands in for the manual
/// refcounting the original C implementation performs by hand).
pub struct StratumRoot {
    pub label: String,
    handle: File,
}

impl StratumRoot {
    pub fn open(strata_root: &File, label: &str) -> std::io::Result<Self> {
        use std::os::unix::fs::OpenOptionsExt;
        let handle = std::fs::OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_DIRECTORY)
            .open_at(strata_root, label)?;
        Ok(StratumRoot { label: label.to_owned(), handle })
    }

    pub fn raw_fd(&self) -> RawFd {
        self.handle.as_raw_fd()
    }
}

/// `OpenOptions` has no `openat`-style "relative to this directory" method
/// in `std`; this trait adds exactly the one operation this crate needs,
/// implemented with a single `libc::openat` call.
trait OpenAt {
    fn open_at(&self, dir: &File, name: &str) -> std::io::Result<File>;
}

impl OpenAt for std::fs::OpenOptions {
    fn open_at(&self, dir: &File, name: &str) -> std::io::Result<File> {
        use std::ffi::CString;
        use std::os::unix::io::FromRawFd;

        let name = CString::new(name)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        // Safety: `dir` stays open for the duration of the call, `name` is
        // a valid NUL-terminated string, and we check the returned fd.
        let fd = unsafe { libc::openat(dir.as_raw_fd(), name.as_ptr(), libc::O_DIRECTORY) };
        if fd < 0 {
            return Err(std::io::Error::last_os_error());
        }
        // Safety: `fd` was just returned by a successful `openat`.
        Ok(unsafe { File::from_raw_fd(fd) })
    }
}

/// A single file or directory which may fulfill a [`ConfiguredEntry`],
/// anchored to a stratum's root.
pub struct BackingEntry {
    pub stratum: String,
    pub local_path: String,
    pub root: Arc<StratumRoot>,
}

/// A user-facing path in the unified namespace and the filter + ordered
/// backing locations that fulfill it.
pub struct ConfiguredEntry {
    pub cpath: String,
    pub filter: Filter,
    pub backing: Vec<BackingEntry>,
}

/// The ordered sequence of configured entries, plus the cached size of its
/// textual projection (kept in lockstep with [`RoutingTable::canonical_dump`]).
#[derive(Default)]
pub struct RoutingTable {
    pub entries: Vec<ConfiguredEntry>,
    strata: HashMap<String, Arc<StratumRoot>>,
    dump_size: usize,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dump_size(&self) -> usize {
        self.dump_size
    }

    /// Drop the entire table, closing any stratum root handles whose
    /// refcount falls to zero as their last [`BackingEntry`] is dropped.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.strata.clear();
        self.dump_size = 0;
    }

    /// Apply `add <filter> <cpath> <stratum>:<lpath>`. Returns `Ok(true)`
    /// if the table was mutated, `Ok(false)` if the triple already existed
    /// (a no-op success per the duplicate-add idempotence property).
    pub fn add(
        &mut self,
        filter: Filter,
        cpath: &str,
        stratum: &str,
        local_path: &str,
        strata_root: &File,
    ) -> std::io::Result<bool> {
        let idx = match self.entries.iter().position(|e| e.cpath == cpath) {
            Some(idx) => idx,
            None => {
                self.entries.push(ConfiguredEntry {
                    cpath: cpath.to_owned(),
                    filter,
                    backing: Vec::new(),
                });
                self.entries.len() - 1
            }
        };

        if self.entries[idx]
            .backing
            .iter()
            .any(|b| b.stratum == stratum && b.local_path == local_path)
        {
            return Ok(false);
        }

        let root = match self.strata.get(stratum) {
            Some(root) => root.clone(),
            None => {
                let root = Arc::new(StratumRoot::open(strata_root, stratum)?);
                self.strata.insert(stratum.to_owned(), root.clone());
                root
            }
        };

        self.entries[idx].backing.push(BackingEntry {
            stratum: stratum.to_owned(),
            local_path: local_path.to_owned(),
            root,
        });

        self.dump_size += canonical_line(filter, cpath, stratum, local_path).len();
        Ok(true)
    }

    /// The canonical textual projection of the table: one
    /// `add <filter> <cpath> <stratum>:<lpath>\n` line per backing entry,
    /// in insertion order. Its length always equals [`Self::dump_size`].
    pub fn canonical_dump(&self) -> String {
        let mut out = String::with_capacity(self.dump_size);
        for entry in &self.entries {
            for back in &entry.backing {
                out.push_str(&canonical_line(entry.filter, &entry.cpath, &back.stratum, &back.local_path));
            }
        }
        out
    }
}

fn canonical_line(filter: Filter, cpath: &str, stratum: &str, local_path: &str) -> String {
    format!("add {filter} {cpath} {stratum}:{local_path}\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn strata_root(dir: &Path) -> File {
        File::open(dir).unwrap()
    }

    #[test]
    fn test_add_is_idempotent() {
        let tmp = std::env::temp_dir().join("stratafs-test-routing-idempotent");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("strat-a")).unwrap();
        let root = strata_root(&tmp);

        let mut table = RoutingTable::new();
        let changed1 = table.add(Filter::Pass, "/bin", "strat-a", "/usr/bin", &root).unwrap();
        let changed2 = table.add(Filter::Pass, "/bin", "strat-a", "/usr/bin", &root).unwrap();
        assert!(changed1);
        assert!(!changed2);
        assert_eq!(table.entries.len(), 1);
        assert_eq!(table.entries[0].backing.len(), 1);
    }

    #[test]
    fn test_canonical_dump_matches_cached_size() {
        let tmp = std::env::temp_dir().join("stratafs-test-routing-dump");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("strat-a")).unwrap();
        fs::create_dir_all(tmp.join("strat-b")).unwrap();
        let root = strata_root(&tmp);

        let mut table = RoutingTable::new();
        table.add(Filter::Pass, "/etc", "strat-a", "/etc", &root).unwrap();
        table.add(Filter::Ini, "/applications", "strat-b", "/usr/share/applications", &root).unwrap();

        let dump = table.canonical_dump();
        assert_eq!(dump.len(), table.dump_size());
        assert_eq!(
            dump,
            "add pass /etc strat-a:/etc\nadd ini /applications strat-b:/usr/share/applications\n"
        );
    }

    #[test]
    fn test_clear_resets_table() {
        let tmp = std::env::temp_dir().join("stratafs-test-routing-clear");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("strat-a")).unwrap();
        let root = strata_root(&tmp);

        let mut table = RoutingTable::new();
        table.add(Filter::Pass, "/etc", "strat-a", "/etc", &root).unwrap();
        table.clear();
        assert_eq!(table.dump_size(), 0);
        assert_eq!(table.canonical_dump(), "");
        assert!(table.entries.is_empty());
    }

    #[test]
    fn test_second_add_keeps_first_filter() {
        let tmp = std::env::temp_dir().join("stratafs-test-routing-filter-fixed");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("strat-a")).unwrap();
        let root = strata_root(&tmp);

        let mut table = RoutingTable::new();
        table.add(Filter::Pass, "/etc", "strat-a", "/etc", &root).unwrap();
        // A second `add` for the same cpath with a different filter is
        // accepted for its backing entry but must not change the filter.
        table.add(Filter::Ini, "/etc", "strat-a", "/etc/other", &root).unwrap();
        assert_eq!(table.entries[0].filter, Filter::Pass);
    }
}
