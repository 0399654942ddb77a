//! Synthesizes directory listings for configured, virtual, and root
//! directories: names are unioned across backing locations and across
//! sibling configured paths, never duplicated.

use std::collections::BTreeSet;

use crate::classify::CONTROL_NAME;
use crate::resolve::{list_all, locate_first};
use crate::rooted_io::RootedIo;
use crate::routing::{ConfiguredEntry, RoutingTable};

/// List a backed directory: the union of every backing location's entries
/// for the same `tail`, deduplicated and returned in sorted order.
pub fn list_backed_directory(io: &RootedIo, entry: &ConfiguredEntry, tail: &str) -> Vec<String> {
    let mut names = BTreeSet::new();
    for listing in list_all(io, entry, tail) {
        names.extend(listing);
    }
    names.into_iter().collect()
}

/// List the immediate children of `ipath`, a directory that exists only
/// because some configured path descends from it (no configured entry
/// backs `ipath` itself). For each configured entry whose `cpath` is a
/// proper descendant of `ipath`, the name contributed is:
///
/// - the entry's own next path segment, if `cpath` names a grandchild or
///   deeper (the intermediate segment is itself virtual and always
///   contributed), or
/// - that segment, but only if it actually exists in at least one of the
///   entry's backing locations, if `cpath` names an immediate child (the
///   segment would itself be a real, backed entry — listing it when none
///   of its backing locations exist would advertise a file that `getattr`
///   and `open` would then report as absent).
///
/// Either way the contributed name is just the one path segment directly
/// under `ipath`; duplicates across multiple configured entries collapse.
pub fn list_virtual_directory(io: &RootedIo, table: &RoutingTable, ipath: &str) -> Vec<String> {
    let mut names = BTreeSet::new();
    let prefix_len = if ipath == "/" { 1 } else { ipath.len() + 1 };
    for entry in &table.entries {
        if !crate::path::is_proper_prefix(ipath, &entry.cpath) {
            continue;
        }
        let rest = &entry.cpath[prefix_len..];
        let segment = rest.split('/').next().unwrap_or(rest);
        if segment.is_empty() {
            continue;
        }
        if segment == rest && locate_first(io, entry, "").is_err() {
            continue;
        }
        names.insert(segment.to_owned());
    }
    names.into_iter().collect()
}

/// List the mount point root: every top-level segment contributed by a
/// configured path (whether that segment is itself backed or merely
/// virtual) plus the control file's name.
///
/// `/` is the implicit parent of every `cpath`, but it doesn't satisfy the
/// `/`-boundary precondition [`crate::path::is_proper_prefix`] checks for
/// any other directory (root already ends in the separator), so this walks
/// `cpath`'s first segment directly rather than going through
/// [`list_virtual_directory`].
pub fn list_root(table: &RoutingTable) -> Vec<String> {
    let mut names = BTreeSet::new();
    for entry in &table.entries {
        let segment = entry.cpath[1..].split('/').next().unwrap_or("");
        if !segment.is_empty() {
            names.insert(segment.to_owned());
        }
    }
    names.insert(CONTROL_NAME.to_owned());
    names.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::Filter;
    use std::fs::{self, File};

    fn strata_root(name: &str) -> File {
        let dir = std::env::temp_dir().join(format!("stratafs-test-dirsynth-{name}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("strat-a")).unwrap();
        File::open(&dir).unwrap()
    }

    #[test]
    fn test_list_virtual_directory_single_segment() {
        let dir = std::env::temp_dir().join("stratafs-test-dirsynth-virtual-single");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("strat-a/x")).unwrap();
        let root = File::open(&dir).unwrap();

        let mut table = RoutingTable::new();
        table.add(Filter::Pass, "/pin/bin/sv", "strat-a", "/x", &root).unwrap();

        let io = RootedIo::new(&root);
        assert_eq!(list_virtual_directory(&io, &table, "/pin"), vec!["bin".to_owned()]);
        assert_eq!(list_virtual_directory(&io, &table, "/pin/bin"), vec!["sv".to_owned()]);
    }

    #[test]
    fn test_list_virtual_directory_omits_missing_immediate_child() {
        let dir = std::env::temp_dir().join("stratafs-test-dirsynth-virtual-missing");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("strat-a")).unwrap();
        let root = File::open(&dir).unwrap();

        let mut table = RoutingTable::new();
        table.add(Filter::Pass, "/x/missing", "strat-a", "/nope", &root).unwrap();

        let io = RootedIo::new(&root);
        assert!(list_virtual_directory(&io, &table, "/x").is_empty());
    }

    #[test]
    fn test_list_root_unions_top_level_and_control() {
        let root = strata_root("root-union");
        let mut table = RoutingTable::new();
        table.add(Filter::Pass, "/bin", "strat-a", "/usr/bin", &root).unwrap();
        table.add(Filter::Pass, "/pin/bin/sv", "strat-a", "/x", &root).unwrap();

        let listing = list_root(&table);
        assert_eq!(listing, vec![".config-filesystem".to_owned(), "bin".to_owned(), "pin".to_owned()]);
    }

    #[test]
    fn test_list_backed_directory_unions_backing() {
        let dir = std::env::temp_dir().join("stratafs-test-dirsynth-backed");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("strat-a/d")).unwrap();
        fs::create_dir_all(dir.join("strat-b/d")).unwrap();
        fs::write(dir.join("strat-a/d/one"), b"").unwrap();
        fs::write(dir.join("strat-b/d/two"), b"").unwrap();
        let root = File::open(&dir).unwrap();

        let mut table = RoutingTable::new();
        table.add(Filter::Pass, "/d", "strat-a", "/d", &root).unwrap();
        table.add(Filter::Pass, "/d", "strat-b", "/d", &root).unwrap();

        let io = RootedIo::new(&root);
        let listing = list_backed_directory(&io, &table.entries[0], "");
        assert_eq!(listing, vec!["one".to_owned(), "two".to_owned()]);
    }
}
