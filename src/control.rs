//! Parses and applies lines written to the control file.
//!
//! Writes to the control file are line-atomic, not stream-reassembling: a
//! write is split on `\n` and each complete line is parsed and applied
//! independently, but the write as a whole must consist of complete lines.
//! A trailing fragment with no terminating `\n` is rejected rather than
//! buffered for a later write to complete.

use std::fs::File;
use std::str::FromStr;

use crate::error::{CrossFsError, Result};
use crate::filters::Filter;
use crate::routing::RoutingTable;

/// One parsed control-file command.
pub enum Command {
    Add { filter: Filter, cpath: String, stratum: String, local_path: String },
    Clear,
}

/// Parse a single complete line (without its trailing `\n`). Rejects
/// anything that doesn't match `add <filter> <cpath> <stratum>:<lpath>` or
/// `clear` exactly, including a `cpath` that isn't absolute or a `stratum`
/// that contains a `/` (stratum names are single path segments).
pub fn parse_line(line: &str) -> Result<Command> {
    if line == "clear" {
        return Ok(Command::Clear);
    }

    let Some(rest) = line.strip_prefix("add ") else {
        return Err(CrossFsError::InvalidArgument(format!("unrecognized command: {line:?}")));
    };

    let mut parts = rest.splitn(3, ' ');
    let filter_str = parts.next().unwrap_or("");
    let cpath = parts.next().unwrap_or("");
    let location = parts.next().unwrap_or("");

    let filter = Filter::from_str(filter_str)
        .map_err(|_| CrossFsError::InvalidArgument(format!("unknown filter: {filter_str:?}")))?;

    if !cpath.starts_with('/') || cpath.is_empty() {
        return Err(CrossFsError::InvalidArgument(format!("cpath must be absolute: {cpath:?}")));
    }

    let Some((stratum, local_path)) = location.split_once(':') else {
        return Err(CrossFsError::InvalidArgument(format!("missing ':' in location: {location:?}")));
    };

    if stratum.is_empty() || stratum.contains('/') {
        return Err(CrossFsError::InvalidArgument(format!("invalid stratum name: {stratum:?}")));
    }
    if !local_path.starts_with('/') {
        return Err(CrossFsError::InvalidArgument(format!("local path must be absolute: {local_path:?}")));
    }

    Ok(Command::Add {
        filter,
        cpath: cpath.to_owned(),
        stratum: stratum.to_owned(),
        local_path: local_path.to_owned(),
    })
}

/// Apply every line in `buf` to `table`. `buf` must consist entirely of
/// complete, newline-terminated lines; a non-empty trailing fragment with
/// no terminating `\n` is rejected rather than held back for a later call.
pub fn apply_lines(table: &mut RoutingTable, strata_root: &File, buf: &str) -> Result<()> {
    if !buf.is_empty() && !buf.ends_with('\n') {
        return Err(CrossFsError::InvalidArgument("write must end with a complete line".to_owned()));
    }
    for line in buf.split_inclusive('\n') {
        let complete = line.strip_suffix('\n').expect("buf ends with a complete line");
        if complete.is_empty() {
            continue;
        }
        match parse_line(complete)? {
            Command::Clear => table.clear(),
            Command::Add { filter, cpath, stratum, local_path } => {
                table.add(filter, &cpath, &stratum, &local_path, strata_root)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn strata_root(name: &str) -> File {
        let dir = std::env::temp_dir().join(format!("stratafs-test-control-{name}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("strat-a")).unwrap();
        File::open(&dir).unwrap()
    }

    #[test]
    fn test_parse_add_line() {
        match parse_line("add pass /bin strat-a:/usr/bin").unwrap() {
            Command::Add { filter, cpath, stratum, local_path } => {
                assert_eq!(filter, Filter::Pass);
                assert_eq!(cpath, "/bin");
                assert_eq!(stratum, "strat-a");
                assert_eq!(local_path, "/usr/bin");
            }
            Command::Clear => panic!("expected Add"),
        }
    }

    #[test]
    fn test_parse_clear_line() {
        assert!(matches!(parse_line("clear").unwrap(), Command::Clear));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_line("add pass bin strat-a:/usr/bin").is_err());
        assert!(parse_line("add pass /bin strat-a/usr/bin").is_err());
        assert!(parse_line("add pass /bin strat-a:usr/bin").is_err());
        assert!(parse_line("add weird /bin strat-a:/usr/bin").is_err());
        assert!(parse_line("frobnicate").is_err());
    }

    #[test]
    fn test_apply_lines_rejects_partial_trailer() {
        let root = strata_root("partial");
        let mut table = RoutingTable::new();
        let buf = "add pass /bin strat-a:/usr/bin\nadd ini /etc strat-a:/e";
        assert!(apply_lines(&mut table, &root, buf).is_err());
        assert!(table.entries.is_empty());
    }

    #[test]
    fn test_apply_lines_clear_then_add() {
        let root = strata_root("clear-add");
        let mut table = RoutingTable::new();
        apply_lines(&mut table, &root, "add pass /bin strat-a:/usr/bin\n").unwrap();
        apply_lines(&mut table, &root, "clear\n").unwrap();
        assert!(table.entries.is_empty());
    }
}
