//! Content transforms applied to backing files: pass, bin, ini, font.
//!
//! Each filter has a matching size projection so `getattr` and `read` never
//! disagree about length (testable properties 3 and 4).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Prefixes rewritten by the `ini` filter. Order doesn't matter; the first
/// matching prefix wins per line.
const INI_EXEC_KEYS: &[&str] = &["TryExec=", "ExecStart=", "ExecStop=", "ExecReload=", "Exec="];

const FONTS_DIR: &str = "fonts.dir";
const FONTS_ALIAS: &str = "fonts.alias";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Pass,
    Bin,
    Ini,
    Font,
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Filter::Pass => "pass",
            Filter::Bin => "bin",
            Filter::Ini => "ini",
            Filter::Font => "font",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Filter {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(Filter::Pass),
            "bin" => Ok(Filter::Bin),
            "ini" => Ok(Filter::Ini),
            "font" => Ok(Filter::Font),
            _ => Err(()),
        }
    }
}

/// Returns `true` if `base_name` is exactly `fonts.dir` or `fonts.alias`,
/// the only names the `font` filter rewrites; all other names under a
/// font-filtered configured path fall through to `pass`.
pub fn is_font_name(base_name: &str) -> bool {
    base_name == FONTS_DIR || base_name == FONTS_ALIAS
}

/// Rewrite a single ini line if its prefix names an execution key.
/// `launcher_path` and `stratum` are inserted between the preserved prefix
/// and the remainder of the line, as `<prefix><launcher_path> <stratum>
/// <remainder>`.
///
/// Returns `None` for lines that don't match any execution key; the caller
/// passes those through unaltered.
pub fn rewrite_ini_line(line: &str, launcher_path: &str, stratum: &str) -> Option<String> {
    for key in INI_EXEC_KEYS {
        if let Some(rest) = line.strip_prefix(key) {
            return Some(format!("{key}{launcher_path} {stratum} {rest}"));
        }
    }
    None
}

/// Additional bytes the `ini` filter inserts for a single matching line.
/// Kept in lockstep with [`rewrite_ini_line`]'s output: the size projection
/// in `getattr` must agree byte-for-byte with what `read` emits.
pub fn ini_line_overhead(launcher_path: &str, stratum: &str) -> usize {
    launcher_path.len() + 1 + stratum.len() + 1
}

/// One font key/value pair, as read from a `fonts.dir`/`fonts.alias` line.
/// `value` retains its trailing newline from the source line, if present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontEntry {
    pub key: String,
    pub value: String,
}

/// Parse one backing `fonts.dir`/`fonts.alias` file's contents into
/// key/value pairs. Lines starting with `!` are comments and skipped; lines
/// with no space or tab separator are skipped (malformed, tolerated rather
/// than rejected).
pub fn parse_font_lines(contents: &str) -> Vec<FontEntry> {
    let mut out = Vec::new();
    for line in split_keep_newline(contents) {
        if line.starts_with('!') {
            continue;
        }
        let Some(sep) = line.find([' ', '\t']) else {
            continue;
        };
        let key = &line[..sep];
        let rest = &line[sep..];
        let value = rest.trim_start_matches([' ', '\t']);
        if key.is_empty() {
            continue;
        }
        out.push(FontEntry {
            key: key.to_owned(),
            value: value.to_owned(),
        });
    }
    out
}

/// Split `contents` into lines, keeping each line's trailing `\n` attached
/// (unlike `str::lines`, which strips it) since font values must retain it.
fn split_keep_newline(contents: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, b) in contents.bytes().enumerate() {
        if b == b'\n' {
            out.push(&contents[start..=i]);
            start = i + 1;
        }
    }
    if start < contents.len() {
        out.push(&contents[start..]);
    }
    out
}

/// Merge font entries from multiple backing files, highest priority first.
/// The first file to define a key wins; the returned map is unordered, the
/// caller sorts it for emission.
pub fn merge_font_entries(per_file: &[Vec<FontEntry>]) -> HashMap<String, String> {
    let mut merged = HashMap::new();
    for entries in per_file {
        for entry in entries {
            merged.entry(entry.key.clone()).or_insert_with(|| entry.value.clone());
        }
    }
    merged
}

/// Render a merged font table: sorted ascending by key, `key\tvalue` per
/// pair, with a leading count line when `with_count` is set (i.e. the
/// target file is `fonts.dir` rather than `fonts.alias`).
pub fn render_font_table(merged: &HashMap<String, String>, with_count: bool) -> String {
    let mut keys: Vec<&String> = merged.keys().collect();
    keys.sort();

    let mut out = String::new();
    if with_count {
        out.push_str(&keys.len().to_string());
        out.push('\n');
    }
    for key in keys {
        out.push_str(key);
        out.push('\t');
        out.push_str(&merged[key]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_font_name() {
        assert!(is_font_name("fonts.dir"));
        assert!(is_font_name("fonts.alias"));
        assert!(!is_font_name("fonts.dir.bak"));
        assert!(!is_font_name("other"));
    }

    #[test]
    fn test_rewrite_ini_line() {
        assert_eq!(
            rewrite_ini_line("Exec=/usr/bin/vim %F\n", "/bedrock/bin/strat", "opensuse"),
            Some("Exec=/bedrock/bin/strat opensuse /usr/bin/vim %F\n".to_owned())
        );
        assert_eq!(rewrite_ini_line("Name=Vim\n", "/bedrock/bin/strat", "opensuse"), None);
    }

    #[test]
    fn test_ini_line_overhead_matches_rewrite() {
        let launcher = "/bedrock/bin/strat";
        let stratum = "opensuse";
        let line = "Exec=/usr/bin/vim %F\n";
        let rewritten = rewrite_ini_line(line, launcher, stratum).unwrap();
        assert_eq!(rewritten.len(), line.len() + ini_line_overhead(launcher, stratum));
    }

    #[test]
    fn test_parse_font_lines_skips_comments_and_malformed() {
        let contents = "!comment\nfoo a\nbar\tb\nmalformed\n";
        let parsed = parse_font_lines(contents);
        assert_eq!(
            parsed,
            vec![
                FontEntry { key: "foo".into(), value: "a\n".into() },
                FontEntry { key: "bar".into(), value: "b\n".into() },
            ]
        );
    }

    #[test]
    fn test_parse_font_lines_multiple_whitespace() {
        let parsed = parse_font_lines("foo   a\n");
        assert_eq!(parsed, vec![FontEntry { key: "foo".into(), value: "a\n".into() }]);
    }

    #[test]
    fn test_merge_and_render_font_table() {
        let a = parse_font_lines("foo a\nbar b\n");
        let b = parse_font_lines("baz c\nfoo z\n");
        let merged = merge_font_entries(&[a, b]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged["foo"], "a\n");

        let rendered = render_font_table(&merged, true);
        assert_eq!(rendered, "3\nbar\tb\nbaz\tc\nfoo\ta\n");
    }

    #[test]
    fn test_render_font_table_no_count_for_alias() {
        let merged = merge_font_entries(&[parse_font_lines("baz c\n")]);
        assert_eq!(render_font_table(&merged, false), "baz\tc\n");
    }
}
