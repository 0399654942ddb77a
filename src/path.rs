//! Prefix and equal-or-prefix comparisons on slash-segmented paths.
//!
//! Both predicates take strings whose lengths are already known to the
//! caller (`str::len` is O(1) in Rust, so there is no separate
//! precomputed-length parameter as in the C original); neither allocates.
//! Roots (`/`) are handled by the classifier, not by these predicates.

/// Holds iff `a` is lexically equal to `b`, or `a` is a prefix of `b` that
/// ends exactly at a `/` boundary in `b`.
///
/// ```text
/// is_equal_or_prefix("/proc", "/proc")      == true
/// is_equal_or_prefix("/proc", "/proc/1")    == true
/// is_equal_or_prefix("/proc", "/proc/1/root") == true
/// is_equal_or_prefix("/proc", "/")          == false
/// is_equal_or_prefix("/proc", "/dev")       == false
/// is_equal_or_prefix("/proc", "/dev/shm")   == false
/// ```
pub fn is_equal_or_prefix(a: &str, b: &str) -> bool {
    if a.len() > b.len() {
        return false;
    }
    match b.as_bytes().get(a.len()) {
        Some(b'/') | None => a.as_bytes() == &b.as_bytes()[..a.len()],
        _ => false,
    }
}

/// Holds iff `a` is a strict prefix of `b` ending exactly at a `/` boundary
/// in `b` (i.e. `a` names a parent directory of `b`).
///
/// ```text
/// is_proper_prefix("/proc", "/proc")      == false
/// is_proper_prefix("/proc", "/proc/1")    == true
/// is_proper_prefix("/proc", "/proc/1/root") == true
/// is_proper_prefix("/proc", "/")          == false
/// is_proper_prefix("/proc", "/dev")       == false
/// is_proper_prefix("/proc", "/dev/shm")   == false
/// ```
pub fn is_proper_prefix(a: &str, b: &str) -> bool {
    if a.len() >= b.len() {
        return false;
    }
    b.as_bytes()[a.len()] == b'/' && a.as_bytes() == &b.as_bytes()[..a.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_equal_or_prefix() {
        assert!(is_equal_or_prefix("/proc", "/proc"));
        assert!(is_equal_or_prefix("/proc", "/proc/1"));
        assert!(is_equal_or_prefix("/proc", "/proc/1/root"));
        assert!(!is_equal_or_prefix("/proc", "/"));
        assert!(!is_equal_or_prefix("/proc", "/dev"));
        assert!(!is_equal_or_prefix("/proc", "/dev/shm"));
        assert!(!is_equal_or_prefix("/proc", "/proceed"));
    }

    #[test]
    fn test_is_proper_prefix() {
        assert!(!is_proper_prefix("/proc", "/proc"));
        assert!(is_proper_prefix("/proc", "/proc/1"));
        assert!(is_proper_prefix("/proc", "/proc/1/root"));
        assert!(!is_proper_prefix("/proc", "/"));
        assert!(!is_proper_prefix("/proc", "/dev"));
        assert!(!is_proper_prefix("/proc", "/dev/shm"));
        assert!(!is_proper_prefix("/proc", "/proceed"));
    }
}
