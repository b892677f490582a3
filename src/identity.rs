//! Hierarchical identity strings
//!
//! Every level of the hierarchy derives a human-readable name from its
//! parent's name plus a zero-padded local sequence number. The strings are
//! stable labels and dedup keys when matching externally supplied
//! identifiers; row uniqueness in the store always rests on foreign key +
//! sequence number, never on these strings.

/// Allocation name, e.g. term "10B" + number 36 -> "GBT10B-036".
pub fn allocation_name(term: &str, number: i64) -> String {
    format!("GBT{}-{:03}", term, number)
}

/// Session name, e.g. "GBT10B-036" + 5 -> "GBT10B-036.0005".
pub fn session_name(allocation: &str, number: i64) -> String {
    format!("{}.{:04}", allocation, number)
}

/// Scan name, e.g. "GBT10B-036.0005" + 42 -> "GBT10B-036.0005.0042".
pub fn scan_name(session: &str, number: i64) -> String {
    format!("{}.{:04}", session, number)
}

/// Instrument-file name within a scan, e.g. "...0042" + 1 -> "...0042.0001".
pub fn guppi_file_name(scan: &str, number: i64) -> String {
    format!("{}.{:04}", scan, number)
}

/// Decompose an allocation name back into (term, number).
///
/// Accepts exactly the strings `allocation_name` produces, so
/// "GBT10B-036" yields ("10B", 36). Anything else returns `None`.
pub fn parse_allocation_name(name: &str) -> Option<(String, i64)> {
    let rest = name.strip_prefix("GBT")?;
    let (term, number) = rest.rsplit_once('-')?;
    if term.is_empty() || number.is_empty() {
        return None;
    }
    let number: i64 = number.parse().ok()?;
    Some((term.to_string(), number))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_name_zero_pads_to_three() {
        assert_eq!(allocation_name("10B", 36), "GBT10B-036");
        assert_eq!(allocation_name("09A", 4), "GBT09A-004");
        assert_eq!(allocation_name("11A", 1234), "GBT11A-1234");
    }

    #[test]
    fn test_child_names_zero_pad_to_four() {
        let alloc = allocation_name("10B", 36);
        let session = session_name(&alloc, 5);
        assert_eq!(session, "GBT10B-036.0005");

        let scan = scan_name(&session, 42);
        assert_eq!(scan, "GBT10B-036.0005.0042");

        assert_eq!(guppi_file_name(&scan, 1), "GBT10B-036.0005.0042.0001");
    }

    #[test]
    fn test_names_are_stable() {
        assert_eq!(allocation_name("10B", 36), allocation_name("10B", 36));
        assert_eq!(session_name("GBT10B-036", 5), session_name("GBT10B-036", 5));
    }

    #[test]
    fn test_parse_allocation_name_round_trips() {
        let (term, number) = parse_allocation_name("GBT10B-036").unwrap();
        assert_eq!(term, "10B");
        assert_eq!(number, 36);
        assert_eq!(allocation_name(&term, number), "GBT10B-036");
    }

    #[test]
    fn test_parse_allocation_name_rejects_malformed() {
        assert!(parse_allocation_name("10B-036").is_none());
        assert!(parse_allocation_name("GBT10B036").is_none());
        assert!(parse_allocation_name("GBT-036").is_none());
        assert!(parse_allocation_name("GBT10B-").is_none());
        assert!(parse_allocation_name("GBT10B-x36").is_none());
    }
}
