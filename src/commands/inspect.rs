//! Inspect command implementation

use crate::error::Result;
use crate::extract::{extract, Depth, ExtractionRecord};
use crate::raw::RawReader;
use std::path::Path;

/// Extract a file's metadata without touching the store.
pub fn cmd_inspect<R: RawReader + ?Sized>(
    reader: &R,
    path: &Path,
    depth: Depth,
) -> Result<ExtractionRecord> {
    extract(reader, path, depth)
}

/// Print a record as its dotted-key entries.
pub fn print_record(record: &ExtractionRecord) {
    println!("{}", record.path.display());
    for (key, value) in record.entries() {
        println!("  {:<22} {}", key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::tests::{FakeReader, GOOD_NAME};

    #[test]
    fn test_inspect_does_not_need_a_store() {
        let reader = FakeReader::with_header();
        let record = cmd_inspect(&reader, Path::new(GOOD_NAME), Depth::Header).unwrap();
        assert_eq!(record.entries()["allocation.term"], "10B");
    }
}
