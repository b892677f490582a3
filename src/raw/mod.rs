//! Raw instrument file access boundary
//!
//! Decoding the instrument's binary header/table structure is an external
//! capability: a backend opens a file and yields the primary header as a
//! key/value mapping plus the per-subintegration pointing table. The
//! extractor only ever talks to the [`RawReader`] trait, so backends are
//! swappable and tests run against in-memory fakes.

#[cfg(feature = "fits")]
mod fits;

#[cfg(feature = "fits")]
pub use fits::FitsReader;

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;

/// Primary-header key/value mapping of a raw instrument file.
#[derive(Debug, Clone, Default)]
pub struct RawHeader {
    values: HashMap<String, String>,
}

impl RawHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Fetch a required string key, trimmed of surrounding whitespace.
    pub fn require_str(&self, path: &Path, key: &str) -> Result<String> {
        self.get(key)
            .map(|v| v.trim().to_string())
            .ok_or_else(|| Error::UnreadableHeader {
                path: path.to_path_buf(),
                reason: format!("missing header key {}", key),
            })
    }

    /// Fetch a required numeric key.
    pub fn require_f64(&self, path: &Path, key: &str) -> Result<f64> {
        let raw = self.require_str(path, key)?;
        raw.parse().map_err(|_| Error::UnreadableHeader {
            path: path.to_path_buf(),
            reason: format!("header key {} is not numeric: {:?}", key, raw),
        })
    }

    /// Fetch a required integer key.
    pub fn require_i64(&self, path: &Path, key: &str) -> Result<i64> {
        let raw = self.require_str(path, key)?;
        raw.parse().map_err(|_| Error::UnreadableHeader {
            path: path.to_path_buf(),
            reason: format!("header key {} is not an integer: {:?}", key, raw),
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawHeader {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Per-subintegration pointing/timing columns.
///
/// All columns run in subintegration order and must have equal length.
#[derive(Debug, Clone, Default)]
pub struct PointingTable {
    /// Offset of each subintegration centre from the file reference time, seconds.
    pub offs_sub: Vec<f64>,
    /// Duration of each subintegration, seconds.
    pub tsubint: Vec<f64>,
    /// Right ascension per subintegration, degrees.
    pub ra: Vec<f64>,
    /// Declination per subintegration, degrees.
    pub dec: Vec<f64>,
    /// Telescope azimuth per subintegration, degrees.
    pub az: Vec<f64>,
    /// Telescope zenith angle per subintegration, degrees.
    pub zen: Vec<f64>,
}

impl PointingTable {
    pub fn len(&self) -> usize {
        self.offs_sub.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offs_sub.is_empty()
    }

    /// Validate shape: non-empty and all columns the same length.
    pub fn validate(&self, path: &Path) -> Result<()> {
        if self.is_empty() {
            return Err(Error::UnreadableData {
                path: path.to_path_buf(),
                reason: "pointing table has no rows".to_string(),
            });
        }
        let n = self.offs_sub.len();
        let lengths = [
            ("TSUBINT", self.tsubint.len()),
            ("RA_SUB", self.ra.len()),
            ("DEC_SUB", self.dec.len()),
            ("TEL_AZ", self.az.len()),
            ("TEL_ZEN", self.zen.len()),
        ];
        for (name, len) in lengths {
            if len != n {
                return Err(Error::UnreadableData {
                    path: path.to_path_buf(),
                    reason: format!("column {} has {} rows, expected {}", name, len, n),
                });
            }
        }
        Ok(())
    }
}

/// Backend that opens raw instrument files.
///
/// `read_header` must not force loading of bulk sample data; only the
/// full-data extraction depth calls `read_pointing`.
pub trait RawReader {
    fn read_header(&self, path: &Path) -> Result<RawHeader>;

    fn read_pointing(&self, path: &Path) -> Result<PointingTable>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_require_str_trims() {
        let header: RawHeader = [("SRC_NAME", "  3C286  ")].into_iter().collect();
        let path = PathBuf::from("x.fits");
        assert_eq!(header.require_str(&path, "SRC_NAME").unwrap(), "3C286");
    }

    #[test]
    fn test_require_missing_key_is_unreadable_header() {
        let header = RawHeader::new();
        let err = header
            .require_str(Path::new("x.fits"), "OBS_MODE")
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::UnreadableHeader { .. }));
    }

    #[test]
    fn test_validate_rejects_ragged_columns() {
        let table = PointingTable {
            offs_sub: vec![0.5, 1.5],
            tsubint: vec![1.0, 1.0],
            ra: vec![10.0],
            dec: vec![20.0, 20.1],
            az: vec![100.0, 101.0],
            zen: vec![30.0, 31.0],
        };
        let err = table.validate(Path::new("x.fits")).unwrap_err();
        assert!(matches!(err, crate::error::Error::UnreadableData { .. }));
    }
}
