//! Metadata extraction from raw instrument files
//!
//! Three extraction depths, each a superset of the previous: filename-only,
//! header-only, and full-data. All three are pure with respect to the store
//! and idempotent: re-running extraction on the same file produces an
//! identical record.

pub mod time;

use crate::error::{Error, Result};
use crate::raw::{PointingTable, RawHeader, RawReader};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// `<prefix>_<5-digit>_<freeform>_<4-digit scan>_<4-digit file>.<ext>`
const FILENAME_PATTERN: &str =
    "<prefix>_<5-digit>_<freeform>_<4-digit scan>_<4-digit file>.<ext>";

/// `<2-digit-year><half-letter>_<allocation-number>_<session-number>`
const PROJECT_ID_PATTERN: &str = "<2-digit-year><half-letter>_<allocation>_<session>";

static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]+_\d{5}_(.+)_(\d{4})_(\d{4})\.([A-Za-z0-9]+)$")
        .expect("filename pattern compiles")
});

static PROJECT_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2}[AB])_(\d+)_(\d+)$").expect("project id pattern compiles")
});

/// How much of the file an extraction pass reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    /// Parse the filename only
    Filename,
    /// Read the primary header block
    Header,
    /// Read the header and the per-subintegration pointing table
    Full,
}

/// Fields recovered from the primary header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderFields {
    pub mode: String,
    pub allocation_term: String,
    pub allocation_number: i64,
    pub session_number: i64,
    pub target_name: String,
}

/// Aggregates over the pointing/timing table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointingSummary {
    /// Seconds per sample
    pub cadence: f64,
    /// Unix seconds
    pub start_time: f64,
    pub end_time: f64,
    /// Degrees
    pub ra_min: f64,
    pub ra_max: f64,
    pub dec_min: f64,
    pub dec_max: f64,
    pub az_min: f64,
    pub az_max: f64,
    pub el_min: f64,
    pub el_max: f64,
}

/// Flat metadata record produced by one extraction pass.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRecord {
    pub path: PathBuf,
    pub scan_number: i64,
    pub file_number: i64,
    pub header: Option<HeaderFields>,
    pub pointing: Option<PointingSummary>,
    /// Raw header retained for the downstream bulk-data reader.
    #[serde(skip)]
    pub raw_header: Option<RawHeader>,
}

impl ExtractionRecord {
    pub fn depth(&self) -> Depth {
        match (&self.header, &self.pointing) {
            (_, Some(_)) => Depth::Full,
            (Some(_), None) => Depth::Header,
            (None, None) => Depth::Filename,
        }
    }

    /// Dotted-key view of every populated field, e.g. `allocation.term`.
    pub fn entries(&self) -> BTreeMap<&'static str, String> {
        let mut map = BTreeMap::new();
        map.insert("scan.number", self.scan_number.to_string());
        map.insert("file.number", self.file_number.to_string());
        if let Some(h) = &self.header {
            map.insert("scan.mode", h.mode.clone());
            map.insert("allocation.term", h.allocation_term.clone());
            map.insert("allocation.number", h.allocation_number.to_string());
            map.insert("session.number", h.session_number.to_string());
            map.insert("target.name", h.target_name.clone());
        }
        if let Some(p) = &self.pointing {
            map.insert("scan.cadence", p.cadence.to_string());
            map.insert("scan.start_time", p.start_time.to_string());
            map.insert("scan.end_time", p.end_time.to_string());
            map.insert("scan.ra_min", p.ra_min.to_string());
            map.insert("scan.ra_max", p.ra_max.to_string());
            map.insert("scan.dec_min", p.dec_min.to_string());
            map.insert("scan.dec_max", p.dec_max.to_string());
            map.insert("scan.az_min", p.az_min.to_string());
            map.insert("scan.az_max", p.az_max.to_string());
            map.insert("scan.el_min", p.el_min.to_string());
            map.insert("scan.el_max", p.el_max.to_string());
        }
        map
    }
}

/// Quick check used by directory walks before committing to extraction.
pub fn filename_matches(path: &Path) -> bool {
    file_name(path)
        .map(|name| FILENAME_RE.is_match(name))
        .unwrap_or(false)
}

/// Filename-only extraction: recover the scan and intra-scan file numbers.
pub fn extract_filename(path: &Path) -> Result<ExtractionRecord> {
    let name = file_name(path).ok_or_else(|| Error::MalformedFilename {
        path: path.to_path_buf(),
        expected: FILENAME_PATTERN,
    })?;
    let caps = FILENAME_RE
        .captures(name)
        .ok_or_else(|| Error::MalformedFilename {
            path: path.to_path_buf(),
            expected: FILENAME_PATTERN,
        })?;

    let scan_number: i64 = caps[2].parse().map_err(|_| Error::MalformedFilename {
        path: path.to_path_buf(),
        expected: FILENAME_PATTERN,
    })?;
    let file_number: i64 = caps[3].parse().map_err(|_| Error::MalformedFilename {
        path: path.to_path_buf(),
        expected: FILENAME_PATTERN,
    })?;

    Ok(ExtractionRecord {
        path: path.to_path_buf(),
        scan_number,
        file_number,
        header: None,
        pointing: None,
        raw_header: None,
    })
}

/// Header-only extraction: filename fields plus the primary header block.
pub fn extract_header<R: RawReader + ?Sized>(reader: &R, path: &Path) -> Result<ExtractionRecord> {
    let mut record = extract_filename(path)?;
    let raw = reader.read_header(path)?;

    let mode = raw.require_str(path, "OBS_MODE")?;
    let project_id = raw.require_str(path, "PROJID")?;
    let target_name = raw.require_str(path, "SRC_NAME")?;

    let caps = PROJECT_ID_RE
        .captures(&project_id)
        .ok_or_else(|| Error::MalformedProjectId {
            path: path.to_path_buf(),
            value: project_id.clone(),
            expected: PROJECT_ID_PATTERN,
        })?;
    let allocation_term = caps[1].to_string();
    let allocation_number: i64 = caps[2].parse().map_err(|_| Error::MalformedProjectId {
        path: path.to_path_buf(),
        value: project_id.clone(),
        expected: PROJECT_ID_PATTERN,
    })?;
    let session_number: i64 = caps[3].parse().map_err(|_| Error::MalformedProjectId {
        path: path.to_path_buf(),
        value: project_id.clone(),
        expected: PROJECT_ID_PATTERN,
    })?;

    record.header = Some(HeaderFields {
        mode,
        allocation_term,
        allocation_number,
        session_number,
        target_name,
    });
    record.raw_header = Some(raw);
    Ok(record)
}

/// Full-data extraction: header fields plus pointing/timing aggregates.
pub fn extract_full<R: RawReader + ?Sized>(reader: &R, path: &Path) -> Result<ExtractionRecord> {
    let mut record = extract_header(reader, path)?;
    let raw = record
        .raw_header
        .as_ref()
        .expect("header extraction populates raw_header");

    let cadence = raw.require_f64(path, "TBIN")?;
    let stt_imjd = raw.require_i64(path, "STT_IMJD")?;
    let stt_smjd = raw.require_f64(path, "STT_SMJD")?;
    let stt_offs = raw.require_f64(path, "STT_OFFS")?;
    let reference = time::mjd_day_to_unix(stt_imjd) + stt_smjd + stt_offs;

    let table = reader.read_pointing(path)?;
    table.validate(path)?;

    let first = 0;
    let last = table.len() - 1;
    let start_time = reference + table.offs_sub[first] - table.tsubint[first] / 2.0;
    let end_time = reference + table.offs_sub[last] + table.tsubint[last] / 2.0;

    let (ra_min, ra_max) = bounds(&table.ra);
    let (dec_min, dec_max) = bounds(&table.dec);
    let (az_min, az_max) = bounds(&table.az);
    let (zen_min, zen_max) = bounds(&table.zen);

    record.pointing = Some(PointingSummary {
        cadence,
        start_time,
        end_time,
        ra_min,
        ra_max,
        dec_min,
        dec_max,
        az_min,
        az_max,
        // Elevation is complementary to zenith angle, derived once here.
        el_min: 90.0 - zen_max,
        el_max: 90.0 - zen_min,
    });
    Ok(record)
}

/// Run extraction at the requested depth.
pub fn extract<R: RawReader + ?Sized>(
    reader: &R,
    path: &Path,
    depth: Depth,
) -> Result<ExtractionRecord> {
    match depth {
        Depth::Filename => extract_filename(path),
        Depth::Header => extract_header(reader, path),
        Depth::Full => extract_full(reader, path),
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

fn bounds(values: &[f64]) -> (f64, f64) {
    values.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    })
}
