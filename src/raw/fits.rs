//! FITS-backed raw file reader
//!
//! Production backend for instrument files written in PSRFITS-style layout:
//! scalar metadata in the primary HDU, per-subintegration pointing in the
//! SUBINT binary table.

use crate::error::{Error, Result};
use crate::raw::{PointingTable, RawHeader, RawReader};
use fitsio::hdu::FitsHdu;
use fitsio::FitsFile;
use std::path::Path;

/// Header keys mirrored into [`RawHeader`]. Anything else in the primary
/// HDU is irrelevant to the index.
const HEADER_KEYS: &[&str] = &[
    "OBS_MODE", "PROJID", "SRC_NAME", "TBIN", "STT_IMJD", "STT_SMJD", "STT_OFFS",
];

/// Reads instrument files through cfitsio.
#[derive(Debug, Default, Clone, Copy)]
pub struct FitsReader;

impl FitsReader {
    pub fn new() -> Self {
        Self
    }
}

impl RawReader for FitsReader {
    fn read_header(&self, path: &Path) -> Result<RawHeader> {
        let mut fptr = FitsFile::open(path).map_err(|e| Error::UnreadableHeader {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let hdu = fptr.primary_hdu().map_err(|e| Error::UnreadableHeader {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut header = RawHeader::new();
        for key in HEADER_KEYS {
            if let Some(value) = read_optional_key(&mut fptr, &hdu, path, key)? {
                header.insert(*key, value);
            }
        }
        Ok(header)
    }

    fn read_pointing(&self, path: &Path) -> Result<PointingTable> {
        let mut fptr = FitsFile::open(path).map_err(|e| Error::UnreadableData {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let hdu = fptr.hdu("SUBINT").map_err(|e| Error::UnreadableData {
            path: path.to_path_buf(),
            reason: format!("no SUBINT table: {}", e),
        })?;

        let table = PointingTable {
            offs_sub: read_col(&mut fptr, &hdu, path, "OFFS_SUB")?,
            tsubint: read_col(&mut fptr, &hdu, path, "TSUBINT")?,
            ra: read_col(&mut fptr, &hdu, path, "RA_SUB")?,
            dec: read_col(&mut fptr, &hdu, path, "DEC_SUB")?,
            az: read_col(&mut fptr, &hdu, path, "TEL_AZ")?,
            zen: read_col(&mut fptr, &hdu, path, "TEL_ZEN")?,
        };
        table.validate(path)?;
        Ok(table)
    }
}

/// Pull a keyword out of an HDU, treating cfitsio's "keyword not found"
/// statuses (202, 204) as absence rather than failure.
fn read_optional_key(
    fptr: &mut FitsFile,
    hdu: &FitsHdu,
    path: &Path,
    keyword: &str,
) -> Result<Option<String>> {
    match hdu.read_key::<String>(fptr, keyword) {
        Ok(value) => Ok(Some(value)),
        Err(fitsio::errors::Error::Fits(ref fe)) if fe.status == 202 || fe.status == 204 => {
            Ok(None)
        }
        Err(e) => Err(Error::UnreadableHeader {
            path: path.to_path_buf(),
            reason: format!("key {}: {}", keyword, e),
        }),
    }
}

fn read_col(
    fptr: &mut FitsFile,
    hdu: &FitsHdu,
    path: &Path,
    column: &str,
) -> Result<Vec<f64>> {
    hdu.read_col::<f64>(fptr, column)
        .map_err(|e| Error::UnreadableData {
            path: path.to_path_buf(),
            reason: format!("column {}: {}", column, e),
        })
}
