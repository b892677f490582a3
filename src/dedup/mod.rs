//! Content hashing and copy registration
//!
//! Files are content-addressed with BLAKE3, streamed in fixed-size blocks so
//! hashing never loads a whole instrument file into memory. Copies are
//! matched by (file, host, path); a stored hash that disagrees with a fresh
//! computation flags the copy corrupt instead of overwriting the record.

use crate::error::{Error, Result};
use crate::meta::{self, FileCopy, FileRecord, MetaDb};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// Block size for streaming hash computation.
pub const HASH_BLOCK_SIZE: usize = 64 * 1024;

/// Compute the BLAKE3 hash of a file's contents, as lowercase hex.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut block = vec![0u8; HASH_BLOCK_SIZE];
    loop {
        let n = file.read(&mut block)?;
        if n == 0 {
            break;
        }
        hasher.update(&block[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// What registering a copy found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    /// New copy row recorded
    Recorded,
    /// Copy already known, hashes agree
    Matched,
    /// Stored hash disagrees with the freshly computed one; the copy row was
    /// flagged corrupt and the stored hash left untouched
    Mismatch { stored: String, computed: String },
}

/// Register (or re-check) the copy of `file` living at `path` on `host`.
///
/// The hash is computed before any store access so no transaction is held
/// open during file I/O.
pub async fn register_copy(
    db: &MetaDb,
    file: &FileRecord,
    host: &str,
    path: &Path,
) -> Result<(FileCopy, CopyOutcome)> {
    let computed = hash_file(path)?;
    let path_str = path.display().to_string();

    // The file-level content hash is the dedup reference for every copy.
    let stored_hash = match &file.content_hash {
        Some(existing) => existing.clone(),
        None => {
            meta::set_file_hash(db.pool(), &file.id, &computed).await?;
            computed.clone()
        }
    };

    match db.find_copy(&file.id, host, &path_str).await? {
        Some(copy) => {
            let reference = copy.hash.clone().unwrap_or_else(|| stored_hash.clone());
            if reference != computed {
                meta::mark_copy_corrupt(db.pool(), &copy.id).await?;
                warn!(host, path = %path_str, "copy hash mismatch, flagged corrupt");
                let outcome = CopyOutcome::Mismatch {
                    stored: reference,
                    computed,
                };
                let mut copy = copy;
                copy.corrupt = true;
                return Ok((copy, outcome));
            }
            debug!(host, path = %path_str, "copy already recorded");
            Ok((copy, CopyOutcome::Matched))
        }
        None => {
            if stored_hash != computed {
                // First sighting on this host, but the bytes disagree with
                // the content hash recorded from another copy.
                let mut copy = FileCopy::new(
                    file.id.clone(),
                    host.to_string(),
                    path_str.clone(),
                    Some(computed.clone()),
                );
                copy.corrupt = true;
                meta::insert_copy(db.pool(), &copy).await?;
                warn!(host, path = %path_str, "copy disagrees with recorded content hash");
                return Ok((
                    copy,
                    CopyOutcome::Mismatch {
                        stored: stored_hash,
                        computed,
                    },
                ));
            }
            let copy = FileCopy::new(
                file.id.clone(),
                host.to_string(),
                path_str,
                Some(computed),
            );
            meta::insert_copy(db.pool(), &copy).await?;
            Ok((copy, CopyOutcome::Recorded))
        }
    }
}

/// Build the non-fatal `ContentMismatch` report for a flagged copy.
pub fn mismatch_error(copy: &FileCopy, stored: String, computed: String) -> Error {
    Error::ContentMismatch {
        host: copy.host.clone(),
        path: copy.path.clone(),
        stored,
        computed,
    }
}
