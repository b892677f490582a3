//! Index command implementation
//!
//! One file moves through extract -> resolve -> dedup; a run walks its input
//! paths and applies that pipeline per file, collecting failures into stats
//! rather than aborting the run.

use crate::config::Config;
use crate::dedup::{self, CopyOutcome};
use crate::error::Result;
use crate::extract::{extract, filename_matches, Depth, ExtractionRecord};
use crate::meta::{FileCopy, MetaDb};
use crate::progress::file_progress_bar;
use crate::raw::RawReader;
use crate::resolve::{resolve_record, Resolution};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

/// Statistics from an indexing run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub files_indexed: i32,
    pub files_failed: i32,
    pub rows_created: i32,
    pub copies_recorded: i32,
    pub copies_matched: i32,
    pub copies_corrupt: i32,
    pub errors: Vec<String>,
}

/// Everything one file resolved to. The record keeps the parsed header so a
/// downstream bulk-data reader can be handed (path, header) without
/// re-reading the file.
#[derive(Debug)]
pub struct IndexedFile {
    pub record: ExtractionRecord,
    pub resolution: Resolution,
    pub copy: FileCopy,
    pub outcome: CopyOutcome,
}

/// Run the full pipeline on a single raw file.
pub async fn index_file<R: RawReader + ?Sized>(
    config: &Config,
    db: &MetaDb,
    reader: &R,
    path: &Path,
    depth: Depth,
) -> Result<IndexedFile> {
    let record = extract(reader, path, depth)?;
    let resolution = resolve_record(db, &record).await?;
    let (copy, outcome) = dedup::register_copy(db, &resolution.file, &config.host, path).await?;

    if let CopyOutcome::Mismatch { stored, computed } = &outcome {
        // Surfaced but non-fatal; the copy row is already flagged corrupt.
        error!(
            "{}",
            dedup::mismatch_error(&copy, stored.clone(), computed.clone())
        );
    }

    Ok(IndexedFile {
        record,
        resolution,
        copy,
        outcome,
    })
}

/// Index every instrument file under the given paths.
pub async fn cmd_index<R: RawReader + ?Sized>(
    config: &Config,
    db: &MetaDb,
    reader: &R,
    paths: &[PathBuf],
    depth: Depth,
) -> Result<IndexStats> {
    let files = collect_input_files(paths);
    info!("Indexing {} file(s) at {:?} depth", files.len(), depth);

    let mut stats = IndexStats::default();
    let pb = file_progress_bar(files.len() as u64);

    for path in files {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            pb.set_message(name.to_string());
        }

        match index_file(config, db, reader, &path, depth).await {
            Ok(indexed) => {
                stats.files_indexed += 1;
                stats.rows_created += indexed.resolution.created_rows as i32;
                match indexed.outcome {
                    CopyOutcome::Recorded => stats.copies_recorded += 1,
                    CopyOutcome::Matched => stats.copies_matched += 1,
                    CopyOutcome::Mismatch { .. } => stats.copies_corrupt += 1,
                }
            }
            Err(e) => {
                warn!("Failed to index {}: {}", path.display(), e);
                stats.files_failed += 1;
                stats.errors.push(format!("{}: {}", path.display(), e));
            }
        }
        pb.inc(1);
    }

    pb.finish_with_message("done");
    Ok(stats)
}

/// Expand the input paths: directories are walked for matching instrument
/// filenames; explicit file arguments are taken as-is so a bad name still
/// surfaces its MalformedFilename error.
fn collect_input_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_file() && filename_matches(entry.path()) {
                    files.push(entry.path().to_path_buf());
                }
            }
        } else {
            files.push(path.clone());
        }
    }
    files
}

pub fn print_index_stats(stats: &IndexStats) {
    println!("\n✓ Indexing complete");
    println!("  Files indexed: {}", stats.files_indexed);
    println!("  Files failed: {}", stats.files_failed);
    println!("  Rows created: {}", stats.rows_created);
    println!("  Copies recorded: {}", stats.copies_recorded);
    println!("  Copies matched: {}", stats.copies_matched);
    if stats.copies_corrupt > 0 {
        println!("  Copies flagged corrupt: {}", stats.copies_corrupt);
    }
    for error in &stats.errors {
        println!("  ! {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::tests::FakeReader;
    use crate::meta::tests::setup_test_db;
    use std::fs;
    use tempfile::TempDir;

    fn test_config(host: &str) -> Config {
        let mut config = Config::default();
        config.host = host.to_string();
        config
    }

    #[tokio::test]
    async fn test_index_directory_end_to_end() {
        let (db, _dbtmp) = setup_test_db().await;
        let tmp = TempDir::new().unwrap();
        let config = test_config("nodea");
        let reader = FakeReader::with_header();

        for name in [
            "guppi_55555_3C286_0042_0001.fits",
            "guppi_55555_3C286_0042_0002.fits",
            "guppi_55555_3C286_0043_0001.fits",
            "notes.txt",
        ] {
            fs::write(tmp.path().join(name), name.as_bytes()).unwrap();
        }

        let stats = cmd_index(
            &config,
            &db,
            &reader,
            &[tmp.path().to_path_buf()],
            Depth::Full,
        )
        .await
        .unwrap();

        assert_eq!(stats.files_indexed, 3);
        assert_eq!(stats.files_failed, 0);
        assert_eq!(stats.copies_recorded, 3);

        let counts = db.counts().await.unwrap();
        assert_eq!(counts.allocations, 1);
        assert_eq!(counts.sessions, 1);
        assert_eq!(counts.scans, 2);
        assert_eq!(counts.files, 3);
        assert_eq!(counts.copies, 3);
        assert_eq!(counts.corrupt_copies, 0);
    }

    #[tokio::test]
    async fn test_reindex_is_idempotent() {
        let (db, _dbtmp) = setup_test_db().await;
        let tmp = TempDir::new().unwrap();
        let config = test_config("nodea");
        let reader = FakeReader::with_header();

        let name = "guppi_55555_3C286_0042_0001.fits";
        fs::write(tmp.path().join(name), b"payload").unwrap();
        let paths = [tmp.path().to_path_buf()];

        cmd_index(&config, &db, &reader, &paths, Depth::Full).await.unwrap();
        let stats = cmd_index(&config, &db, &reader, &paths, Depth::Full).await.unwrap();

        assert_eq!(stats.files_indexed, 1);
        assert_eq!(stats.rows_created, 0);
        assert_eq!(stats.copies_matched, 1);
        assert_eq!(db.counts().await.unwrap().copies, 1);
    }

    #[tokio::test]
    async fn test_bad_explicit_file_collected_as_error() {
        let (db, _dbtmp) = setup_test_db().await;
        let tmp = TempDir::new().unwrap();
        let config = test_config("nodea");
        let reader = FakeReader::with_header();

        let bad = tmp.path().join("not_an_instrument_file.dat");
        fs::write(&bad, b"junk").unwrap();

        let stats = cmd_index(&config, &db, &reader, &[bad], Depth::Header)
            .await
            .unwrap();
        assert_eq!(stats.files_indexed, 0);
        assert_eq!(stats.files_failed, 1);
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].contains("Malformed filename"));
    }
}
