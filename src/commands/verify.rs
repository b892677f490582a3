//! Verify command implementation
//!
//! Re-hashes this host's recorded copies and flags divergence. Verification
//! never repairs anything; a corrupt flag is information for the operator.

use crate::config::Config;
use crate::dedup;
use crate::error::Result;
use crate::meta::{self, MetaDb};
use crate::progress::file_progress_bar;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{error, info, warn};

/// Statistics from a verification run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyStats {
    pub copies_checked: i32,
    pub copies_ok: i32,
    pub copies_corrupt: i32,
    pub copies_unreadable: i32,
    pub errors: Vec<String>,
}

/// Re-hash every copy recorded for this host and compare against the stored
/// hashes.
pub async fn cmd_verify(config: &Config, db: &MetaDb) -> Result<VerifyStats> {
    let copies = db.list_host_copies(&config.host).await?;
    info!("Verifying {} copies on {}", copies.len(), config.host);

    let mut stats = VerifyStats::default();
    let pb = file_progress_bar(copies.len() as u64);

    for copy in copies {
        stats.copies_checked += 1;
        pb.set_message(copy.path.clone());

        // Prefer the copy's own hash; fall back to the file's content hash
        // for rows recorded before hashing ran.
        let reference = match &copy.hash {
            Some(hash) => Some(hash.clone()),
            None => db
                .get_file(&copy.file_id)
                .await?
                .and_then(|f| f.content_hash),
        };

        match (reference, dedup::hash_file(Path::new(&copy.path))) {
            (Some(stored), Ok(computed)) if stored == computed => {
                stats.copies_ok += 1;
            }
            (Some(stored), Ok(computed)) => {
                meta::mark_copy_corrupt(db.pool(), &copy.id).await?;
                let report = dedup::mismatch_error(&copy, stored, computed);
                error!("{}", report);
                stats.copies_corrupt += 1;
                stats.errors.push(report.to_string());
            }
            (None, Ok(_)) => {
                // Nothing recorded to compare against
                warn!("No stored hash for copy {} on {}", copy.path, copy.host);
                stats.copies_ok += 1;
            }
            (_, Err(e)) => {
                warn!("Cannot read copy {}: {}", copy.path, e);
                stats.copies_unreadable += 1;
                stats.errors.push(format!("{}: {}", copy.path, e));
            }
        }
        pb.inc(1);
    }

    pb.finish_with_message("done");
    Ok(stats)
}

pub fn print_verify_stats(stats: &VerifyStats) {
    println!("\n✓ Verification complete");
    println!("  Copies checked: {}", stats.copies_checked);
    println!("  Copies ok: {}", stats.copies_ok);
    println!("  Copies corrupt: {}", stats.copies_corrupt);
    println!("  Copies unreadable: {}", stats.copies_unreadable);
    for error in &stats.errors {
        println!("  ! {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::index::index_file;
    use crate::extract::tests::FakeReader;
    use crate::extract::Depth;
    use crate::meta::tests::setup_test_db;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_verify_detects_bitrot() {
        let (db, _dbtmp) = setup_test_db().await;
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.host = "nodea".to_string();
        let reader = FakeReader::with_header();

        let good = tmp.path().join("guppi_55555_3C286_0042_0001.fits");
        let rotting = tmp.path().join("guppi_55555_3C286_0042_0002.fits");
        fs::write(&good, b"stable bytes").unwrap();
        fs::write(&rotting, b"original bytes").unwrap();

        index_file(&config, &db, &reader, &good, Depth::Header).await.unwrap();
        index_file(&config, &db, &reader, &rotting, Depth::Header).await.unwrap();

        let stats = cmd_verify(&config, &db).await.unwrap();
        assert_eq!(stats.copies_checked, 2);
        assert_eq!(stats.copies_ok, 2);
        assert_eq!(stats.copies_corrupt, 0);

        fs::write(&rotting, b"flipped  bytes").unwrap();
        let stats = cmd_verify(&config, &db).await.unwrap();
        assert_eq!(stats.copies_ok, 1);
        assert_eq!(stats.copies_corrupt, 1);
        assert_eq!(db.counts().await.unwrap().corrupt_copies, 1);
    }

    #[tokio::test]
    async fn test_verify_reports_unreadable_copies() {
        let (db, _dbtmp) = setup_test_db().await;
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.host = "nodea".to_string();
        let reader = FakeReader::with_header();

        let path = tmp.path().join("guppi_55555_3C286_0042_0001.fits");
        fs::write(&path, b"bytes").unwrap();
        index_file(&config, &db, &reader, &path, Depth::Header).await.unwrap();

        fs::remove_file(&path).unwrap();
        let stats = cmd_verify(&config, &db).await.unwrap();
        assert_eq!(stats.copies_unreadable, 1);
        assert_eq!(stats.copies_corrupt, 0);
    }
}
