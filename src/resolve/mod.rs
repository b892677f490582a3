//! Resolver / upsert engine
//!
//! Maps an extraction record onto store rows, creating any missing ancestor.
//! Each resolution runs inside one transaction: either every level is
//! matched/created and committed, or none are. Existing rows are never
//! updated, except the pointing/timing fields a full-data pass fills once
//! from NULL; a second differing fill is a consistency error.

use crate::error::{Error, Result};
use crate::extract::{ExtractionRecord, HeaderFields, PointingSummary};
use crate::identity;
use crate::meta::{
    self, Allocation, FileRecord, GuppiFile, MetaDb, Scan, ScanSet, Session, Target,
};
use sqlx::{Sqlite, Transaction};
use std::path::Path;
use tracing::{debug, info};

/// The rows an extraction record resolved to.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub allocation: Allocation,
    pub session: Session,
    pub scan: Scan,
    pub target: Option<Target>,
    pub file: FileRecord,
    pub guppi_file: GuppiFile,
    /// Rows created (rather than matched) by this resolution.
    pub created_rows: usize,
}

impl Resolution {
    /// Identity of the leaf instrument file, e.g. "GBT10B-036.0005.0042.0001".
    pub fn guppi_file_name(&self) -> String {
        identity::guppi_file_name(&self.scan_name(), self.guppi_file.number)
    }

    pub fn scan_name(&self) -> String {
        identity::scan_name(&self.session_name(), self.scan.number)
    }

    pub fn session_name(&self) -> String {
        identity::session_name(&self.allocation.name(), self.session.number)
    }
}

/// Resolve an extraction record, creating missing hierarchy rows.
///
/// Requires at least header depth; a filename-only record carries no
/// ancestry. A concurrent resolver creating the same ancestor surfaces as a
/// uniqueness violation, after which the whole resolution is retried once and
/// falls back to find.
pub async fn resolve_record(db: &MetaDb, record: &ExtractionRecord) -> Result<Resolution> {
    let header = record
        .header
        .as_ref()
        .ok_or_else(|| Error::AncestorResolution {
            path: record.path.clone(),
            reason: "record has no header fields; filename-only extraction cannot be resolved"
                .to_string(),
        })?;

    match try_resolve(db, record, header).await {
        Err(e) if e.is_unique_violation() => {
            debug!(path = %record.path.display(), "lost creation race, retrying as find");
            try_resolve(db, record, header).await
        }
        other => other,
    }
}

async fn try_resolve(
    db: &MetaDb,
    record: &ExtractionRecord,
    header: &HeaderFields,
) -> Result<Resolution> {
    let mut tx = db.begin().await?;
    let mut created_rows = 0;

    let allocation = match meta::find_allocation(
        &mut *tx,
        &header.allocation_term,
        header.allocation_number,
    )
    .await?
    {
        Some(existing) => existing,
        None => {
            let allocation =
                Allocation::new(header.allocation_term.clone(), header.allocation_number);
            meta::insert_allocation(&mut *tx, &allocation).await?;
            created_rows += 1;
            allocation
        }
    };

    let session = match meta::find_session(&mut *tx, &allocation.id, header.session_number).await? {
        Some(existing) => existing,
        None => {
            let session = Session::new(allocation.id.clone(), header.session_number);
            meta::insert_session(&mut *tx, &session).await?;
            created_rows += 1;
            session
        }
    };

    let target = resolve_target(&mut tx, &header.target_name, &mut created_rows).await?;

    let session_name = identity::session_name(&allocation.name(), session.number);
    let scan = match meta::find_scan(&mut *tx, &session.id, record.scan_number).await? {
        Some(mut existing) => {
            if let Some(pointing) = &record.pointing {
                let scan_name = identity::scan_name(&session_name, existing.number);
                if merge_pointing(&mut existing, pointing, &scan_name)? {
                    meta::update_scan_pointing(&mut *tx, &existing).await?;
                }
            }
            if existing.target_id.is_none() {
                if let Some(target) = &target {
                    meta::set_scan_target(&mut *tx, &existing.id, &target.id).await?;
                    existing.target_id = Some(target.id.clone());
                }
            }
            existing
        }
        None => {
            let mut scan = Scan::new(
                session.id.clone(),
                record.scan_number,
                Some(header.mode.clone()),
            );
            scan.target_id = target.as_ref().map(|t| t.id.clone());
            if let Some(pointing) = &record.pointing {
                apply_pointing(&mut scan, pointing);
            }
            meta::insert_scan(&mut *tx, &scan).await?;
            created_rows += 1;
            scan
        }
    };

    let (directory, filename) = split_path(&record.path)?;
    let file = match meta::find_file(&mut *tx, &directory, &filename).await? {
        Some(existing) => existing,
        None => {
            let file = FileRecord::new(filename.clone(), directory.clone());
            meta::insert_file(&mut *tx, &file).await?;
            created_rows += 1;
            file
        }
    };

    let guppi_file = match meta::find_guppi_file(&mut *tx, &scan.id, record.file_number).await? {
        Some(existing) => existing,
        None => {
            let guppi_file = GuppiFile::new(scan.id.clone(), file.id.clone(), record.file_number);
            meta::insert_guppi_file(&mut *tx, &guppi_file).await?;
            created_rows += 1;
            guppi_file
        }
    };

    tx.commit().await?;

    let resolution = Resolution {
        allocation,
        session,
        scan,
        target,
        file,
        guppi_file,
        created_rows,
    };
    debug!(
        leaf = %resolution.guppi_file_name(),
        created = created_rows,
        "resolved {}",
        record.path.display()
    );
    Ok(resolution)
}

/// Best-effort target lookup: exact, case-sensitive name match, created if
/// absent. The instrument header cannot disambiguate sources, so nothing
/// beyond the name is recorded here.
async fn resolve_target(
    tx: &mut Transaction<'_, Sqlite>,
    name: &str,
    created_rows: &mut usize,
) -> Result<Option<Target>> {
    if name.is_empty() {
        return Ok(None);
    }
    match meta::find_target(&mut **tx, name).await? {
        Some(existing) => Ok(Some(existing)),
        None => {
            let target = Target::new(name.to_string(), None, None);
            meta::insert_target(&mut **tx, &target).await?;
            *created_rows += 1;
            Ok(Some(target))
        }
    }
}

fn apply_pointing(scan: &mut Scan, p: &PointingSummary) {
    scan.cadence = Some(p.cadence);
    scan.ra_min = Some(p.ra_min);
    scan.ra_max = Some(p.ra_max);
    scan.dec_min = Some(p.dec_min);
    scan.dec_max = Some(p.dec_max);
    scan.az_min = Some(p.az_min);
    scan.az_max = Some(p.az_max);
    scan.el_min = Some(p.el_min);
    scan.el_max = Some(p.el_max);
    scan.start_time = Some(p.start_time);
    scan.end_time = Some(p.end_time);
}

/// Fill NULL pointing fields from a full-data pass. Populated fields must
/// agree with the new values; a difference means two passes disagreed about
/// the same scan and is reported, never overwritten.
fn merge_pointing(scan: &mut Scan, p: &PointingSummary, scan_name: &str) -> Result<bool> {
    let mut filled = false;
    let fields: [(&'static str, &mut Option<f64>, f64); 11] = [
        ("cadence", &mut scan.cadence, p.cadence),
        ("ra_min", &mut scan.ra_min, p.ra_min),
        ("ra_max", &mut scan.ra_max, p.ra_max),
        ("dec_min", &mut scan.dec_min, p.dec_min),
        ("dec_max", &mut scan.dec_max, p.dec_max),
        ("az_min", &mut scan.az_min, p.az_min),
        ("az_max", &mut scan.az_max, p.az_max),
        ("el_min", &mut scan.el_min, p.el_min),
        ("el_max", &mut scan.el_max, p.el_max),
        ("start_time", &mut scan.start_time, p.start_time),
        ("end_time", &mut scan.end_time, p.end_time),
    ];
    for (field, stored, extracted) in fields {
        match *stored {
            None => {
                *stored = Some(extracted);
                filled = true;
            }
            Some(current) if current != extracted => {
                return Err(Error::MetadataConflict {
                    entity: format!("scan {}", scan_name),
                    field,
                    stored: current.to_string(),
                    extracted: extracted.to_string(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(filled)
}

fn split_path(path: &Path) -> Result<(String, String)> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidPath(path.display().to_string()))?
        .to_string();
    let directory = path
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    Ok((directory, filename))
}

/// Create a scan set under a session.
pub async fn create_scan_set(db: &MetaDb, session_id: &str, kind: &str) -> Result<ScanSet> {
    let scan_set = ScanSet::new(session_id.to_string(), kind.to_string());
    meta::insert_scan_set(db.pool(), &scan_set).await?;
    info!(scan_set = %scan_set.id, kind, "created scan set");
    Ok(scan_set)
}

/// Attach a scan to a scan set.
///
/// Every scan in a set must belong to the set's session; a mismatch is a
/// consistency error, not something to resolve by guessing.
pub async fn attach_scan_to_set(db: &MetaDb, scan_id: &str, scan_set_id: &str) -> Result<()> {
    let scan = meta::get_scan(db.pool(), scan_id)
        .await?
        .ok_or_else(|| Error::Other(format!("no such scan: {}", scan_id)))?;
    let scan_set = db
        .get_scan_set(scan_set_id)
        .await?
        .ok_or_else(|| Error::Other(format!("no such scan set: {}", scan_set_id)))?;

    if scan.session_id != scan_set.session_id {
        let scan_session = session_name_for(db, &scan.session_id).await?;
        let set_session = session_name_for(db, &scan_set.session_id).await?;
        return Err(Error::ScanSetMismatch {
            scan: identity::scan_name(&scan_session, scan.number),
            scan_session,
            set_session,
        });
    }

    meta::set_scan_scan_set(db.pool(), scan_id, scan_set_id).await
}

/// Link a scan to a target by name, creating the target if absent. Used by
/// the auxiliary observing-script pass; never overwrites an existing link.
pub async fn link_scan_target(
    db: &MetaDb,
    scan_id: &str,
    name: &str,
    ra: Option<f64>,
    dec: Option<f64>,
) -> Result<Target> {
    let target = match db.find_target(name).await? {
        Some(existing) => existing,
        None => {
            let target = Target::new(name.to_string(), ra, dec);
            meta::insert_target(db.pool(), &target).await?;
            target
        }
    };

    let scan = meta::get_scan(db.pool(), scan_id)
        .await?
        .ok_or_else(|| Error::Other(format!("no such scan: {}", scan_id)))?;
    if scan.target_id.is_none() {
        meta::set_scan_target(db.pool(), scan_id, &target.id).await?;
    }
    Ok(target)
}

async fn session_name_for(db: &MetaDb, session_id: &str) -> Result<String> {
    let session = meta::get_session(db.pool(), session_id)
        .await?
        .ok_or_else(|| Error::Other(format!("no such session: {}", session_id)))?;
    let allocation = meta::get_allocation(db.pool(), &session.allocation_id)
        .await?
        .ok_or_else(|| Error::Other(format!("no such allocation: {}", session.allocation_id)))?;
    Ok(identity::session_name(&allocation.name(), session.number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::tests::{FakeReader, GOOD_NAME};
    use crate::extract::{extract_full, extract_header};
    use crate::meta::tests::setup_test_db;
    use std::path::PathBuf;

    fn data_path(name: &str) -> PathBuf {
        PathBuf::from("/data/gbt").join(name)
    }

    #[tokio::test]
    async fn test_resolution_creates_full_hierarchy() {
        let (db, _tmp) = setup_test_db().await;
        let reader = FakeReader::with_header();
        let record = extract_full(&reader, &data_path(GOOD_NAME)).unwrap();

        let resolution = resolve_record(&db, &record).await.unwrap();
        assert_eq!(resolution.allocation.name(), "GBT10B-036");
        assert_eq!(resolution.session_name(), "GBT10B-036.0005");
        assert_eq!(resolution.scan_name(), "GBT10B-036.0005.0042");
        assert_eq!(resolution.guppi_file_name(), "GBT10B-036.0005.0042.0001");
        assert_eq!(resolution.scan.mode.as_deref(), Some("RALongMap"));
        assert_eq!(resolution.target.as_ref().unwrap().name, "3C286");
        assert_eq!(resolution.scan.target_id, resolution.target.map(|t| t.id));
        // allocation + session + target + scan + file + guppi file
        assert_eq!(resolution.created_rows, 6);

        let counts = db.counts().await.unwrap();
        assert_eq!(counts.allocations, 1);
        assert_eq!(counts.sessions, 1);
        assert_eq!(counts.scans, 1);
        assert_eq!(counts.files, 1);
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let (db, _tmp) = setup_test_db().await;
        let reader = FakeReader::with_header();
        let record = extract_full(&reader, &data_path(GOOD_NAME)).unwrap();

        let first = resolve_record(&db, &record).await.unwrap();
        let second = resolve_record(&db, &record).await.unwrap();

        assert_eq!(first.guppi_file.id, second.guppi_file.id);
        assert_eq!(first.scan.id, second.scan.id);
        assert_eq!(second.created_rows, 0);

        let counts = db.counts().await.unwrap();
        assert_eq!(counts.allocations, 1);
        assert_eq!(counts.sessions, 1);
        assert_eq!(counts.scans, 1);
        assert_eq!(counts.files, 1);
    }

    #[tokio::test]
    async fn test_two_files_of_one_scan_share_ancestors() {
        let (db, _tmp) = setup_test_db().await;
        let reader = FakeReader::with_header();

        let a = extract_full(&reader, &data_path("guppi_55555_3C286_0042_0001.fits")).unwrap();
        let b = extract_full(&reader, &data_path("guppi_55555_3C286_0042_0002.fits")).unwrap();

        let ra = resolve_record(&db, &a).await.unwrap();
        let rb = resolve_record(&db, &b).await.unwrap();

        assert_eq!(ra.scan.id, rb.scan.id);
        assert_ne!(ra.guppi_file.id, rb.guppi_file.id);
        assert_eq!(ra.guppi_file.number, 1);
        assert_eq!(rb.guppi_file.number, 2);

        let counts = db.counts().await.unwrap();
        assert_eq!(counts.scans, 1);
        assert_eq!(counts.files, 2);
    }

    #[tokio::test]
    async fn test_header_resolution_leaves_pointing_null_then_fills_once() {
        let (db, _tmp) = setup_test_db().await;
        let reader = FakeReader::with_header();
        let path = data_path(GOOD_NAME);

        let shallow = extract_header(&reader, &path).unwrap();
        let resolution = resolve_record(&db, &shallow).await.unwrap();
        assert_eq!(resolution.scan.start_time, None);
        assert_eq!(resolution.scan.cadence, None);

        // Full pass fills the NULL fields on the same scan row
        let deep = extract_full(&reader, &path).unwrap();
        let refilled = resolve_record(&db, &deep).await.unwrap();
        assert_eq!(refilled.scan.id, resolution.scan.id);
        assert!(refilled.scan.start_time.is_some());
        assert_eq!(refilled.scan.cadence, Some(0.001));

        let stored = db
            .find_scan(&refilled.scan.session_id, refilled.scan.number)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.start_time, refilled.scan.start_time);
    }

    #[tokio::test]
    async fn test_differing_refill_is_a_conflict() {
        let (db, _tmp) = setup_test_db().await;
        let reader = FakeReader::with_header();
        let path = data_path(GOOD_NAME);

        let record = extract_full(&reader, &path).unwrap();
        resolve_record(&db, &record).await.unwrap();

        let mut other = FakeReader::with_header();
        other.header.insert("TBIN", "0.002");
        let conflicting = extract_full(&other, &path).unwrap();

        let err = resolve_record(&db, &conflicting).await.unwrap_err();
        assert!(matches!(err, Error::MetadataConflict { field: "cadence", .. }));

        // The stored value was not overwritten
        let resolution = resolve_record(&db, &record).await.unwrap();
        assert_eq!(resolution.scan.cadence, Some(0.001));
    }

    #[tokio::test]
    async fn test_filename_only_record_cannot_resolve() {
        let (db, _tmp) = setup_test_db().await;
        let record = crate::extract::extract_filename(&data_path(GOOD_NAME)).unwrap();
        let err = resolve_record(&db, &record).await.unwrap_err();
        assert!(matches!(err, Error::AncestorResolution { .. }));
        assert_eq!(db.counts().await.unwrap().allocations, 0);
    }

    #[tokio::test]
    async fn test_targets_matched_by_exact_name() {
        let (db, _tmp) = setup_test_db().await;
        let reader = FakeReader::with_header();

        let a = extract_header(&reader, &data_path("guppi_55555_3C286_0042_0001.fits")).unwrap();
        resolve_record(&db, &a).await.unwrap();

        // Same source name in another scan reuses the target row
        let b = extract_header(&reader, &data_path("guppi_55555_3C286_0043_0001.fits")).unwrap();
        resolve_record(&db, &b).await.unwrap();
        assert_eq!(db.counts().await.unwrap().targets, 1);

        // A case variant is a different target
        let mut other = FakeReader::with_header();
        other.header.insert("SRC_NAME", "3c286");
        let c = extract_header(&other, &data_path("guppi_55555_3c286_0044_0001.fits")).unwrap();
        resolve_record(&db, &c).await.unwrap();
        assert_eq!(db.counts().await.unwrap().targets, 2);
    }

    #[tokio::test]
    async fn test_scan_set_attach_validates_session() {
        let (db, _tmp) = setup_test_db().await;
        let reader = FakeReader::with_header();

        let a = extract_header(&reader, &data_path(GOOD_NAME)).unwrap();
        let ra = resolve_record(&db, &a).await.unwrap();

        // Same allocation, different session
        let mut other = FakeReader::with_header();
        other.header.insert("PROJID", "10B_036_06");
        let b = extract_header(&other, &data_path("guppi_55556_3C286_0001_0001.fits")).unwrap();
        let rb = resolve_record(&db, &b).await.unwrap();

        let scan_set = create_scan_set(&db, &ra.session.id, "ralongmap").await.unwrap();
        attach_scan_to_set(&db, &ra.scan.id, &scan_set.id).await.unwrap();

        let err = attach_scan_to_set(&db, &rb.scan.id, &scan_set.id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ScanSetMismatch { .. }));

        // The mismatched scan was left untouched
        let stored = meta::get_scan(db.pool(), &rb.scan.id).await.unwrap().unwrap();
        assert_eq!(stored.scan_set_id, None);
    }

    #[tokio::test]
    async fn test_link_scan_target_never_overwrites() {
        let (db, _tmp) = setup_test_db().await;
        let reader = FakeReader::with_header();
        let record = extract_header(&reader, &data_path(GOOD_NAME)).unwrap();
        let resolution = resolve_record(&db, &record).await.unwrap();
        let original = resolution.scan.target_id.clone().unwrap();

        link_scan_target(&db, &resolution.scan.id, "3C48", Some(24.4), Some(33.2))
            .await
            .unwrap();

        let stored = meta::get_scan(db.pool(), &resolution.scan.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.target_id, Some(original));
        // The new target row still exists for later curation
        assert!(db.find_target("3C48").await.unwrap().is_some());
    }
}
