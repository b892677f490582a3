//! Metadata storage using SQLite
//!
//! This module holds the entity row types for the observation hierarchy
//! (allocation -> session -> scan set -> scan -> instrument file) and the
//! content-addressed file/copy model, plus the [`MetaDb`] connection handle.
//!
//! Rows are created only through the resolver (`crate::resolve`); the query
//! functions here are generic over an executor so the resolver can run a
//! whole multi-level resolution inside one transaction.

mod schema;

pub use schema::*;

use crate::config::Config;
use crate::error::Result;
use crate::identity;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// A sky source
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub name: String,
    pub ra: Option<f64>,
    pub dec: Option<f64>,
    pub created_at: String,
}

impl Target {
    pub fn new(name: String, ra: Option<f64>, dec: Option<f64>) -> Self {
        Self {
            id: new_id(),
            name,
            ra,
            dec,
            created_at: now(),
        }
    }
}

/// A telescope time grant
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Allocation {
    pub id: String,
    pub term: String,
    pub number: i64,
    pub created_at: String,
}

impl Allocation {
    pub fn new(term: String, number: i64) -> Self {
        Self {
            id: new_id(),
            term,
            number,
            created_at: now(),
        }
    }

    /// Derived name, e.g. "GBT10B-036".
    pub fn name(&self) -> String {
        identity::allocation_name(&self.term, self.number)
    }
}

/// One observing session under an allocation
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub allocation_id: String,
    pub number: i64,
    pub created_at: String,
}

impl Session {
    pub fn new(allocation_id: String, number: i64) -> Self {
        Self {
            id: new_id(),
            allocation_id,
            number,
            created_at: now(),
        }
    }
}

/// A group of scans issued by one observing-script invocation
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ScanSet {
    pub id: String,
    pub session_id: String,
    pub kind: String,
    pub created_at: String,
}

impl ScanSet {
    pub fn new(session_id: String, kind: String) -> Self {
        Self {
            id: new_id(),
            session_id,
            kind,
            created_at: now(),
        }
    }
}

/// A contiguous series of integrations
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Scan {
    pub id: String,
    pub session_id: String,
    pub number: i64,
    pub mode: Option<String>,
    pub cadence: Option<f64>,
    pub ra_min: Option<f64>,
    pub ra_max: Option<f64>,
    pub dec_min: Option<f64>,
    pub dec_max: Option<f64>,
    pub az_min: Option<f64>,
    pub az_max: Option<f64>,
    pub el_min: Option<f64>,
    pub el_max: Option<f64>,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub target_id: Option<String>,
    pub scan_set_id: Option<String>,
    pub created_at: String,
}

impl Scan {
    pub fn new(session_id: String, number: i64, mode: Option<String>) -> Self {
        Self {
            id: new_id(),
            session_id,
            number,
            mode,
            cadence: None,
            ra_min: None,
            ra_max: None,
            dec_min: None,
            dec_max: None,
            az_min: None,
            az_max: None,
            el_min: None,
            el_max: None,
            start_time: None,
            end_time: None,
            target_id: None,
            scan_set_id: None,
            created_at: now(),
        }
    }
}

/// A generic file record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub filename: String,
    pub directory: String,
    pub content_hash: Option<String>,
    pub created_at: String,
}

impl FileRecord {
    pub fn new(filename: String, directory: String) -> Self {
        Self {
            id: new_id(),
            filename,
            directory,
            content_hash: None,
            created_at: now(),
        }
    }
}

/// One stored copy of a file's bytes
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FileCopy {
    pub id: String,
    pub file_id: String,
    pub host: String,
    pub path: String,
    pub hash: Option<String>,
    pub corrupt: bool,
    pub created_at: String,
}

impl FileCopy {
    pub fn new(file_id: String, host: String, path: String, hash: Option<String>) -> Self {
        Self {
            id: new_id(),
            file_id,
            host,
            path,
            hash,
            corrupt: false,
            created_at: now(),
        }
    }
}

/// The scan-membership fact for an instrument-data file
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GuppiFile {
    pub id: String,
    pub scan_id: String,
    pub file_id: String,
    pub number: i64,
    pub created_at: String,
}

impl GuppiFile {
    pub fn new(scan_id: String, file_id: String, number: i64) -> Self {
        Self {
            id: new_id(),
            scan_id,
            file_id,
            number,
            created_at: now(),
        }
    }
}

// ===== Executor-generic queries =====
//
// The resolver calls these with `&mut *tx` so a whole resolution commits or
// rolls back as a unit; pool-level wrappers on MetaDb serve everything else.

pub async fn find_allocation<'e, E>(executor: E, term: &str, number: i64) -> Result<Option<Allocation>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_as::<_, Allocation>("SELECT * FROM allocations WHERE term = ? AND number = ?")
            .bind(term)
            .bind(number)
            .fetch_optional(executor)
            .await?,
    )
}

pub async fn insert_allocation<'e, E>(executor: E, allocation: &Allocation) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("INSERT INTO allocations (id, term, number, created_at) VALUES (?, ?, ?, ?)")
        .bind(&allocation.id)
        .bind(&allocation.term)
        .bind(allocation.number)
        .bind(&allocation.created_at)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn get_allocation<'e, E>(executor: E, id: &str) -> Result<Option<Allocation>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, Allocation>("SELECT * FROM allocations WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?)
}

pub async fn get_session<'e, E>(executor: E, id: &str) -> Result<Option<Session>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?)
}

pub async fn get_scan<'e, E>(executor: E, id: &str) -> Result<Option<Scan>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, Scan>("SELECT * FROM scans WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?)
}

pub async fn find_session<'e, E>(
    executor: E,
    allocation_id: &str,
    number: i64,
) -> Result<Option<Session>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, Session>(
        "SELECT * FROM sessions WHERE allocation_id = ? AND number = ?",
    )
    .bind(allocation_id)
    .bind(number)
    .fetch_optional(executor)
    .await?)
}

pub async fn insert_session<'e, E>(executor: E, session: &Session) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("INSERT INTO sessions (id, allocation_id, number, created_at) VALUES (?, ?, ?, ?)")
        .bind(&session.id)
        .bind(&session.allocation_id)
        .bind(session.number)
        .bind(&session.created_at)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn find_scan<'e, E>(executor: E, session_id: &str, number: i64) -> Result<Option<Scan>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_as::<_, Scan>("SELECT * FROM scans WHERE session_id = ? AND number = ?")
            .bind(session_id)
            .bind(number)
            .fetch_optional(executor)
            .await?,
    )
}

pub async fn insert_scan<'e, E>(executor: E, scan: &Scan) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO scans (
            id, session_id, number, mode, cadence,
            ra_min, ra_max, dec_min, dec_max, az_min, az_max, el_min, el_max,
            start_time, end_time, target_id, scan_set_id, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&scan.id)
    .bind(&scan.session_id)
    .bind(scan.number)
    .bind(&scan.mode)
    .bind(scan.cadence)
    .bind(scan.ra_min)
    .bind(scan.ra_max)
    .bind(scan.dec_min)
    .bind(scan.dec_max)
    .bind(scan.az_min)
    .bind(scan.az_max)
    .bind(scan.el_min)
    .bind(scan.el_max)
    .bind(scan.start_time)
    .bind(scan.end_time)
    .bind(&scan.target_id)
    .bind(&scan.scan_set_id)
    .bind(&scan.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Persist the fields filled by a full-data pass.
pub async fn update_scan_pointing<'e, E>(executor: E, scan: &Scan) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE scans SET
            cadence = ?,
            ra_min = ?, ra_max = ?, dec_min = ?, dec_max = ?,
            az_min = ?, az_max = ?, el_min = ?, el_max = ?,
            start_time = ?, end_time = ?
        WHERE id = ?
        "#,
    )
    .bind(scan.cadence)
    .bind(scan.ra_min)
    .bind(scan.ra_max)
    .bind(scan.dec_min)
    .bind(scan.dec_max)
    .bind(scan.az_min)
    .bind(scan.az_max)
    .bind(scan.el_min)
    .bind(scan.el_max)
    .bind(scan.start_time)
    .bind(scan.end_time)
    .bind(&scan.id)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn set_scan_target<'e, E>(executor: E, scan_id: &str, target_id: &str) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE scans SET target_id = ? WHERE id = ?")
        .bind(target_id)
        .bind(scan_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn set_scan_scan_set<'e, E>(executor: E, scan_id: &str, scan_set_id: &str) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE scans SET scan_set_id = ? WHERE id = ?")
        .bind(scan_set_id)
        .bind(scan_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn find_target<'e, E>(executor: E, name: &str) -> Result<Option<Target>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, Target>("SELECT * FROM targets WHERE name = ?")
        .bind(name)
        .fetch_optional(executor)
        .await?)
}

pub async fn insert_target<'e, E>(executor: E, target: &Target) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("INSERT INTO targets (id, name, ra, dec, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(&target.id)
        .bind(&target.name)
        .bind(target.ra)
        .bind(target.dec)
        .bind(&target.created_at)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn get_scan_set<'e, E>(executor: E, id: &str) -> Result<Option<ScanSet>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, ScanSet>("SELECT * FROM scan_sets WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?)
}

pub async fn insert_scan_set<'e, E>(executor: E, scan_set: &ScanSet) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("INSERT INTO scan_sets (id, session_id, kind, created_at) VALUES (?, ?, ?, ?)")
        .bind(&scan_set.id)
        .bind(&scan_set.session_id)
        .bind(&scan_set.kind)
        .bind(&scan_set.created_at)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn find_file<'e, E>(
    executor: E,
    directory: &str,
    filename: &str,
) -> Result<Option<FileRecord>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, FileRecord>(
        "SELECT * FROM files WHERE directory = ? AND filename = ?",
    )
    .bind(directory)
    .bind(filename)
    .fetch_optional(executor)
    .await?)
}

pub async fn get_file<'e, E>(executor: E, id: &str) -> Result<Option<FileRecord>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, FileRecord>("SELECT * FROM files WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?)
}

pub async fn insert_file<'e, E>(executor: E, file: &FileRecord) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO files (id, filename, directory, content_hash, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&file.id)
    .bind(&file.filename)
    .bind(&file.directory)
    .bind(&file.content_hash)
    .bind(&file.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Set a file's content hash. Only fills; the resolver guards transitions.
pub async fn set_file_hash<'e, E>(executor: E, file_id: &str, hash: &str) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE files SET content_hash = ? WHERE id = ?")
        .bind(hash)
        .bind(file_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn find_guppi_file<'e, E>(
    executor: E,
    scan_id: &str,
    number: i64,
) -> Result<Option<GuppiFile>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, GuppiFile>(
        "SELECT * FROM guppi_files WHERE scan_id = ? AND number = ?",
    )
    .bind(scan_id)
    .bind(number)
    .fetch_optional(executor)
    .await?)
}

pub async fn insert_guppi_file<'e, E>(executor: E, guppi_file: &GuppiFile) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO guppi_files (id, scan_id, file_id, number, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&guppi_file.id)
    .bind(&guppi_file.scan_id)
    .bind(&guppi_file.file_id)
    .bind(guppi_file.number)
    .bind(&guppi_file.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn find_copy<'e, E>(
    executor: E,
    file_id: &str,
    host: &str,
    path: &str,
) -> Result<Option<FileCopy>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, FileCopy>(
        "SELECT * FROM file_copies WHERE file_id = ? AND host = ? AND path = ?",
    )
    .bind(file_id)
    .bind(host)
    .bind(path)
    .fetch_optional(executor)
    .await?)
}

pub async fn insert_copy<'e, E>(executor: E, copy: &FileCopy) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO file_copies (id, file_id, host, path, hash, corrupt, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&copy.id)
    .bind(&copy.file_id)
    .bind(&copy.host)
    .bind(&copy.path)
    .bind(&copy.hash)
    .bind(copy.corrupt)
    .bind(&copy.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn mark_copy_corrupt<'e, E>(executor: E, copy_id: &str) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE file_copies SET corrupt = 1 WHERE id = ?")
        .bind(copy_id)
        .execute(executor)
        .await?;
    Ok(())
}

// ===== Connection handle =====

/// Metadata database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Connect to the metadata database named by the config.
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::new(&config.paths.db_file).await
    }

    /// Open (or create) the database at a path and ensure the schema exists.
    ///
    /// Safe to call repeatedly: the schema uses CREATE TABLE IF NOT EXISTS
    /// and never touches existing rows.
    pub async fn new(db_path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Ensuring database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='allocations'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a transaction for a multi-level resolution.
    pub async fn begin(&self) -> Result<Transaction<'_, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    // ===== Pool-level wrappers =====

    pub async fn find_allocation(&self, term: &str, number: i64) -> Result<Option<Allocation>> {
        find_allocation(&self.pool, term, number).await
    }

    pub async fn find_session(&self, allocation_id: &str, number: i64) -> Result<Option<Session>> {
        find_session(&self.pool, allocation_id, number).await
    }

    pub async fn find_scan(&self, session_id: &str, number: i64) -> Result<Option<Scan>> {
        find_scan(&self.pool, session_id, number).await
    }

    pub async fn find_guppi_file(&self, scan_id: &str, number: i64) -> Result<Option<GuppiFile>> {
        find_guppi_file(&self.pool, scan_id, number).await
    }

    pub async fn find_file(&self, directory: &str, filename: &str) -> Result<Option<FileRecord>> {
        find_file(&self.pool, directory, filename).await
    }

    pub async fn get_file(&self, id: &str) -> Result<Option<FileRecord>> {
        get_file(&self.pool, id).await
    }

    pub async fn find_target(&self, name: &str) -> Result<Option<Target>> {
        find_target(&self.pool, name).await
    }

    pub async fn find_copy(&self, file_id: &str, host: &str, path: &str) -> Result<Option<FileCopy>> {
        find_copy(&self.pool, file_id, host, path).await
    }

    pub async fn get_scan_set(&self, id: &str) -> Result<Option<ScanSet>> {
        get_scan_set(&self.pool, id).await
    }

    /// Copies recorded for one host, for integrity re-checks.
    pub async fn list_host_copies(&self, host: &str) -> Result<Vec<FileCopy>> {
        Ok(
            sqlx::query_as::<_, FileCopy>("SELECT * FROM file_copies WHERE host = ? ORDER BY path")
                .bind(host)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn list_scans(&self, session_id: &str) -> Result<Vec<Scan>> {
        Ok(
            sqlx::query_as::<_, Scan>("SELECT * FROM scans WHERE session_id = ? ORDER BY number")
                .bind(session_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    /// Row counts across the whole index
    pub async fn counts(&self) -> Result<IndexCounts> {
        async fn count(pool: &SqlitePool, sql: &str) -> Result<usize> {
            let n: i64 = sqlx::query_scalar(sql).fetch_one(pool).await?;
            Ok(n as usize)
        }

        Ok(IndexCounts {
            allocations: count(&self.pool, "SELECT COUNT(*) FROM allocations").await?,
            sessions: count(&self.pool, "SELECT COUNT(*) FROM sessions").await?,
            scan_sets: count(&self.pool, "SELECT COUNT(*) FROM scan_sets").await?,
            scans: count(&self.pool, "SELECT COUNT(*) FROM scans").await?,
            targets: count(&self.pool, "SELECT COUNT(*) FROM targets").await?,
            files: count(&self.pool, "SELECT COUNT(*) FROM files").await?,
            copies: count(&self.pool, "SELECT COUNT(*) FROM file_copies").await?,
            corrupt_copies: count(
                &self.pool,
                "SELECT COUNT(*) FROM file_copies WHERE corrupt = 1",
            )
            .await?,
        })
    }

    /// Allocations with session/scan counts, for reporting.
    pub async fn allocation_summaries(&self) -> Result<Vec<AllocationSummary>> {
        let rows = sqlx::query_as::<_, AllocationCounts>(
            r#"
            SELECT a.term, a.number,
                   COUNT(DISTINCT s.id) AS session_count,
                   COUNT(sc.id) AS scan_count
            FROM allocations a
            LEFT JOIN sessions s ON s.allocation_id = a.id
            LEFT JOIN scans sc ON sc.session_id = s.id
            GROUP BY a.id
            ORDER BY a.term, a.number
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| AllocationSummary {
                name: identity::allocation_name(&r.term, r.number),
                term: r.term,
                number: r.number,
                session_count: r.session_count as usize,
                scan_count: r.scan_count as usize,
            })
            .collect())
    }
}

#[derive(FromRow)]
struct AllocationCounts {
    term: String,
    number: i64,
    session_count: i64,
    scan_count: i64,
}

/// Row counts across the whole index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexCounts {
    pub allocations: usize,
    pub sessions: usize,
    pub scan_sets: usize,
    pub scans: usize,
    pub targets: usize,
    pub files: usize,
    pub copies: usize,
    pub corrupt_copies: usize,
}

/// An allocation with aggregate counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationSummary {
    pub name: String,
    pub term: String,
    pub number: i64,
    pub session_count: usize,
    pub scan_count: usize,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) async fn setup_test_db() -> (MetaDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::new(&tmp.path().join("test.db")).await.unwrap();
        (db, tmp)
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.db");

        let db = MetaDb::new(&path).await.unwrap();
        assert!(db.is_initialized().await.unwrap());
        let allocation = Allocation::new("10B".to_string(), 36);
        insert_allocation(db.pool(), &allocation).await.unwrap();
        drop(db);

        // Reopening must keep the rows
        let db = MetaDb::new(&path).await.unwrap();
        let found = db.find_allocation("10B", 36).await.unwrap().unwrap();
        assert_eq!(found.id, allocation.id);
        assert_eq!(db.counts().await.unwrap().allocations, 1);
    }

    #[tokio::test]
    async fn test_allocation_uniqueness_enforced() {
        let (db, _tmp) = setup_test_db().await;

        insert_allocation(db.pool(), &Allocation::new("10B".to_string(), 36))
            .await
            .unwrap();
        let err = insert_allocation(db.pool(), &Allocation::new("10B".to_string(), 36))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());

        // A different number under the same term is fine
        insert_allocation(db.pool(), &Allocation::new("10B".to_string(), 37))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_scan_roundtrip_preserves_nullables() {
        let (db, _tmp) = setup_test_db().await;

        let allocation = Allocation::new("10B".to_string(), 36);
        insert_allocation(db.pool(), &allocation).await.unwrap();
        let session = Session::new(allocation.id.clone(), 5);
        insert_session(db.pool(), &session).await.unwrap();

        let mut scan = Scan::new(session.id.clone(), 42, Some("RALongMap".to_string()));
        scan.cadence = Some(0.001);
        insert_scan(db.pool(), &scan).await.unwrap();

        let loaded = db.find_scan(&session.id, 42).await.unwrap().unwrap();
        assert_eq!(loaded.mode.as_deref(), Some("RALongMap"));
        assert_eq!(loaded.cadence, Some(0.001));
        assert_eq!(loaded.ra_min, None);
        assert_eq!(loaded.start_time, None);
    }

    #[tokio::test]
    async fn test_copy_unique_per_file_host_path() {
        let (db, _tmp) = setup_test_db().await;

        let file = FileRecord::new("a.fits".to_string(), "/data".to_string());
        insert_file(db.pool(), &file).await.unwrap();

        let copy = FileCopy::new(
            file.id.clone(),
            "nodea".to_string(),
            "/data/a.fits".to_string(),
            Some("abc".to_string()),
        );
        insert_copy(db.pool(), &copy).await.unwrap();

        let dup = FileCopy::new(
            file.id.clone(),
            "nodea".to_string(),
            "/data/a.fits".to_string(),
            None,
        );
        assert!(insert_copy(db.pool(), &dup).await.unwrap_err().is_unique_violation());

        // Same path on another host is a distinct copy
        let other = FileCopy::new(
            file.id.clone(),
            "nodeb".to_string(),
            "/data/a.fits".to_string(),
            None,
        );
        insert_copy(db.pool(), &other).await.unwrap();

        let copies = db.list_host_copies("nodea").await.unwrap();
        assert_eq!(copies.len(), 1);
        assert!(!copies[0].corrupt);
    }

    #[tokio::test]
    async fn test_allocation_summaries_aggregate() {
        let (db, _tmp) = setup_test_db().await;

        let allocation = Allocation::new("10B".to_string(), 36);
        insert_allocation(db.pool(), &allocation).await.unwrap();
        for n in 1..=2 {
            let session = Session::new(allocation.id.clone(), n);
            insert_session(db.pool(), &session).await.unwrap();
            for m in 1..=3 {
                insert_scan(db.pool(), &Scan::new(session.id.clone(), m, None))
                    .await
                    .unwrap();
            }
        }

        let summaries = db.allocation_summaries().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].name, "GBT10B-036");
        assert_eq!(summaries[0].session_count, 2);
        assert_eq!(summaries[0].scan_count, 6);
    }
}
