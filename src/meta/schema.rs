//! SQLite schema definition

/// SQL schema for the metadata index
pub const SCHEMA_SQL: &str = r#"
-- Targets: sky sources
CREATE TABLE IF NOT EXISTS targets (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    ra REAL,
    dec REAL,
    created_at TEXT NOT NULL
);

-- Allocations: telescope time grants
CREATE TABLE IF NOT EXISTS allocations (
    id TEXT PRIMARY KEY,
    term TEXT NOT NULL,
    number INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(term, number)
);

-- Sessions: observing nights under an allocation
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    allocation_id TEXT NOT NULL REFERENCES allocations(id),
    number INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(allocation_id, number)
);

-- Scan sets: groups of scans from one observing-script invocation.
-- The session is stored directly; attach-time validation keeps every
-- member scan in that session.
CREATE TABLE IF NOT EXISTS scan_sets (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    kind TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Scans: contiguous series of integrations
CREATE TABLE IF NOT EXISTS scans (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    number INTEGER NOT NULL,
    mode TEXT,
    cadence REAL,
    ra_min REAL,
    ra_max REAL,
    dec_min REAL,
    dec_max REAL,
    az_min REAL,
    az_max REAL,
    el_min REAL,
    el_max REAL,
    start_time REAL,
    end_time REAL,
    target_id TEXT REFERENCES targets(id),
    scan_set_id TEXT REFERENCES scan_sets(id),
    created_at TEXT NOT NULL,
    UNIQUE(session_id, number)
);

-- Files: generic file records, content-addressed once hashed
CREATE TABLE IF NOT EXISTS files (
    id TEXT PRIMARY KEY,
    filename TEXT NOT NULL,
    directory TEXT NOT NULL,
    content_hash TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(directory, filename)
);

-- File copies: one stored instance of a file's bytes at some host/path
CREATE TABLE IF NOT EXISTS file_copies (
    id TEXT PRIMARY KEY,
    file_id TEXT NOT NULL REFERENCES files(id),
    host TEXT NOT NULL,
    path TEXT NOT NULL,
    hash TEXT,
    corrupt INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE(file_id, host, path)
);

-- Instrument files: the scan-membership fact for a file
CREATE TABLE IF NOT EXISTS guppi_files (
    id TEXT PRIMARY KEY,
    scan_id TEXT NOT NULL REFERENCES scans(id),
    file_id TEXT NOT NULL UNIQUE REFERENCES files(id),
    number INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(scan_id, number)
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_sessions_allocation ON sessions(allocation_id);
CREATE INDEX IF NOT EXISTS idx_scans_session ON scans(session_id);
CREATE INDEX IF NOT EXISTS idx_scans_scan_set ON scans(scan_set_id);
CREATE INDEX IF NOT EXISTS idx_files_hash ON files(content_hash);
CREATE INDEX IF NOT EXISTS idx_copies_file ON file_copies(file_id);
CREATE INDEX IF NOT EXISTS idx_copies_host ON file_copies(host);
CREATE INDEX IF NOT EXISTS idx_guppi_files_scan ON guppi_files(scan_id);
"#;
