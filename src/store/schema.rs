//! SQLite schema for the classification import store.
//! All four tables are append-only; rows are never updated or deleted.

use rusqlite::Connection;

use crate::error::ImportError;

pub const SCHEMA_SQL: &str = r#"
-- Sequences: one row per physical read, keyed by its run provenance.
CREATE TABLE IF NOT EXISTS sequences (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sample_id TEXT NOT NULL,
    flow_cell TEXT NOT NULL,
    run_id TEXT NOT NULL,
    barcode TEXT NOT NULL,
    read_id TEXT NOT NULL,
    nucleotides TEXT NOT NULL,
    quality TEXT NOT NULL,
    length INTEGER NOT NULL,
    mean_error_prob REAL NOT NULL,
    UNIQUE(sample_id, flow_cell, run_id, barcode, read_id)
) STRICT;

-- Classifications: one row per (read, classifier program, classifier db).
CREATE TABLE IF NOT EXISTS classifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sequence_id INTEGER NOT NULL REFERENCES sequences(id),
    program TEXT NOT NULL,
    db_name TEXT NOT NULL,
    UNIQUE(sequence_id, program, db_name)
) STRICT;

-- Taxonomy terms, shared across reads. A NULL name is the unclassified
-- taxon; SQLite UNIQUE treats NULLs as distinct, so deduplication of
-- NULL-named rows is enforced by the upsert protocol, not the index.
CREATE TABLE IF NOT EXISTS taxa (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    rank TEXT NOT NULL,
    UNIQUE(name, rank)
) STRICT;

-- Join rows: this classification asserts this taxon. One row per rank of
-- each classification.
CREATE TABLE IF NOT EXISTS taxclass (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    classification_id INTEGER NOT NULL REFERENCES classifications(id),
    taxon_id INTEGER NOT NULL REFERENCES taxa(id),
    UNIQUE(classification_id, taxon_id)
) STRICT;

CREATE INDEX IF NOT EXISTS idx_classifications_sequence
    ON classifications(sequence_id);
CREATE INDEX IF NOT EXISTS idx_taxclass_taxon
    ON taxclass(taxon_id);
"#;

/// Create all tables and indexes if they do not exist.
pub fn init_schema(conn: &Connection) -> Result<(), ImportError> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
