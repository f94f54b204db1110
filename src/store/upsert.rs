//! The shared insert-if-absent protocol: batched natural-key lookup,
//! insertion of missing rows inside the caller's transaction, and a
//! running any-new-row flag folded across calls.
//!
//! Lookups `IS`-match every key column so the NULL-named taxon
//! deduplicates like any other key. No row is ever updated.

use std::hash::Hash;

use ahash::{AHashMap, AHashSet};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Row, Transaction};

use crate::error::ImportError;
use crate::fastq::FastqRecord;
use crate::types::{
    ClassificationKey, ReadId, RunInfo, SequenceKey, TaxclassKey, Taxon, TaxonKey,
};

use super::BatchConfig;

/// One entity under the upsert protocol: a table, its natural-key columns,
/// and how to bind, recover and insert a candidate row.
pub(crate) trait UpsertRow {
    type Key: Eq + Hash + Clone;

    const TABLE: &'static str;
    const KEY_COLUMNS: &'static [&'static str];

    fn key(&self) -> Self::Key;
    fn bind_key(key: &Self::Key, out: &mut Vec<Value>);
    fn key_from_row(row: &Row<'_>) -> rusqlite::Result<Self::Key>;
    fn insert(&self, tx: &Transaction) -> rusqlite::Result<i64>;
}

/// Fetch row ids for every key that already exists, chunked so one
/// statement never matches more than `max_in_clause` keys.
fn lookup_existing<R: UpsertRow>(
    tx: &Transaction,
    keys: &[R::Key],
    cfg: &BatchConfig,
) -> Result<AHashMap<R::Key, i64>, ImportError> {
    let mut found = AHashMap::with_capacity(keys.len());
    let tuple = format!(
        "({})",
        R::KEY_COLUMNS
            .iter()
            .map(|c| format!("{c} IS ?"))
            .collect::<Vec<_>>()
            .join(" AND ")
    );

    for chunk in keys.chunks(cfg.max_in_clause()) {
        let clause = vec![tuple.as_str(); chunk.len()].join(" OR ");
        let sql = format!(
            "SELECT id, {} FROM {} WHERE {}",
            R::KEY_COLUMNS.join(", "),
            R::TABLE,
            clause
        );
        let mut binds: Vec<Value> = Vec::with_capacity(chunk.len() * R::KEY_COLUMNS.len());
        for key in chunk {
            R::bind_key(key, &mut binds);
        }

        let mut stmt = tx.prepare_cached(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            found.insert(R::key_from_row(row)?, id);
        }
    }
    Ok(found)
}

/// Insert-if-absent over a batch of candidate rows. Returns the
/// key → row-id map and the folded `is_new` flag; existing rows are reused
/// untouched. Empty input is a no-op with `is_new` unchanged.
pub(crate) fn upsert_rows<R: UpsertRow>(
    tx: &Transaction,
    rows: &[R],
    cfg: &BatchConfig,
    is_new: bool,
) -> Result<(AHashMap<R::Key, i64>, bool), ImportError> {
    if rows.is_empty() {
        return Ok((AHashMap::new(), is_new));
    }

    // Deduplicate candidates; the first row for a key supplies its
    // attributes.
    let mut seen: AHashSet<R::Key> = AHashSet::with_capacity(rows.len());
    let mut unique: Vec<&R> = Vec::with_capacity(rows.len());
    for row in rows {
        if seen.insert(row.key()) {
            unique.push(row);
        }
    }

    let keys: Vec<R::Key> = unique.iter().map(|r| r.key()).collect();
    let mut map = lookup_existing::<R>(tx, &keys, cfg)?;

    let mut inserted = 0usize;
    for row in unique {
        let key = row.key();
        if map.contains_key(&key) {
            continue;
        }
        let id = row.insert(tx)?;
        map.insert(key, id);
        inserted += 1;
    }
    if inserted > 0 {
        log::debug!("{}: inserted {inserted} new row(s)", R::TABLE);
    }

    Ok((map, is_new || inserted > 0))
}

// ---------------------------------------------------------------------------
//  Sequences
// ---------------------------------------------------------------------------

struct SequenceRow {
    key: SequenceKey,
    nucleotides: String,
    quality: String,
}

impl UpsertRow for SequenceRow {
    type Key = SequenceKey;

    const TABLE: &'static str = "sequences";
    const KEY_COLUMNS: &'static [&'static str] =
        &["sample_id", "flow_cell", "run_id", "barcode", "read_id"];

    fn key(&self) -> SequenceKey {
        self.key.clone()
    }

    fn bind_key(key: &SequenceKey, out: &mut Vec<Value>) {
        out.push(Value::Text(key.sample.clone()));
        out.push(Value::Text(key.flow_cell.clone()));
        out.push(Value::Text(key.run_id.clone()));
        out.push(Value::Text(key.barcode.clone()));
        out.push(Value::Text(key.read_id.clone()));
    }

    fn key_from_row(row: &Row<'_>) -> rusqlite::Result<SequenceKey> {
        Ok(SequenceKey {
            sample: row.get(1)?,
            flow_cell: row.get(2)?,
            run_id: row.get(3)?,
            barcode: row.get(4)?,
            read_id: row.get(5)?,
        })
    }

    fn insert(&self, tx: &Transaction) -> rusqlite::Result<i64> {
        tx.execute(
            "INSERT INTO sequences
                (sample_id, flow_cell, run_id, barcode, read_id,
                 nucleotides, quality, length, mean_error_prob)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                self.key.sample,
                self.key.flow_cell,
                self.key.run_id,
                self.key.barcode,
                self.key.read_id,
                self.nucleotides,
                self.quality,
                self.nucleotides.len() as i64,
                crate::fastq::mean_error_prob(&self.quality),
            ],
        )?;
        Ok(tx.last_insert_rowid())
    }
}

/// Upsert one sample's reads. Returns read id → sequence row id, the
/// structure later supplied to classification import as sequence keys.
pub fn upsert_sequences(
    tx: &Transaction,
    sample: &str,
    run: &RunInfo,
    records: &[FastqRecord],
    cfg: &BatchConfig,
    is_new: bool,
) -> Result<(AHashMap<ReadId, i64>, bool), ImportError> {
    let rows: Vec<SequenceRow> = records
        .iter()
        .map(|r| SequenceRow {
            key: SequenceKey {
                sample: sample.to_string(),
                flow_cell: run.flow_cell.clone(),
                run_id: run.run_id.clone(),
                barcode: run.barcode.clone(),
                read_id: r.id.clone(),
            },
            nucleotides: r.seq.clone(),
            quality: r.quals.clone(),
        })
        .collect();

    let (map, is_new) = upsert_rows(tx, &rows, cfg, is_new)?;
    Ok((map.into_iter().map(|(k, v)| (k.read_id, v)).collect(), is_new))
}

// ---------------------------------------------------------------------------
//  Classifications
// ---------------------------------------------------------------------------

struct ClassificationRow {
    key: ClassificationKey,
}

impl UpsertRow for ClassificationRow {
    type Key = ClassificationKey;

    const TABLE: &'static str = "classifications";
    const KEY_COLUMNS: &'static [&'static str] = &["sequence_id", "program", "db_name"];

    fn key(&self) -> ClassificationKey {
        self.key.clone()
    }

    fn bind_key(key: &ClassificationKey, out: &mut Vec<Value>) {
        out.push(Value::Integer(key.sequence_id));
        out.push(Value::Text(key.program.clone()));
        out.push(Value::Text(key.database.clone()));
    }

    fn key_from_row(row: &Row<'_>) -> rusqlite::Result<ClassificationKey> {
        Ok(ClassificationKey {
            sequence_id: row.get(1)?,
            program: row.get(2)?,
            database: row.get(3)?,
        })
    }

    fn insert(&self, tx: &Transaction) -> rusqlite::Result<i64> {
        tx.execute(
            "INSERT INTO classifications (sequence_id, program, db_name)
             VALUES (?1, ?2, ?3)",
            params![self.key.sequence_id, self.key.program, self.key.database],
        )?;
        Ok(tx.last_insert_rowid())
    }
}

/// Upsert one classification row per candidate (sequence, program, db).
pub fn upsert_classifications(
    tx: &Transaction,
    candidates: &[ClassificationKey],
    cfg: &BatchConfig,
    is_new: bool,
) -> Result<(AHashMap<ClassificationKey, i64>, bool), ImportError> {
    let rows: Vec<ClassificationRow> = candidates
        .iter()
        .map(|key| ClassificationRow { key: key.clone() })
        .collect();
    upsert_rows(tx, &rows, cfg, is_new)
}

// ---------------------------------------------------------------------------
//  Taxonomy terms
// ---------------------------------------------------------------------------

struct TaxonRow {
    key: TaxonKey,
}

impl UpsertRow for TaxonRow {
    type Key = TaxonKey;

    const TABLE: &'static str = "taxa";
    const KEY_COLUMNS: &'static [&'static str] = &["name", "rank"];

    fn key(&self) -> TaxonKey {
        self.key.clone()
    }

    fn bind_key(key: &TaxonKey, out: &mut Vec<Value>) {
        out.push(match key.taxon.stored_name() {
            Some(name) => Value::Text(name.to_string()),
            None => Value::Null,
        });
        out.push(Value::Text(key.rank.clone()));
    }

    fn key_from_row(row: &Row<'_>) -> rusqlite::Result<TaxonKey> {
        let name: Option<String> = row.get(1)?;
        Ok(TaxonKey {
            taxon: Taxon::from_stored(name),
            rank: row.get(2)?,
        })
    }

    fn insert(&self, tx: &Transaction) -> rusqlite::Result<i64> {
        tx.execute(
            "INSERT INTO taxa (name, rank) VALUES (?1, ?2)",
            params![self.key.taxon.stored_name(), self.key.rank],
        )?;
        Ok(tx.last_insert_rowid())
    }
}

/// Upsert one taxonomy row per distinct (taxon, rank).
pub fn upsert_taxa(
    tx: &Transaction,
    keys: &[TaxonKey],
    cfg: &BatchConfig,
    is_new: bool,
) -> Result<(AHashMap<TaxonKey, i64>, bool), ImportError> {
    let rows: Vec<TaxonRow> = keys.iter().map(|key| TaxonRow { key: key.clone() }).collect();
    upsert_rows(tx, &rows, cfg, is_new)
}

// ---------------------------------------------------------------------------
//  Taxclass join rows
// ---------------------------------------------------------------------------

struct TaxclassRow {
    key: TaxclassKey,
}

impl UpsertRow for TaxclassRow {
    type Key = TaxclassKey;

    const TABLE: &'static str = "taxclass";
    const KEY_COLUMNS: &'static [&'static str] = &["classification_id", "taxon_id"];

    fn key(&self) -> TaxclassKey {
        self.key
    }

    fn bind_key(key: &TaxclassKey, out: &mut Vec<Value>) {
        out.push(Value::Integer(key.classification_id));
        out.push(Value::Integer(key.taxon_id));
    }

    fn key_from_row(row: &Row<'_>) -> rusqlite::Result<TaxclassKey> {
        Ok(TaxclassKey {
            classification_id: row.get(1)?,
            taxon_id: row.get(2)?,
        })
    }

    fn insert(&self, tx: &Transaction) -> rusqlite::Result<i64> {
        tx.execute(
            "INSERT INTO taxclass (classification_id, taxon_id) VALUES (?1, ?2)",
            params![self.key.classification_id, self.key.taxon_id],
        )?;
        Ok(tx.last_insert_rowid())
    }
}

/// Upsert one join row per (classification, taxon) pair.
pub fn upsert_taxclass(
    tx: &Transaction,
    pairs: &[TaxclassKey],
    cfg: &BatchConfig,
    is_new: bool,
) -> Result<(AHashMap<TaxclassKey, i64>, bool), ImportError> {
    let rows: Vec<TaxclassRow> = pairs.iter().map(|key| TaxclassRow { key: *key }).collect();
    upsert_rows(tx, &rows, cfg, is_new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::init_schema;
    use rusqlite::Connection;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("schema");
        conn
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .expect("count")
    }

    fn record(id: &str, seq: &str, quals: &str) -> FastqRecord {
        FastqRecord {
            id: id.to_string(),
            header_line: id.to_string(),
            seq: seq.to_string(),
            quals: quals.to_string(),
        }
    }

    fn run() -> RunInfo {
        RunInfo {
            flow_cell: "FC1".to_string(),
            run_id: "RUN1".to_string(),
            barcode: "01".to_string(),
        }
    }

    #[test]
    fn sequence_upsert_is_idempotent() {
        let mut conn = open();
        let cfg = BatchConfig::default();
        let records = vec![record("r1", "ACGT", "IIII"), record("r2", "GG", "!!")];

        let tx = conn.transaction().expect("tx");
        let (first, is_new) =
            upsert_sequences(&tx, "s1", &run(), &records, &cfg, false).expect("upsert");
        assert!(is_new);
        assert_eq!(first.len(), 2);

        let (second, is_new) =
            upsert_sequences(&tx, "s1", &run(), &records, &cfg, false).expect("upsert");
        assert!(!is_new);
        assert_eq!(first, second);
        tx.commit().expect("commit");

        assert_eq!(count(&conn, "sequences"), 2);
    }

    #[test]
    fn sequence_rows_store_derived_attributes() {
        let mut conn = open();
        let cfg = BatchConfig::default();
        let records = vec![record("r1", "ACGTACGT", "!!!!!!!!")];

        let tx = conn.transaction().expect("tx");
        upsert_sequences(&tx, "s1", &run(), &records, &cfg, false).expect("upsert");
        tx.commit().expect("commit");

        let (length, mean_err): (i64, f64) = conn
            .query_row(
                "SELECT length, mean_error_prob FROM sequences WHERE read_id = 'r1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .expect("row");
        assert_eq!(length, 8);
        assert!((mean_err - 1.0).abs() < 1e-9);
    }

    #[test]
    fn null_named_taxon_deduplicates() {
        let mut conn = open();
        let cfg = BatchConfig::default();
        let keys = vec![TaxonKey {
            taxon: Taxon::Unclassified,
            rank: "domain".to_string(),
        }];

        let tx = conn.transaction().expect("tx");
        let (first, is_new) = upsert_taxa(&tx, &keys, &cfg, false).expect("upsert");
        assert!(is_new);
        let (second, is_new) = upsert_taxa(&tx, &keys, &cfg, false).expect("upsert");
        assert!(!is_new);
        assert_eq!(first, second);
        tx.commit().expect("commit");

        assert_eq!(count(&conn, "taxa"), 1);
    }

    #[test]
    fn batch_size_one_still_covers_every_key() {
        let mut conn = open();
        let cfg = BatchConfig::new(1).expect("cfg");
        let keys: Vec<TaxonKey> = (0..7)
            .map(|i| TaxonKey {
                taxon: Taxon::Name(format!("taxon{i}")),
                rank: "genus".to_string(),
            })
            .collect();

        let tx = conn.transaction().expect("tx");
        let (first, is_new) = upsert_taxa(&tx, &keys, &cfg, false).expect("upsert");
        assert!(is_new);
        assert_eq!(first.len(), 7);
        let (second, is_new) = upsert_taxa(&tx, &keys, &cfg, false).expect("upsert");
        assert!(!is_new);
        assert_eq!(first, second);
        tx.commit().expect("commit");

        assert_eq!(count(&conn, "taxa"), 7);
    }

    #[test]
    fn empty_input_leaves_is_new_untouched() {
        let mut conn = open();
        let cfg = BatchConfig::default();
        let tx = conn.transaction().expect("tx");
        let (map, is_new) = upsert_classifications(&tx, &[], &cfg, true).expect("upsert");
        assert!(map.is_empty());
        assert!(is_new);
        let (map, is_new) = upsert_classifications(&tx, &[], &cfg, false).expect("upsert");
        assert!(map.is_empty());
        assert!(!is_new);
    }

    #[test]
    fn duplicate_candidates_collapse_to_one_row() {
        let mut conn = open();
        let cfg = BatchConfig::default();
        let key = TaxonKey {
            taxon: Taxon::Name("Bacteria".to_string()),
            rank: "domain".to_string(),
        };
        let keys = vec![key.clone(), key.clone(), key];

        let tx = conn.transaction().expect("tx");
        let (map, is_new) = upsert_taxa(&tx, &keys, &cfg, false).expect("upsert");
        assert!(is_new);
        assert_eq!(map.len(), 1);
        tx.commit().expect("commit");
        assert_eq!(count(&conn, "taxa"), 1);
    }
}
