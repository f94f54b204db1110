// src/lib.rs
pub mod error;
pub mod fastq;
pub mod locate;
pub mod parse;
pub mod reconcile;
pub mod sentinel;
pub mod store;
pub mod types;

use std::path::Path;

use ahash::{AHashMap, AHashSet};
use rusqlite::Transaction;

use crate::error::ImportError;
use crate::fastq::FastqRecord;
use crate::locate::{build_pattern_table, locate_classifier_files, Extractor};
use crate::parse::ClassifierFormat;
use crate::reconcile::reconcile;
use crate::sentinel::fill_filtered;
use crate::store::upsert::{
    upsert_classifications, upsert_sequences, upsert_taxa, upsert_taxclass,
};
use crate::store::BatchConfig;
use crate::types::{
    ClassificationKey, Diagnostics, ReadId, RunInfo, SampleMetadataMap, SequenceKeys,
    TaxclassKey, TaxclassMap, TaxonAssignment, TaxonKey,
};

/// Everything one classification import produced: the foreign-key maps for
/// the downstream reporting stage, the folded any-new-row flag, and the
/// recoverable findings.
#[derive(Debug)]
pub struct ImportOutcome {
    /// (taxon, rank) → taxonomy row id plus the reads asserting it.
    pub taxclass: TaxclassMap,
    /// read id → classification row id.
    pub classification_ids: AHashMap<ReadId, i64>,
    /// True once any call in this logical run inserted a row.
    pub is_new: bool,
    pub diagnostics: Diagnostics,
}

/// Load one sample's reads into the store and return the read → row-id map
/// that later feeds the sequence-keys structure of
/// [`import_classifications`]. Runs inside the caller's transaction and
/// never commits.
pub fn import_sequences(
    tx: &Transaction,
    sample: &str,
    run: &RunInfo,
    records: &[FastqRecord],
    cfg: &BatchConfig,
    is_new: bool,
) -> Result<(AHashMap<ReadId, i64>, bool), ImportError> {
    upsert_sequences(tx, sample, run, records, cfg, is_new)
}

/// Load classifier output for a whole run into the store.
///
/// Locates classifier files under `base`, parses them, proves read
/// coverage against the sequences already on file, records reads with no
/// classifier output as `Filtered`, and upserts classification, taxonomy
/// and taxclass rows — all inside the caller's transaction. Re-running the
/// same call over the same data inserts nothing and returns the same maps
/// with `is_new` unchanged.
#[allow(clippy::too_many_arguments)]
pub fn import_classifications(
    tx: &Transaction,
    base: &Path,
    samples: &SampleMetadataMap,
    sequence_keys: &SequenceKeys,
    format: ClassifierFormat,
    ranks: &[&str],
    cfg: &BatchConfig,
    extractor: &dyn Extractor,
    is_new: bool,
) -> Result<ImportOutcome, ImportError> {
    let mut diagnostics = Diagnostics::default();

    // 1. Resolve which samples claim which directory pattern
    let table = build_pattern_table(samples)?;

    // 2. Locate and parse classifier output per pattern
    let mut lineages =
        locate_classifier_files(base, &table, format, ranks, extractor, &mut diagnostics)?;

    // 3. Prove read coverage against the sequences already on file
    let mut partition = reconcile(&table, &lineages, sequence_keys)?;

    // 4. Reads with no classifier record at all are FILTERED at every rank
    fill_filtered(
        &mut lineages,
        &mut partition,
        &table,
        sequence_keys,
        ranks.len(),
        &mut diagnostics,
    );

    // 5. One classification row per (read, classifier program, classifier db)
    let mut candidates: Vec<ClassificationKey> = Vec::new();
    let mut read_keys: AHashMap<ReadId, ClassificationKey> = AHashMap::new();
    let mut patterns: Vec<&String> = partition.keys().collect();
    patterns.sort();
    for pattern in &patterns {
        let entry = &table[*pattern];
        let seq_samples = &sequence_keys[*pattern];
        for (sample, reads) in &partition[*pattern] {
            let seq_reads = &seq_samples[sample];
            for read_id in reads {
                let Some(&sequence_id) = seq_reads.get(read_id) else {
                    return Err(ImportError::MissingForeignKey {
                        what: "sequence",
                        read_id: read_id.clone(),
                    });
                };
                let key = ClassificationKey {
                    sequence_id,
                    program: entry.program.clone(),
                    database: entry.database.clone(),
                };
                read_keys.insert(read_id.clone(), key.clone());
                candidates.push(key);
            }
        }
    }
    if !lineages.is_empty() && read_keys.is_empty() {
        return Err(ImportError::EmptyForeignKeys {
            what: "classification",
        });
    }
    let (class_map, is_new) = upsert_classifications(tx, &candidates, cfg, is_new)?;

    // 6. One taxonomy row per distinct (taxon, rank)
    let mut taxon_keys: Vec<TaxonKey> = Vec::new();
    let mut seen: AHashSet<TaxonKey> = AHashSet::new();
    for per_read in lineages.values() {
        for lineage in per_read.values() {
            for (i, taxon) in lineage.taxa().iter().enumerate() {
                let key = TaxonKey {
                    taxon: taxon.clone(),
                    rank: ranks[i].to_string(),
                };
                if seen.insert(key.clone()) {
                    taxon_keys.push(key);
                }
            }
        }
    }
    let (taxa_map, is_new) = upsert_taxa(tx, &taxon_keys, cfg, is_new)?;

    // 7. One taxclass join row per rank of each classification
    let mut pairs: Vec<TaxclassKey> = Vec::new();
    let mut assignments: TaxclassMap = AHashMap::new();
    for (pattern, per_read) in &lineages {
        let entry = &table[pattern];
        for (read_id, lineage) in per_read {
            let class_key =
                read_keys
                    .get(read_id)
                    .ok_or_else(|| ImportError::MissingForeignKey {
                        what: "classification",
                        read_id: read_id.clone(),
                    })?;
            let classification_id = class_map.get(class_key).copied().ok_or_else(|| {
                ImportError::MissingForeignKey {
                    what: "classification",
                    read_id: read_id.clone(),
                }
            })?;
            for (i, taxon) in lineage.taxa().iter().enumerate() {
                let taxon_key = TaxonKey {
                    taxon: taxon.clone(),
                    rank: ranks[i].to_string(),
                };
                let taxonomy_id = taxa_map.get(&taxon_key).copied().ok_or_else(|| {
                    ImportError::MissingForeignKey {
                        what: "taxonomy",
                        read_id: read_id.clone(),
                    }
                })?;
                pairs.push(TaxclassKey {
                    classification_id,
                    taxon_id: taxonomy_id,
                });
                assignments
                    .entry(taxon_key)
                    .or_insert_with(|| TaxonAssignment {
                        taxonomy_id,
                        reads: AHashMap::new(),
                    })
                    .reads
                    .insert(
                        read_id.clone(),
                        (entry.program.clone(), entry.database.clone()),
                    );
            }
        }
    }
    let (_, is_new) = upsert_taxclass(tx, &pairs, cfg, is_new)?;

    // 8. Foreign-key maps for the downstream stage
    let mut classification_ids: AHashMap<ReadId, i64> = AHashMap::new();
    for (read_id, key) in &read_keys {
        let id = class_map
            .get(key)
            .copied()
            .ok_or_else(|| ImportError::MissingForeignKey {
                what: "classification",
                read_id: read_id.clone(),
            })?;
        classification_ids.insert(read_id.clone(), id);
    }

    Ok(ImportOutcome {
        taxclass: assignments,
        classification_ids,
        is_new,
        diagnostics,
    })
}
