//src/sentinel.rs

use ahash::{AHashMap, AHashSet};

use crate::locate::PatternTable;
use crate::reconcile::ReadPartition;
use crate::types::{Diagnostics, Lineage, LineageMap, ReadId, SampleId, SequenceKeys};

/// Assign an all-`Filtered` lineage to every read of every pattern that
/// produced no classifier output at all.
///
/// `Filtered` is reserved for reads with no classifier record for the run:
/// the taxonomy file was absent, empty, or whitespace-only. It applies to
/// all ranks of a read at once, never partially; a pattern that *did*
/// produce output but misses reads fails reconciliation instead of being
/// patched here. `Unmatched`, by contrast, is assigned by the parsers when
/// the classifier ran on a read but made no call at a rank.
pub fn fill_filtered(
    lineages: &mut AHashMap<String, LineageMap>,
    partition: &mut ReadPartition,
    table: &PatternTable,
    sequence_keys: &SequenceKeys,
    n_ranks: usize,
    diags: &mut Diagnostics,
) {
    for pattern in table.keys() {
        if lineages.contains_key(pattern) {
            continue;
        }
        let Some(seq_samples) = sequence_keys.get(pattern) else {
            continue;
        };

        let mut per_read: LineageMap = AHashMap::new();
        let mut sample_reads: AHashMap<SampleId, AHashSet<ReadId>> = AHashMap::new();
        for (sample, reads) in seq_samples {
            for read_id in reads.keys() {
                per_read.insert(read_id.clone(), Lineage::filtered(n_ranks));
                sample_reads
                    .entry(sample.clone())
                    .or_default()
                    .insert(read_id.clone());
            }
        }
        if per_read.is_empty() {
            continue;
        }

        diags.warn(format!(
            "pattern {pattern}: no classifier record for {} read(s), recording FILTERED at every rank",
            per_read.len()
        ));
        lineages.insert(pattern.clone(), per_read);
        partition.insert(pattern.clone(), sample_reads);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locate::PatternEntry;
    use crate::types::Taxon;

    #[test]
    fn fileless_pattern_gets_filtered_lineages() {
        let mut table = PatternTable::new();
        table.insert(
            "RUN1_barcode02".to_string(),
            PatternEntry {
                samples: vec!["s2".to_string()],
                control: false,
                program: "kraken".to_string(),
                database: "pr2".to_string(),
            },
        );

        let mut keys = SequenceKeys::new();
        keys.entry("RUN1_barcode02".to_string())
            .or_default()
            .entry("s2".to_string())
            .or_default()
            .extend([("r1".to_string(), 1_i64), ("r2".to_string(), 2_i64)]);

        let mut lineages = AHashMap::new();
        let mut partition = ReadPartition::new();
        let mut diags = Diagnostics::default();
        fill_filtered(&mut lineages, &mut partition, &table, &keys, 3, &mut diags);

        let per_read = &lineages["RUN1_barcode02"];
        assert_eq!(per_read.len(), 2);
        assert!(per_read.values().all(Lineage::is_filtered));
        assert!(per_read["r1"]
            .taxa()
            .iter()
            .all(|t| *t == Taxon::Filtered));
        assert_eq!(partition["RUN1_barcode02"]["s2"].len(), 2);
        assert!(!diags.is_empty());
    }

    #[test]
    fn patterns_with_output_are_untouched() {
        let mut table = PatternTable::new();
        table.insert(
            "RUN1_barcode01".to_string(),
            PatternEntry {
                samples: vec!["s1".to_string()],
                control: false,
                program: "kraken".to_string(),
                database: "pr2".to_string(),
            },
        );

        let mut keys = SequenceKeys::new();
        keys.entry("RUN1_barcode01".to_string())
            .or_default()
            .entry("s1".to_string())
            .or_default()
            .insert("r1".to_string(), 1_i64);

        let mut lineages = AHashMap::new();
        let mut per_read = LineageMap::new();
        per_read.insert("r1".to_string(), Lineage::unmatched(3));
        lineages.insert("RUN1_barcode01".to_string(), per_read);

        let mut partition = ReadPartition::new();
        let mut diags = Diagnostics::default();
        fill_filtered(&mut lineages, &mut partition, &table, &keys, 3, &mut diags);

        assert_eq!(lineages["RUN1_barcode01"]["r1"], Lineage::unmatched(3));
        assert!(diags.is_empty());
    }
}
