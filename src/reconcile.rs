//src/reconcile.rs

use ahash::{AHashMap, AHashSet};

use crate::error::ImportError;
use crate::locate::PatternTable;
use crate::types::{LineageMap, ReadId, SampleId, SequenceKeys};

/// Read ownership per (pattern, sample), proven against the sequence keys.
pub type ReadPartition = AHashMap<String, AHashMap<SampleId, AHashSet<ReadId>>>;

/// Cross-check parsed lineages against the sequences already on file.
///
/// Two independent caller-supplied structures meet here: the pattern table
/// (from sample metadata) and the sequence-keys map (from sequence
/// import). They must agree on the (pattern, sample) universe, and for
/// every pattern that produced classifier output the parsed read-ID set
/// must exactly equal the read IDs on file. Pooled control reads are
/// assigned to the single sample whose sequences contain them.
///
/// Patterns without classifier output are exempt from the set check; their
/// reads are handled by the sentinel policy.
pub fn reconcile(
    table: &PatternTable,
    parsed: &AHashMap<String, LineageMap>,
    sequence_keys: &SequenceKeys,
) -> Result<ReadPartition, ImportError> {
    // 1) Structural agreement between metadata and sequence keys.
    for (pattern, entry) in table {
        let Some(seq_samples) = sequence_keys.get(pattern) else {
            return Err(ImportError::SampleSequenceMismatch {
                sample: entry.samples[0].clone(),
            });
        };
        for sample in &entry.samples {
            if !seq_samples.contains_key(sample) {
                return Err(ImportError::SampleSequenceMismatch {
                    sample: sample.clone(),
                });
            }
        }
        for sample in seq_samples.keys() {
            if !entry.samples.contains(sample) {
                return Err(ImportError::SampleSequenceMismatch {
                    sample: sample.clone(),
                });
            }
        }
    }
    for (pattern, seq_samples) in sequence_keys {
        if !table.contains_key(pattern) {
            let sample = seq_samples.keys().next().cloned().unwrap_or_default();
            return Err(ImportError::SampleSequenceMismatch { sample });
        }
    }

    // 2) Read-ID set equality per (pattern, sample).
    let mut partition: ReadPartition = AHashMap::new();
    for (pattern, lineages) in parsed {
        let seq_samples = &sequence_keys[pattern];
        let mut sample_reads: AHashMap<SampleId, AHashSet<ReadId>> = AHashMap::new();

        for read_id in lineages.keys() {
            let mut owner: Option<&SampleId> = None;
            for (sample, reads) in seq_samples {
                if reads.contains_key(read_id) {
                    if owner.is_some() {
                        return Err(ImportError::ReadIdMismatch {
                            sample: sample.clone(),
                            pattern: pattern.clone(),
                        });
                    }
                    owner = Some(sample);
                }
            }
            match owner {
                Some(sample) => {
                    sample_reads
                        .entry(sample.clone())
                        .or_default()
                        .insert(read_id.clone());
                }
                None => {
                    // A classified read no sequence row knows about.
                    return Err(ImportError::ReadIdMismatch {
                        sample: table[pattern].samples[0].clone(),
                        pattern: pattern.clone(),
                    });
                }
            }
        }

        for (sample, reads) in seq_samples {
            let classified = sample_reads.get(sample).map_or(0, |s| s.len());
            if classified != reads.len() {
                return Err(ImportError::ReadIdMismatch {
                    sample: sample.clone(),
                    pattern: pattern.clone(),
                });
            }
        }

        partition.insert(pattern.clone(), sample_reads);
    }

    Ok(partition)
}
