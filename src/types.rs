//src/types.rs

use ahash::AHashMap;

/// The fixed rank hierarchy, root-down.
pub const DEFAULT_RANKS: [&str; 10] = [
    "domain",
    "kingdom",
    "phylum",
    "class",
    "order",
    "family",
    "genus",
    "species",
    "subspecies",
    "strain",
];

/// Reserved name recording "classifier ran, but made no call at this rank".
pub const UNMATCHED_NAME: &str = "UNMATCHED";

/// Reserved name recording "no classifier record exists for this read".
pub const FILTERED_NAME: &str = "FILTERED";

/// Barcode number substituted into control-sample directory patterns.
pub const CONTROL_BARCODE: &str = "00";

pub type ReadId = String;
pub type SampleId = String;

/// One taxon slot of a lineage. The reserved sentinel names never travel
/// as strings inside the pipeline; they exist only at the store boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Taxon {
    /// A real classifier call.
    Name(String),
    /// The classifier emitted the literal `unclassified` at this rank.
    Unclassified,
    /// The classifier ran on this read but resolved nothing at this rank.
    Unmatched,
    /// No classifier record exists for this read in this run.
    Filtered,
}

impl Taxon {
    /// Column value this taxon is stored under; `None` is SQL NULL.
    pub fn stored_name(&self) -> Option<&str> {
        match self {
            Taxon::Name(name) => Some(name),
            Taxon::Unclassified => None,
            Taxon::Unmatched => Some(UNMATCHED_NAME),
            Taxon::Filtered => Some(FILTERED_NAME),
        }
    }

    /// Inverse of [`Taxon::stored_name`].
    pub fn from_stored(name: Option<String>) -> Self {
        match name {
            None => Taxon::Unclassified,
            Some(n) if n == UNMATCHED_NAME => Taxon::Unmatched,
            Some(n) if n == FILTERED_NAME => Taxon::Filtered,
            Some(n) => Taxon::Name(n),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, Taxon::Unmatched | Taxon::Filtered)
    }
}

/// A read's full per-rank assignment, index-aligned with the rank list in
/// force for the import. Exactly one taxon per rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage {
    taxa: Vec<Taxon>,
}

impl Lineage {
    pub(crate) fn from_taxa(taxa: Vec<Taxon>) -> Self {
        Self { taxa }
    }

    /// Classifier ran on the read but resolved nothing at any rank.
    pub fn unmatched(n_ranks: usize) -> Self {
        Self {
            taxa: vec![Taxon::Unmatched; n_ranks],
        }
    }

    /// No classifier record exists for the read at all.
    pub fn filtered(n_ranks: usize) -> Self {
        Self {
            taxa: vec![Taxon::Filtered; n_ranks],
        }
    }

    pub fn taxa(&self) -> &[Taxon] {
        &self.taxa
    }

    pub fn len(&self) -> usize {
        self.taxa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taxa.is_empty()
    }

    /// A read is filtered at every rank or at none.
    pub fn is_filtered(&self) -> bool {
        !self.taxa.is_empty() && self.taxa.iter().all(|t| *t == Taxon::Filtered)
    }
}

/// read id → per-rank assignment, for one classifier source or pattern.
pub type LineageMap = AHashMap<ReadId, Lineage>;

/// Per-sample metadata supplied by the (out-of-scope) registration step.
#[derive(Debug, Clone)]
pub struct SampleMeta {
    pub directory_pattern: String,
    pub control: bool,
    pub program: Option<String>,
    pub database: Option<String>,
}

pub type SampleMetadataMap = AHashMap<SampleId, SampleMeta>;

/// directory pattern → sample → read → sequence row id, as produced by
/// sequence import.
pub type SequenceKeys = AHashMap<String, AHashMap<SampleId, AHashMap<ReadId, i64>>>;

/// Run provenance shared by every read of one FASTQ import call.
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub flow_cell: String,
    pub run_id: String,
    pub barcode: String,
}

/// Natural key of a sequence row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequenceKey {
    pub sample: SampleId,
    pub flow_cell: String,
    pub run_id: String,
    pub barcode: String,
    pub read_id: ReadId,
}

/// Natural key of a classification row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassificationKey {
    pub sequence_id: i64,
    pub program: String,
    pub database: String,
}

/// Natural key of a taxonomy row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaxonKey {
    pub taxon: Taxon,
    pub rank: String,
}

/// Natural key of a taxclass join row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaxclassKey {
    pub classification_id: i64,
    pub taxon_id: i64,
}

/// Downstream foreign-key entry for one (taxon, rank).
#[derive(Debug, Clone, PartialEq)]
pub struct TaxonAssignment {
    pub taxonomy_id: i64,
    /// read id → (classifier program, classifier database).
    pub reads: AHashMap<ReadId, (String, String)>,
}

/// (taxon, rank) → assignment, consumed by the downstream reporting stage.
pub type TaxclassMap = AHashMap<TaxonKey, TaxonAssignment>;

/// Recoverable findings collected during one import call. Fatal conditions
/// are returned as [`crate::error::ImportError`] instead.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<String>,
}

impl Diagnostics {
    pub fn warn(&mut self, message: String) {
        log::warn!("{message}");
        self.warnings.push(message);
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }
}
