//src/error.rs

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Every fatal outcome of an import call. Recoverable conditions (missing
/// files, empty files, empty directories) never surface here; they are
/// logged and collected in [`crate::types::Diagnostics`] instead.
///
/// Configuration errors ("bad call") are worded distinctly from data-level
/// errors ("bad input") so callers can tell the two apart from the message
/// alone.
#[derive(Debug, Error)]
pub enum ImportError {
    // ------------------------------------------------------------------
    //  Parse-level contract violations
    // ------------------------------------------------------------------
    /// The classifier source was empty or whitespace-only.
    #[error("no classifications present")]
    NoClassifications,

    /// A rank line arrived out of order for the expected hierarchy.
    #[error("read {read_id}: expected rank {expected}, found rank {found}")]
    RankMismatch {
        read_id: String,
        expected: String,
        found: String,
    },

    /// The same rank was asserted twice for one read.
    #[error("read {read_id}: rank {rank} asserted twice")]
    DuplicateRank { read_id: String, rank: String },

    /// One read carried more than one classification in a single source.
    #[error("read {read_id} classified more than once")]
    DuplicateRead { read_id: String },

    /// The classifier wrote its own internal-error marker into the file.
    #[error("classifier source is invalid: {line:?}")]
    CorruptSource { line: String },

    /// A line matched no construct the format defines.
    #[error("malformed classifier line: {line:?}")]
    MalformedLine { line: String },

    // ------------------------------------------------------------------
    //  Configuration errors
    // ------------------------------------------------------------------
    /// Batch size must be a positive integer.
    #[error("invalid batch size {got}: batch size must be a positive integer")]
    InvalidBatchSize { got: usize },

    #[error("mandatory value for program name not found (sample {sample})")]
    MissingProgram { sample: String },

    #[error("unknown classifier: no database name supplied (sample {sample})")]
    UnknownClassifier { sample: String },

    #[error("multiple samples share the same directory pattern ({pattern})")]
    DuplicatePattern { pattern: String },

    #[error("multiple classifiers for the same data (pattern {pattern})")]
    MultipleClassifiers { pattern: String },

    // ------------------------------------------------------------------
    //  Structural integrity between caller-supplied inputs
    // ------------------------------------------------------------------
    #[error("sample and sequence objects not matching (sample {sample})")]
    SampleSequenceMismatch { sample: String },

    #[error("read ID(s) do not match for sample {sample} under pattern {pattern}")]
    ReadIdMismatch { sample: String, pattern: String },

    /// A foreign-key structure required for this stage carried no entries.
    #[error("empty foreign-key structure for {what}")]
    EmptyForeignKeys { what: &'static str },

    /// A required nested identifier was absent from a foreign-key structure.
    #[error("missing {what} id for read {read_id}")]
    MissingForeignKey {
        what: &'static str,
        read_id: String,
    },

    // ------------------------------------------------------------------
    //  Environment
    // ------------------------------------------------------------------
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error on {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}
