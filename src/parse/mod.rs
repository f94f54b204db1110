//src/parse/mod.rs

pub mod kraken;
pub mod report;

use crate::error::ImportError;
use crate::types::LineageMap;

/// Which third-party classifier wrote the raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierFormat {
    /// Free-text per-read report: a header line per read followed by one
    /// rank assertion per line.
    Report,
    /// Tab-delimited output, one line per read.
    Kraken,
}

/// Parse classifier output into a per-read lineage map with exactly one
/// taxon per expected rank.
pub fn parse_lineages(
    format: ClassifierFormat,
    text: &str,
    ranks: &[&str],
) -> Result<LineageMap, ImportError> {
    match format {
        ClassifierFormat::Report => report::parse_report(text, ranks),
        ClassifierFormat::Kraken => kraken::parse_kraken(text, ranks),
    }
}
