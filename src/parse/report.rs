//src/parse/report.rs

use ahash::AHashMap;

use crate::error::ImportError;
use crate::types::{Lineage, LineageMap, Taxon};

/// The classifier's own internal-error marker. Its presence means the
/// source file is invalid, not that a read went unclassified.
const NO_MATCHES_PREFIX: &str = "no matches for";

/// Marks one read as wholly unclassified.
const NO_MATCH_PREFIX: &str = "no match for";

const UNCLASSIFIED: &str = "unclassified";

/// A read whose rank lines are still being collected.
struct OpenRead {
    id: String,
    taxa: Vec<Taxon>,
}

/// Parse the free-text report format: `>read_id` headers followed by one
/// `<rank>: <taxon>: <aux>` line per rank, in strict rank order.
///
/// Reads that stop short of the full hierarchy get `Unmatched` for every
/// remaining rank. A `no match for <read_id>` line records a read as
/// `Unmatched` at every rank. The literal taxon `unclassified` becomes
/// [`Taxon::Unclassified`].
pub fn parse_report(text: &str, ranks: &[&str]) -> Result<LineageMap, ImportError> {
    if text.trim().is_empty() {
        return Err(ImportError::NoClassifications);
    }

    let mut out: LineageMap = AHashMap::new();
    let mut open: Option<OpenRead> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        // The plural marker is checked first: the singular form below is
        // a prefix of nothing else the classifier emits.
        if line.starts_with(NO_MATCHES_PREFIX) {
            return Err(ImportError::CorruptSource {
                line: line.to_string(),
            });
        }

        if let Some(rest) = line.strip_prefix('>') {
            close_read(&mut out, open.take(), ranks.len());
            let id = rest.split_whitespace().next().unwrap_or("").to_string();
            if id.is_empty() {
                return Err(ImportError::MalformedLine {
                    line: line.to_string(),
                });
            }
            if out.contains_key(&id) {
                return Err(ImportError::DuplicateRead { read_id: id });
            }
            open = Some(OpenRead {
                id,
                taxa: Vec::with_capacity(ranks.len()),
            });
            continue;
        }

        if let Some(rest) = line.strip_prefix(NO_MATCH_PREFIX) {
            close_read(&mut out, open.take(), ranks.len());
            let id = rest.trim().to_string();
            if id.is_empty() {
                return Err(ImportError::MalformedLine {
                    line: line.to_string(),
                });
            }
            if out.contains_key(&id) {
                return Err(ImportError::DuplicateRead { read_id: id });
            }
            out.insert(id, Lineage::unmatched(ranks.len()));
            continue;
        }

        // Rank assertion: `<rank>: <taxon>: <aux>`
        let read = open.as_mut().ok_or_else(|| ImportError::MalformedLine {
            line: line.to_string(),
        })?;
        let mut fields = line.splitn(3, ':');
        let rank = fields.next().map(str::trim).unwrap_or("");
        let taxon = fields
            .next()
            .map(str::trim)
            .ok_or_else(|| ImportError::MalformedLine {
                line: line.to_string(),
            })?;

        let cursor = read.taxa.len();
        if cursor >= ranks.len() {
            // Deeper than the expected hierarchy: re-asserting a known
            // rank is an error, anything else is surplus and ignored.
            if ranks.contains(&rank) {
                return Err(ImportError::DuplicateRank {
                    read_id: read.id.clone(),
                    rank: rank.to_string(),
                });
            }
            continue;
        }
        if rank != ranks[cursor] {
            if ranks[..cursor].contains(&rank) {
                return Err(ImportError::DuplicateRank {
                    read_id: read.id.clone(),
                    rank: rank.to_string(),
                });
            }
            return Err(ImportError::RankMismatch {
                read_id: read.id.clone(),
                expected: ranks[cursor].to_string(),
                found: rank.to_string(),
            });
        }

        read.taxa.push(if taxon == UNCLASSIFIED {
            Taxon::Unclassified
        } else {
            Taxon::Name(taxon.to_string())
        });
    }

    close_read(&mut out, open.take(), ranks.len());
    Ok(out)
}

/// Seal an in-progress read: pad the unresolved tail of the hierarchy with
/// `Unmatched` and move it into the result map.
fn close_read(out: &mut LineageMap, open: Option<OpenRead>, n_ranks: usize) {
    if let Some(mut read) = open {
        while read.taxa.len() < n_ranks {
            read.taxa.push(Taxon::Unmatched);
        }
        out.insert(read.id, Lineage::from_taxa(read.taxa));
    }
}
