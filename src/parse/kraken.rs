//src/parse/kraken.rs

use ahash::AHashMap;

use crate::error::ImportError;
use crate::types::{Lineage, LineageMap, Taxon};

const UNCLASSIFIED: &str = "unclassified";

/// Parse the tab-delimited format, one line per read:
/// `status \t read_id \t tax_id \t depth \t lineage`.
///
/// `U` rows record a read as `Unmatched` at every rank. For `C` rows,
/// `lineage` is a `|`-separated list of taxon names root-down and `depth`
/// is authoritative: every rank at or beyond it is `Unmatched`, whatever
/// the lineage string carries there.
pub fn parse_kraken(text: &str, ranks: &[&str]) -> Result<LineageMap, ImportError> {
    if text.trim().is_empty() {
        return Err(ImportError::NoClassifications);
    }

    let mut out: LineageMap = AHashMap::new();

    for raw in text.lines() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let malformed = || ImportError::MalformedLine {
            line: line.to_string(),
        };

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 4 {
            return Err(malformed());
        }

        let read_id = fields[1].trim().to_string();
        if read_id.is_empty() {
            return Err(malformed());
        }
        if out.contains_key(&read_id) {
            return Err(ImportError::DuplicateRead { read_id });
        }

        match fields[0].trim() {
            "U" => {
                out.insert(read_id, Lineage::unmatched(ranks.len()));
            }
            "C" => {
                if fields.len() < 5 {
                    return Err(malformed());
                }
                let _tax_id: u64 = fields[2].trim().parse().map_err(|_| malformed())?;
                let depth: usize = fields[3].trim().parse().map_err(|_| malformed())?;

                let entries: Vec<&str> = if fields[4].trim().is_empty() {
                    Vec::new()
                } else {
                    fields[4].split('|').map(str::trim).collect()
                };
                let resolved = depth.min(ranks.len());
                if entries.len() < resolved {
                    return Err(malformed());
                }

                let mut taxa = Vec::with_capacity(ranks.len());
                for (i, _) in ranks.iter().enumerate() {
                    if i < resolved {
                        taxa.push(if entries[i] == UNCLASSIFIED {
                            Taxon::Unclassified
                        } else {
                            Taxon::Name(entries[i].to_string())
                        });
                    } else {
                        taxa.push(Taxon::Unmatched);
                    }
                }
                out.insert(read_id, Lineage::from_taxa(taxa));
            }
            _ => return Err(malformed()),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RANKS: [&str; 3] = ["domain", "phylum", "class"];

    #[test]
    fn classified_row_respects_depth() {
        let map = parse_kraken("C\tr1\t816\t2\tBacteria|Bacteroidota\n", &RANKS)
            .expect("parse");
        assert_eq!(
            map["r1"].taxa(),
            &[
                Taxon::Name("Bacteria".to_string()),
                Taxon::Name("Bacteroidota".to_string()),
                Taxon::Unmatched,
            ]
        );
    }

    #[test]
    fn depth_truncates_longer_lineage_strings() {
        // Depth says one rank resolved; the extra entries must not land.
        let map = parse_kraken("C\tr1\t2\t1\tBacteria|Bacteroidota|Bacteroidia\n", &RANKS)
            .expect("parse");
        assert_eq!(
            map["r1"].taxa(),
            &[
                Taxon::Name("Bacteria".to_string()),
                Taxon::Unmatched,
                Taxon::Unmatched,
            ]
        );
    }

    #[test]
    fn unclassified_row_is_fully_unmatched() {
        let map = parse_kraken("U\tr9\t0\t0\t\n", &RANKS).expect("parse");
        assert_eq!(map["r9"], Lineage::unmatched(3));
    }

    #[test]
    fn lineage_shorter_than_depth_is_fatal() {
        let err = parse_kraken("C\tr1\t2\t3\tBacteria\n", &RANKS).unwrap_err();
        assert!(matches!(err, ImportError::MalformedLine { .. }));
    }

    #[test]
    fn unknown_status_flag_is_fatal() {
        let err = parse_kraken("X\tr1\t2\t1\tBacteria\n", &RANKS).unwrap_err();
        assert!(matches!(err, ImportError::MalformedLine { .. }));
    }

    #[test]
    fn non_numeric_depth_is_fatal() {
        let err = parse_kraken("C\tr1\t2\tdeep\tBacteria\n", &RANKS).unwrap_err();
        assert!(matches!(err, ImportError::MalformedLine { .. }));
    }

    #[test]
    fn duplicate_read_is_fatal() {
        let text = "U\tr1\t0\t0\t\nU\tr1\t0\t0\t\n";
        let err = parse_kraken(text, &RANKS).unwrap_err();
        assert!(matches!(err, ImportError::DuplicateRead { .. }));
    }

    #[test]
    fn empty_input_is_fatal() {
        let err = parse_kraken("\n  \n", &RANKS).unwrap_err();
        assert!(matches!(err, ImportError::NoClassifications));
    }
}
