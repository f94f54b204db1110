//src/locate.rs

use std::collections::hash_map::Entry;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use flate2::read::MultiGzDecoder;

use crate::error::ImportError;
use crate::parse::{parse_lineages, ClassifierFormat};
use crate::types::{Diagnostics, LineageMap, SampleId, SampleMetadataMap, CONTROL_BARCODE};

/// Which samples claim one literal directory pattern, and the classifier
/// they assert for its reads. More than one sample only for controls.
#[derive(Debug, Clone)]
pub struct PatternEntry {
    pub samples: Vec<SampleId>,
    pub control: bool,
    pub program: String,
    pub database: String,
}

pub type PatternTable = AHashMap<String, PatternEntry>;

/// Replace the trailing barcode number of a control sample's directory
/// pattern with the reserved control barcode. Patterns without a trailing
/// number are left alone.
pub fn control_pattern(pattern: &str) -> String {
    let stem = pattern.trim_end_matches(|c: char| c.is_ascii_digit());
    if stem.len() == pattern.len() {
        pattern.to_string()
    } else {
        format!("{stem}{CONTROL_BARCODE}")
    }
}

/// Resolve each sample's directory pattern and group samples by the
/// literal pattern they land on. Control samples pool; case samples must
/// each own their pattern, and pooled controls must agree on the
/// classifier.
pub fn build_pattern_table(samples: &SampleMetadataMap) -> Result<PatternTable, ImportError> {
    let mut table = PatternTable::new();

    // Sorted so error attribution does not depend on hash order.
    let mut ids: Vec<&SampleId> = samples.keys().collect();
    ids.sort();

    for id in ids {
        let meta = &samples[id];
        let program = meta
            .program
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ImportError::MissingProgram { sample: id.clone() })?;
        let database = meta
            .database
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| ImportError::UnknownClassifier { sample: id.clone() })?;

        let pattern = if meta.control {
            control_pattern(&meta.directory_pattern)
        } else {
            meta.directory_pattern.clone()
        };

        match table.entry(pattern) {
            Entry::Vacant(slot) => {
                slot.insert(PatternEntry {
                    samples: vec![id.clone()],
                    control: meta.control,
                    program: program.to_string(),
                    database: database.to_string(),
                });
            }
            Entry::Occupied(mut slot) => {
                let pattern = slot.key().clone();
                let entry = slot.get_mut();
                if !(entry.control && meta.control) {
                    return Err(ImportError::DuplicatePattern { pattern });
                }
                if entry.program != program || entry.database != database {
                    return Err(ImportError::MultipleClassifiers { pattern });
                }
                entry.samples.push(id.clone());
            }
        }
    }

    Ok(table)
}

/// Interface to the archive-extraction collaborator. `Ok(None)` means the
/// file name is not a recognized classifier artifact for this extractor
/// and should be ignored.
pub trait Extractor {
    fn extract(&self, path: &Path) -> Result<Option<String>, ImportError>;
}

/// Default extractor: recognizes `<prefix>_<suffix>` classifier files,
/// plain or gzip-compressed.
#[derive(Debug, Clone)]
pub struct GzExtractor {
    suffix: String,
}

impl GzExtractor {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }
}

impl Extractor for GzExtractor {
    fn extract(&self, path: &Path) -> Result<Option<String>, ImportError> {
        let name = match path.file_name() {
            Some(n) => n.to_string_lossy().into_owned(),
            None => return Ok(None),
        };
        let (stem, is_gz) = match name.strip_suffix(".gz") {
            Some(s) => (s, true),
            None => (name.as_str(), false),
        };
        if !stem.ends_with(&format!("_{}", self.suffix)) {
            return Ok(None);
        }

        let io_err = |e: std::io::Error| ImportError::Io {
            path: path.to_path_buf(),
            source: e,
        };
        let file = File::open(path).map_err(io_err)?;
        let mut text = String::new();
        if is_gz {
            MultiGzDecoder::new(file)
                .read_to_string(&mut text)
                .map_err(io_err)?;
        } else {
            BufReader::new(file)
                .read_to_string(&mut text)
                .map_err(io_err)?;
        }
        Ok(Some(text))
    }
}

/// Walk `<base>/<pattern>/` for every pattern in the table, extract each
/// recognized classifier file and parse it into per-read lineages.
///
/// Missing directories, unrecognized files and files whose content is
/// empty or whitespace-only are never fatal: they are logged, recorded in
/// the diagnostics, and the pattern simply yields no reads ("zero reads
/// classified").
pub fn locate_classifier_files(
    base: &Path,
    table: &PatternTable,
    format: ClassifierFormat,
    ranks: &[&str],
    extractor: &dyn Extractor,
    diags: &mut Diagnostics,
) -> Result<AHashMap<String, LineageMap>, ImportError> {
    let mut out: AHashMap<String, LineageMap> = AHashMap::new();

    let mut patterns: Vec<&String> = table.keys().collect();
    patterns.sort();

    for pattern in patterns {
        let dir = base.join(pattern);
        if !dir.is_dir() {
            diags.warn(format!(
                "no classifier directory for pattern {pattern}: zero reads classified"
            ));
            continue;
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(&dir)
            .map_err(|e| ImportError::Io {
                path: dir.clone(),
                source: e,
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        let mut merged: LineageMap = AHashMap::new();
        for path in paths {
            let Some(text) = extractor.extract(&path)? else {
                continue;
            };
            if text.trim().is_empty() {
                diags.warn(format!(
                    "classifier file {} is empty, treating as not found",
                    path.display()
                ));
                continue;
            }
            let parsed = parse_lineages(format, &text, ranks)?;
            for (read_id, lineage) in parsed {
                if merged.insert(read_id.clone(), lineage).is_some() {
                    return Err(ImportError::DuplicateRead { read_id });
                }
            }
        }

        if merged.is_empty() {
            diags.warn(format!(
                "no classifier output under pattern {pattern}: zero reads classified"
            ));
            continue;
        }
        log::info!(
            "pattern {pattern}: parsed lineages for {} read(s)",
            merged.len()
        );
        out.insert(pattern.clone(), merged);
    }

    Ok(out)
}
