use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::ImportError;

/// A minimal representation of a read.
#[derive(Debug, Clone)]
pub struct FastqRecord {
    pub id: String,
    pub header_line: String,
    pub seq: String,
    pub quals: String,
}

impl FastqRecord {
    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// Mean per-base error probability over the Phred+33 quality string.
    pub fn mean_error_prob(&self) -> f64 {
        mean_error_prob(&self.quals)
    }
}

/// Mean of `10^(-q/10)` over a Phred+33 quality string. An empty string
/// yields 1.0 (no evidence any base is correct).
pub fn mean_error_prob(quals: &str) -> f64 {
    if quals.is_empty() {
        return 1.0;
    }
    let sum: f64 = quals
        .bytes()
        .map(|b| 10f64.powf(-f64::from(b.saturating_sub(33)) / 10.0))
        .sum();
    sum / quals.len() as f64
}

/// Minimal FASTQ reader that also supports `.gz`.
pub fn read_fastq_records(path: &Path) -> Result<Vec<FastqRecord>, ImportError> {
    let io_err = |e: std::io::Error| ImportError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    let f = File::open(path).map_err(io_err)?;

    // If the file ends with ".gz", wrap it in a MultiGzDecoder
    let is_gz = path.extension().map(|ext| ext == "gz").unwrap_or(false);
    let mut reader: Box<dyn BufRead> = if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    };

    let mut records = Vec::new();
    let mut line = String::new();

    loop {
        line.clear();
        // 1) read header
        if reader.read_line(&mut line).map_err(io_err)? == 0 {
            break; // EOF
        }
        let header_line = line.trim_end().to_string();
        if !header_line.starts_with('@') {
            // Not a valid FASTQ header; skip
            continue;
        }
        let header_str = &header_line[1..];

        // 2) read sequence
        line.clear();
        if reader.read_line(&mut line).map_err(io_err)? == 0 {
            break;
        }
        let seq_str = line.trim_end().to_string();

        // 3) read plus line
        line.clear();
        if reader.read_line(&mut line).map_err(io_err)? == 0 {
            break;
        }
        // 4) read quality
        line.clear();
        if reader.read_line(&mut line).map_err(io_err)? == 0 {
            break;
        }
        let qual_str = line.trim_end().to_string();

        records.push(FastqRecord {
            id: header_str
                .split_whitespace()
                .next()
                .unwrap_or(header_str)
                .to_string(),
            header_line: header_str.to_string(),
            seq: seq_str,
            quals: qual_str,
        });
    }

    Ok(records)
}
