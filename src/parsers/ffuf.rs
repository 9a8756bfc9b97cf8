use std::io;
use std::path::Path;

/// Column holding the matched value in ffuf's CSV output.
const INPUT_COLUMN: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfufHit {
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FfufResults {
    /// At least one data row.
    Hits(Vec<FfufHit>),
    /// Header only, empty file, or only malformed rows.
    NoHits,
}

impl FfufResults {
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            FfufResults::Hits(hits) => hits.iter().map(|h| h.input.as_str()).collect(),
            FfufResults::NoHits => Vec::new(),
        }
    }
}

pub fn parse_ffuf_file(path: &Path) -> io::Result<FfufResults> {
    let reader = csv_reader().from_path(path).map_err(io::Error::from)?;
    collect_hits(reader)
}

pub fn parse_ffuf_csv(content: &str) -> io::Result<FfufResults> {
    collect_hits(csv_reader().from_reader(content.as_bytes()))
}

/// The first record is treated as the header; short rows must not abort
/// the read.
fn csv_reader() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(false).flexible(true);
    builder
}

fn collect_hits<R: io::Read>(mut reader: csv::Reader<R>) -> io::Result<FfufResults> {
    let mut records = reader.records();

    // header
    match records.next() {
        None => return Ok(FfufResults::NoHits),
        Some(header) => {
            header.map_err(io::Error::from)?;
        }
    }

    let mut hits = Vec::new();
    for record in records {
        let record = record.map_err(io::Error::from)?;
        if let Some(input) = record.get(INPUT_COLUMN) {
            hits.push(FfufHit {
                input: input.to_string(),
            });
        }
    }

    Ok(if hits.is_empty() {
        FfufResults::NoHits
    } else {
        FfufResults::Hits(hits)
    })
}
