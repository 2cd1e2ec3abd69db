//! Raw record loading: fetches tally sources, decodes their fixed
//! positional schema and enriches each record with location metadata.
//!
//! Failures stay local to one source: a fetch or parse error is logged and
//! the source contributes nothing, while the other sources of the same
//! query still produce records.

use log::{debug, info, warn};
use rayon::prelude::*;
use snafu::prelude::*;
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;

use calamine::{DataType, Reader, Xlsx};
use election_analytics::{round_of, LocationKey, RawVoteRecord};

use crate::directory::LocationIndex;
use crate::engine::CancellationToken;
use crate::registry::{SourceId, SourceProvider, SourceRegistry};
use crate::{
    CsvParseSnafu, EmptyWorkbookSnafu, EngineResult, SourceOpenSnafu, WorkbookOpenSnafu,
};

// Fixed positional schema of tally rows. Columns 4, 5 and 7 exist in the
// sources but carry nothing this pipeline consumes.
const COL_MUNICIPALITY: usize = 0;
const COL_ZONE: usize = 1;
const COL_SECTION: usize = 2;
const COL_LOCATION_CODE: usize = 3;
const COL_PARTY: usize = 6;
const COL_ELIGIBLE_VOTERS: usize = 8;
const COL_TURNOUT: usize = 9;
const COL_ABSTENTION: usize = 10;
const COL_CANDIDATE_NUMBER: usize = 11;
const COL_CANDIDATE_NAME: usize = 12;
const COL_VOTES: usize = 13;

/// Transport seam of the loader. The pipeline only requires fetching a
/// named resource as bytes; HTTP, filesystem and in-memory transports all
/// fit behind it.
pub trait SourceFetcher: Send + Sync {
    fn fetch(&self, file_name: &str) -> EngineResult<Vec<u8>>;
}

/// Fetches sources from a local data directory.
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new<P: Into<PathBuf>>(root: P) -> FileFetcher {
        FileFetcher { root: root.into() }
    }
}

impl SourceFetcher for FileFetcher {
    fn fetch(&self, file_name: &str) -> EngineResult<Vec<u8>> {
        let path = self.root.join(file_name);
        fs::read(&path).context(SourceOpenSnafu {
            path: path.display().to_string(),
        })
    }
}

/// In-memory fetcher, mostly for tests and embedding.
#[derive(Default)]
pub struct MemoryFetcher {
    files: std::collections::HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    pub fn new() -> MemoryFetcher {
        MemoryFetcher::default()
    }

    pub fn insert(&mut self, file_name: &str, contents: impl Into<Vec<u8>>) {
        self.files.insert(file_name.to_string(), contents.into());
    }
}

impl SourceFetcher for MemoryFetcher {
    fn fetch(&self, file_name: &str) -> EngineResult<Vec<u8>> {
        match self.files.get(file_name) {
            Some(bytes) => Ok(bytes.clone()),
            None => whatever!("No in-memory source named {}", file_name),
        }
    }
}

/// Loads every source of one logical query, in parallel.
///
/// The cancellation token is checked around each fetch; once cancelled, a
/// source contributes nothing. Per-source failures are absorbed (warned
/// and skipped) so the pass completes with whatever sources succeeded.
pub fn load_sources(
    sources: &[SourceId],
    registry: &SourceRegistry,
    index: &LocationIndex,
    fetcher: &dyn SourceFetcher,
    token: &CancellationToken,
) -> Vec<RawVoteRecord> {
    let records: Vec<RawVoteRecord> = sources
        .par_iter()
        .map(|source| {
            if token.is_cancelled() {
                debug!("load_sources: token cancelled, skipping {}", source.name);
                return Vec::new();
            }
            match load_one(source, registry, index, fetcher) {
                Ok(_) if token.is_cancelled() => {
                    // The fetch settled after cancellation; drop the result.
                    debug!("load_sources: late result for {} discarded", source.name);
                    Vec::new()
                }
                Ok(records) => {
                    info!("load_sources: {} rows from {}", records.len(), source.name);
                    records
                }
                Err(e) => {
                    warn!(
                        "load_sources: source {} failed, continuing without it: {}",
                        source.name, e
                    );
                    Vec::new()
                }
            }
        })
        .reduce(Vec::new, |mut acc, mut chunk| {
            acc.append(&mut chunk);
            acc
        });
    records
}

/// Fetches and decodes a single source.
pub fn load_one(
    source: &SourceId,
    registry: &SourceRegistry,
    index: &LocationIndex,
    fetcher: &dyn SourceFetcher,
) -> EngineResult<Vec<RawVoteRecord>> {
    let bytes = fetcher.fetch(&source.file_name)?;
    let rows = match source.provider {
        SourceProvider::Csv => read_csv_rows(&bytes, &source.file_name)?,
        SourceProvider::Xlsx => read_xlsx_rows(bytes, &source.file_name)?,
    };
    let has_second_round = registry.has_second_round(source.office, source.cycle);
    // The first row is the header.
    let records = rows
        .iter()
        .skip(1)
        .map(|row| decode_row(row, source, has_second_round, index))
        .collect();
    Ok(records)
}

pub(crate) fn read_csv_rows(bytes: &[u8], path: &str) -> EngineResult<Vec<Vec<String>>> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.into_records() {
        let record = record.context(CsvParseSnafu { path })?;
        rows.push(record.iter().map(|cell| cell.to_string()).collect());
    }
    Ok(rows)
}

fn read_xlsx_rows(bytes: Vec<u8>, path: &str) -> EngineResult<Vec<Vec<String>>> {
    let mut workbook: Xlsx<_> =
        Xlsx::new(Cursor::new(bytes)).context(WorkbookOpenSnafu { path })?;
    let range = workbook
        .worksheet_range_at(0)
        .context(EmptyWorkbookSnafu { path })?
        .context(WorkbookOpenSnafu { path })?;
    let rows = range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();
    Ok(rows)
}

fn cell_to_string(cell: &DataType) -> String {
    match cell {
        DataType::String(s) => s.clone(),
        DataType::Int(i) => i.to_string(),
        DataType::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        DataType::Float(f) => f.to_string(),
        DataType::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Decodes one positional row into a record, enriched from the location
/// index. Never fails: missing cells read as empty, unparsable counts as 0.
fn decode_row(
    cells: &[String],
    source: &SourceId,
    has_second_round: bool,
    index: &LocationIndex,
) -> RawVoteRecord {
    let municipality = cell(cells, COL_MUNICIPALITY);
    let zone = cell(cells, COL_ZONE);
    let section = cell(cells, COL_SECTION);
    let location_code = cell(cells, COL_LOCATION_CODE);
    let candidate_number = cell(cells, COL_CANDIDATE_NUMBER);

    let location = index.lookup(&LocationKey {
        municipality: municipality.clone(),
        zone: zone.clone(),
        section: section.clone(),
        location_code: location_code.clone(),
    });

    let round = source
        .round
        .or_else(|| round_of(&candidate_number, source.office, has_second_round));

    RawVoteRecord {
        municipality,
        zone,
        section,
        location_code,
        candidate_number,
        candidate_name: cell(cells, COL_CANDIDATE_NAME),
        votes: parse_count(&cell(cells, COL_VOTES)),
        party: cell(cells, COL_PARTY),
        office: source.office,
        year: source.cycle,
        round,
        eligible_voters: parse_count(&cell(cells, COL_ELIGIBLE_VOTERS)),
        turnout: parse_count(&cell(cells, COL_TURNOUT)),
        abstention: parse_count(&cell(cells, COL_ABSTENTION)),
        location_name: location.name.clone(),
        address: location.address.clone(),
        neighborhood: location.neighborhood.clone(),
    }
}

fn cell(cells: &[String], index: usize) -> String {
    cells
        .get(index)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Total-tolerant count parsing: thousands separators are stripped, and
/// anything that still fails to parse resolves to 0.
fn parse_count(cell: &str) -> u64 {
    let cleaned: String = cell
        .chars()
        .filter(|c| *c != '.' && *c != ',' && !c.is_whitespace())
        .collect();
    cleaned.parse::<u64>().unwrap_or(0)
}
