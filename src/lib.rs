//! Fetch-and-aggregate pipeline around the [`election_analytics`] core.
//!
//! One pass per user selection: the source registry resolves the tally
//! sources, the loader fans out over them in parallel, and the engine
//! aggregates the combined record set and commits the result unless the
//! pass was cancelled in flight.

use snafu::Snafu;

pub mod directory;
pub mod engine;
pub mod loader;
pub mod registry;
pub mod report;

#[derive(Debug, Snafu)]
pub enum EngineError {
    #[snafu(display("Error opening source {path}"))]
    SourceOpen {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing csv source {path}"))]
    CsvParse { source: csv::Error, path: String },
    #[snafu(display("Error opening workbook {path}"))]
    WorkbookOpen {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("Workbook {path} has no worksheet"))]
    EmptyWorkbook { path: String },
    #[snafu(display("Error loading the polling location directory from {path}"))]
    LocationSource {
        #[snafu(source(from(EngineError, Box::new)))]
        source: Box<EngineError>,
        path: String,
    },
    #[snafu(display("Error writing report to {path}"))]
    WritingReport {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error serializing report"))]
    SerializingReport { source: serde_json::Error },
    #[snafu(display("Error reading reference summary {path}"))]
    OpeningReference {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing reference summary {path}"))]
    ParsingReference {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Report differs from the reference summary {path}"))]
    ReferenceMismatch { path: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type EngineResult<T> = Result<T, EngineError>;
