use clap::{Parser, Subcommand};

/// Comparative analytics over per-section electoral tallies.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (directory path) The directory holding the raw tally sources and the
    /// polling-location source.
    #[clap(long, value_parser, default_value = ".")]
    pub data_dir: String,

    /// (directory path or empty) If specified, the polling-location
    /// directory cache is kept here between runs.
    #[clap(long, value_parser)]
    pub cache_dir: Option<String>,

    /// (file path, 'stdout' or empty) Where the JSON report is written.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference report in JSON format. If provided, the
    /// computed report must match the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// If passed as an argument, will turn on verbose logging to the
    /// standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Compare two candidates of different offices in the same cycle.
    CompareOffices {
        #[clap(long)]
        cycle: u16,
        #[clap(long)]
        office_a: String,
        #[clap(long)]
        office_b: String,
        /// Candidate name on the office-a side.
        #[clap(long)]
        name_a: String,
        #[clap(long)]
        party_a: String,
        /// Candidate name on the office-b side.
        #[clap(long)]
        name_b: String,
        #[clap(long)]
        party_b: String,
        /// Round (1 or 2); both rounds when omitted.
        #[clap(long)]
        round: Option<u8>,
        #[clap(long)]
        municipality: Option<String>,
        #[clap(long)]
        neighborhood: Option<String>,
    },
    /// Compare one candidate's performance across two cycles.
    CompareYears {
        #[clap(long)]
        office: String,
        #[clap(long)]
        cycle_a: u16,
        #[clap(long)]
        cycle_b: u16,
        #[clap(long)]
        name: String,
        #[clap(long)]
        party: String,
        #[clap(long)]
        round: Option<u8>,
        #[clap(long)]
        municipality: Option<String>,
        #[clap(long)]
        neighborhood: Option<String>,
        /// Half-span of the color domain, in percentage points.
        #[clap(long)]
        domain: Option<f64>,
    },
    /// Candidate performance view: aggregated rows and rankings.
    Candidate {
        #[clap(long)]
        office: String,
        #[clap(long)]
        cycle: u16,
        #[clap(long)]
        name: String,
        #[clap(long)]
        party: String,
        #[clap(long)]
        round: Option<u8>,
        #[clap(long)]
        municipality: Option<String>,
        #[clap(long)]
        neighborhood: Option<String>,
        /// Grouping axis: 'section' or 'municipality'.
        #[clap(long, default_value = "municipality")]
        dimension: String,
    },
    /// Rank municipalities by one candidate's votes.
    Rank {
        #[clap(long)]
        office: String,
        #[clap(long)]
        cycle: u16,
        #[clap(long)]
        name: String,
        #[clap(long)]
        party: String,
        #[clap(long)]
        round: Option<u8>,
    },
    /// Choropleth map feed comparing two cycles.
    Map {
        #[clap(long)]
        office: String,
        #[clap(long)]
        cycle_a: u16,
        #[clap(long)]
        cycle_b: u16,
        /// 'vote-share' (requires a candidate), 'turnout' or 'abstention'.
        #[clap(long, default_value = "vote-share")]
        metric: String,
        #[clap(long)]
        name: Option<String>,
        #[clap(long)]
        party: Option<String>,
        #[clap(long)]
        round: Option<u8>,
        /// Half-span of the color domain, in percentage points.
        #[clap(long)]
        domain: Option<f64>,
    },
    /// Turnout and vote-class summary for one office/cycle selection.
    Summary {
        #[clap(long)]
        office: String,
        #[clap(long)]
        cycle: u16,
        #[clap(long)]
        round: Option<u8>,
        #[clap(long)]
        municipality: Option<String>,
    },
}
