//! Pass orchestration: one fetch-and-aggregate pass per user selection,
//! with cooperative cancellation and a single commit point.
//!
//! Lifecycle of a pass: `Idle -> Loading -> {Loaded | Aborted}`. Starting
//! a new pass cancels the previous pass's token; an aborted pass's partial
//! results are never committed.

use log::{debug, info};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use election_analytics::{
    aggregate_votes, build_section_metrics, AggregateKey, Dimension, DimensionAggregate, Office,
    RawVoteRecord, RecordFilter, Round, SectionKey, SectionMetrics,
};

use crate::directory::LocationDirectory;
use crate::loader::{load_sources, SourceFetcher};
use crate::registry::SourceRegistry;
use crate::EngineResult;

/// Cooperative cancellation flag, threaded explicitly through the
/// fetch-and-aggregate call chain and checked at the commit point.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Data-loading lifecycle of the engine, not business state.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum PassState {
    Idle,
    Loading,
    Loaded,
    Aborted,
}

/// One office/cycle(/round) period of a selection.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Period {
    pub office: Office,
    pub cycle: u16,
    pub round: Option<Round>,
}

impl Period {
    pub fn new(office: Office, cycle: u16, round: Option<Round>) -> Period {
        Period {
            office,
            cycle,
            round,
        }
    }

    pub fn label(&self) -> String {
        match self.round {
            Some(r) => format!("{} {} ({})", self.office, self.cycle, r.label()),
            None => format!("{} {}", self.office, self.cycle),
        }
    }
}

/// A user parameter selection: the periods to load plus the record filter
/// applied at aggregation time.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Selection {
    pub periods: Vec<Period>,
    pub filter: RecordFilter,
}

/// Loaded data of one period: raw records plus the section metrics built
/// from the cycle's reference source.
pub struct PeriodData {
    pub period: Period,
    pub records: Vec<RawVoteRecord>,
    pub section_metrics: HashMap<SectionKey, SectionMetrics>,
}

impl PeriodData {
    /// Aggregates this period's records under the given filter.
    pub fn aggregate(
        &self,
        dimension: Dimension,
        filter: &RecordFilter,
    ) -> HashMap<AggregateKey, DimensionAggregate> {
        aggregate_votes(&self.records, dimension, filter)
    }
}

/// The committed result of one pass.
pub struct PassOutput {
    pub periods: Vec<PeriodData>,
    pub filter: RecordFilter,
}

/// The fetch-and-aggregate engine. Everything is recomputed from raw
/// sources on every pass; only the location directory is cached.
pub struct ComparisonEngine {
    registry: SourceRegistry,
    directory: LocationDirectory,
    fetcher: Box<dyn SourceFetcher>,
    state: Mutex<PassState>,
    current_token: Mutex<CancellationToken>,
    committed: Mutex<Option<Arc<PassOutput>>>,
}

impl ComparisonEngine {
    pub fn new(fetcher: Box<dyn SourceFetcher>, cache_dir: Option<PathBuf>) -> ComparisonEngine {
        ComparisonEngine {
            registry: SourceRegistry::new(),
            directory: LocationDirectory::new(cache_dir),
            fetcher,
            state: Mutex::new(PassState::Idle),
            current_token: Mutex::new(CancellationToken::new()),
            committed: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn state(&self) -> PassState {
        *self.state.lock().unwrap()
    }

    /// The output of the last committed pass, if any.
    pub fn committed(&self) -> Option<Arc<PassOutput>> {
        self.committed.lock().unwrap().clone()
    }

    /// Starts a new pass: the previous pass's token is cancelled and a
    /// fresh token is issued for the caller to thread through
    /// [`ComparisonEngine::run_pass`].
    pub fn begin_pass(&self) -> CancellationToken {
        let mut current = self.current_token.lock().unwrap();
        current.cancel();
        let fresh = CancellationToken::new();
        *current = fresh.clone();
        fresh
    }

    /// Runs one fetch-and-aggregate pass.
    ///
    /// Returns `Ok(None)` when the pass was cancelled: not an error, the
    /// partial results are simply discarded before the commit point. The
    /// only hard error is a location directory that cannot be loaded.
    pub fn run_pass(
        &self,
        selection: &Selection,
        token: &CancellationToken,
    ) -> EngineResult<Option<Arc<PassOutput>>> {
        self.set_state(PassState::Loading);
        info!("pass started: {} period(s)", selection.periods.len());

        let index = match self.directory.load(self.fetcher.as_ref()) {
            Ok(index) => index,
            Err(e) => {
                self.set_state(PassState::Idle);
                return Err(e);
            }
        };

        let mut periods: Vec<PeriodData> = Vec::with_capacity(selection.periods.len());
        for period in &selection.periods {
            let sources =
                self.registry
                    .resolve_sources(period.office, period.cycle, period.round);
            if sources.is_empty() {
                // A valid empty-result input, not a failure.
                info!("no sources for {}", period.label());
            }
            let records =
                load_sources(&sources, &self.registry, &index, self.fetcher.as_ref(), token);

            let reference_records = match self.registry.reference_source(period.cycle) {
                Some(reference) => load_sources(
                    &[reference],
                    &self.registry,
                    &index,
                    self.fetcher.as_ref(),
                    token,
                ),
                None => Vec::new(),
            };
            let section_metrics = build_section_metrics(&reference_records);

            debug!(
                "pass period {}: {} records, {} sections with metrics",
                period.label(),
                records.len(),
                section_metrics.len()
            );
            periods.push(PeriodData {
                period: period.clone(),
                records,
                section_metrics,
            });
        }

        // The single commit point: a cancelled pass never publishes.
        if token.is_cancelled() {
            info!("pass aborted, partial results discarded");
            self.set_state(PassState::Aborted);
            return Ok(None);
        }

        let output = Arc::new(PassOutput {
            periods,
            filter: selection.filter.clone(),
        });
        *self.committed.lock().unwrap() = Some(output.clone());
        self.set_state(PassState::Loaded);
        info!("pass committed");
        Ok(Some(output))
    }

    fn set_state(&self, state: PassState) {
        *self.state.lock().unwrap() = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryFetcher;
    use crate::registry::LOCATION_SOURCE_FILE;

    const LOCATIONS_CSV: &str = "municipality,zone,section,location,name,address,neighborhood\n\
        RIVERTON,7,101,1015,CENTRAL SCHOOL,MAIN ST 1,CENTER\n";

    const HEADER: &str =
        "municipality,zone,section,location,a,b,party,c,eligible,turnout,abstention,number,name,votes\n";

    fn engine_with_governor_2018() -> ComparisonEngine {
        let mut fetcher = MemoryFetcher::new();
        fetcher.insert(LOCATION_SOURCE_FILE, LOCATIONS_CSV);
        fetcher.insert(
            "governor_2018_r1.csv",
            format!(
                "{}RIVERTON,7,101,1015,x,y,PWT,z,400,320,80,40,ALICE VANCE,100\n\
                 RIVERTON,7,101,1015,x,y,UDN,z,400,320,80,23,BO REN,60\n",
                HEADER
            ),
        );
        fetcher.insert(
            "governor_2018_r2.csv",
            format!(
                "{}RIVERTON,7,101,1015,x,y,PWT,z,400,320,80,40,ALICE VANCE,130\n",
                HEADER
            ),
        );
        fetcher.insert(
            "president_2018_r1.csv",
            format!(
                "{}RIVERTON,7,101,1015,x,y,PWT,z,400,318,82,12,DANA POL,200\n",
                HEADER
            ),
        );
        ComparisonEngine::new(Box::new(fetcher), None)
    }

    fn governor_selection(round: Option<Round>) -> Selection {
        Selection {
            periods: vec![Period::new(Office::Governor, 2018, round)],
            filter: RecordFilter::default(),
        }
    }

    #[test]
    fn a_pass_loads_aggregates_and_commits() {
        let engine = engine_with_governor_2018();
        assert_eq!(engine.state(), PassState::Idle);
        let token = engine.begin_pass();
        let output = engine
            .run_pass(&governor_selection(Some(Round::First)), &token)
            .unwrap()
            .unwrap();
        assert_eq!(engine.state(), PassState::Loaded);
        assert_eq!(output.periods.len(), 1);
        let data = &output.periods[0];
        assert_eq!(data.records.len(), 2);
        // Metrics come from the reference source, not the governor tally.
        let metrics = data.section_metrics.values().next().unwrap();
        assert_eq!(metrics.turnout, 318);
        let aggregates = data.aggregate(Dimension::Municipality, &output.filter);
        let aggregate = aggregates
            .get(&AggregateKey::Municipality("RIVERTON".to_string()))
            .unwrap();
        assert_eq!(aggregate.total_valid_votes, 160);
    }

    #[test]
    fn a_cancelled_pass_never_commits() {
        let engine = engine_with_governor_2018();
        let stale = engine.begin_pass();
        // A new pass begins before the first finishes; the first token is
        // now stale.
        let fresh = engine.begin_pass();
        assert!(stale.is_cancelled());

        let result = engine
            .run_pass(&governor_selection(Some(Round::First)), &stale)
            .unwrap();
        assert!(result.is_none());
        assert_eq!(engine.state(), PassState::Aborted);
        assert!(engine.committed().is_none());

        // The fresh pass commits normally.
        let output = engine
            .run_pass(&governor_selection(Some(Round::First)), &fresh)
            .unwrap();
        assert!(output.is_some());
        assert_eq!(engine.state(), PassState::Loaded);
        assert!(engine.committed().is_some());
    }

    #[test]
    fn unknown_selections_commit_an_empty_result() {
        let engine = engine_with_governor_2018();
        let token = engine.begin_pass();
        let selection = Selection {
            periods: vec![Period::new(Office::Mayor, 2018, None)],
            filter: RecordFilter::default(),
        };
        let output = engine.run_pass(&selection, &token).unwrap().unwrap();
        assert_eq!(engine.state(), PassState::Loaded);
        assert!(output.periods[0].records.is_empty());
    }

    #[test]
    fn directory_failure_is_the_one_hard_error() {
        let engine = ComparisonEngine::new(Box::new(MemoryFetcher::new()), None);
        let token = engine.begin_pass();
        let result = engine.run_pass(&governor_selection(None), &token);
        assert!(result.is_err());
        assert_eq!(engine.state(), PassState::Idle);
        assert!(engine.committed().is_none());
    }

    #[test]
    fn omitted_round_unions_both_rounds_of_the_selection() {
        let engine = engine_with_governor_2018();
        let token = engine.begin_pass();
        let output = engine
            .run_pass(&governor_selection(None), &token)
            .unwrap()
            .unwrap();
        assert_eq!(output.periods[0].records.len(), 3);
    }
}
