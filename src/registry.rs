//! Static lookup from (office, cycle, round) to the raw tally sources.
//!
//! Unknown combinations resolve to an empty list: "no sources" is a valid
//! empty-result input for the pipeline, not a failure.

use election_analytics::{Office, Round};

/// File holding the canonical polling-location directory.
pub const LOCATION_SOURCE_FILE: &str = "polling_locations.csv";

/// The storage format of one source file.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum SourceProvider {
    Csv,
    Xlsx,
}

/// One raw tally source: a fetchable tabular resource carrying the rows of
/// a single office/cycle (and round, for offices with runoffs).
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SourceId {
    /// Logical name, used in logs and reports.
    pub name: String,
    /// File name resolved by the fetcher.
    pub file_name: String,
    pub provider: SourceProvider,
    pub office: Office,
    pub cycle: u16,
    pub round: Option<Round>,
}

/// Static registry of the known tally sources.
pub struct SourceRegistry;

// One registry row: round tag, file name, provider.
type SourceEntry = (Option<Round>, &'static str, SourceProvider);

impl SourceRegistry {
    pub fn new() -> SourceRegistry {
        SourceRegistry
    }

    /// Resolves the sources of one office/cycle selection.
    ///
    /// With `round = None`, offices with runoffs get the union of both
    /// rounds; offices without runoffs always return their single unsplit
    /// list. With a round given, only that round's subset is returned
    /// (empty for offices without runoffs asked for a second round).
    pub fn resolve_sources(
        &self,
        office: Office,
        cycle: u16,
        round: Option<Round>,
    ) -> Vec<SourceId> {
        entries(office, cycle)
            .iter()
            .filter(|(entry_round, _, _)| match round {
                None => true,
                Some(r) => *entry_round == Some(r) || entry_round.is_none() && r == Round::First,
            })
            .map(|(entry_round, file_name, provider)| SourceId {
                name: source_name(office, cycle, *entry_round, file_name),
                file_name: (*file_name).to_string(),
                provider: *provider,
                office,
                cycle,
                round: *entry_round,
            })
            .collect()
    }

    /// Whether a second-round source exists for this office/cycle. This is
    /// the round-scoped subset query backing round classification, derived
    /// from the same table as [`SourceRegistry::resolve_sources`] so the
    /// two can never disagree.
    pub fn has_second_round(&self, office: Office, cycle: u16) -> bool {
        entries(office, cycle)
            .iter()
            .any(|(round, _, _)| *round == Some(Round::Second))
    }

    /// The designated reference source of a cycle, used for section
    /// metrics: the top-of-ballot office's first round, independent of
    /// whichever office is being analyzed.
    pub fn reference_source(&self, cycle: u16) -> Option<SourceId> {
        let office = match cycle {
            2018 | 2022 => Office::President,
            2016 | 2020 => Office::Mayor,
            _ => return None,
        };
        self.resolve_sources(office, cycle, Some(Round::First))
            .into_iter()
            .next()
    }

    /// The canonical polling-location source.
    pub fn location_source(&self) -> SourceId {
        SourceId {
            name: "polling-locations".to_string(),
            file_name: LOCATION_SOURCE_FILE.to_string(),
            provider: SourceProvider::Csv,
            office: Office::President,
            cycle: 0,
            round: None,
        }
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        SourceRegistry::new()
    }
}

fn source_name(
    office: Office,
    cycle: u16,
    round: Option<Round>,
    file_name: &str,
) -> String {
    let mut name = format!("{}-{}", office.label(), cycle);
    if let Some(r) = round {
        name.push('-');
        name.push_str(match r {
            Round::First => "r1",
            Round::Second => "r2",
        });
    }
    // Split sources keep their file stem distinguishable in logs.
    if let Some(stem) = file_name.strip_suffix(".csv").or_else(|| file_name.strip_suffix(".xlsx")) {
        if let Some(suffix) = stem.rsplit('_').next() {
            if suffix.len() == 1 {
                name.push('-');
                name.push_str(suffix);
            }
        }
    }
    name
}

fn entries(office: Office, cycle: u16) -> Vec<SourceEntry> {
    use Office::*;
    use SourceProvider::*;
    match (office, cycle) {
        (President, 2018) => vec![
            (Some(Round::First), "president_2018_r1.csv", Csv),
            (Some(Round::Second), "president_2018_r2.csv", Csv),
        ],
        (President, 2022) => vec![
            (Some(Round::First), "president_2022_r1.csv", Csv),
            (Some(Round::Second), "president_2022_r2.csv", Csv),
        ],
        (Governor, 2018) => vec![
            (Some(Round::First), "governor_2018_r1.csv", Csv),
            (Some(Round::Second), "governor_2018_r2.csv", Csv),
        ],
        // The 2022 governor race was decided in the first round; no
        // second-round source exists for it.
        (Governor, 2022) => vec![(Some(Round::First), "governor_2022_r1.csv", Csv)],
        (Senator, 2018) => vec![(None, "senator_2018.csv", Csv)],
        (Senator, 2022) => vec![(None, "senator_2022.csv", Csv)],
        (FederalDeputy, 2018) => vec![(None, "federal_deputy_2018.csv", Csv)],
        (FederalDeputy, 2022) => vec![(None, "federal_deputy_2022.csv", Csv)],
        (StateDeputy, 2018) => vec![(None, "state_deputy_2018.csv", Csv)],
        // The 2022 state-deputy tally is published split in two files;
        // both contribute to the same logical query.
        (StateDeputy, 2022) => vec![
            (None, "state_deputy_2022_a.csv", Csv),
            (None, "state_deputy_2022_b.csv", Csv),
        ],
        (Mayor, 2016) => vec![(Some(Round::First), "mayor_2016_r1.csv", Csv)],
        (Mayor, 2020) => vec![
            (Some(Round::First), "mayor_2020_r1.csv", Csv),
            (Some(Round::Second), "mayor_2020_r2.xlsx", Xlsx),
        ],
        (Councilor, 2016) => vec![(None, "councilor_2016.csv", Csv)],
        (Councilor, 2020) => vec![(None, "councilor_2020.csv", Csv)],
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_combinations_resolve_to_empty() {
        let registry = SourceRegistry::new();
        assert!(registry.resolve_sources(Office::Mayor, 2018, None).is_empty());
        assert!(registry
            .resolve_sources(Office::President, 1998, None)
            .is_empty());
    }

    #[test]
    fn omitted_round_unions_both_rounds() {
        let registry = SourceRegistry::new();
        let sources = registry.resolve_sources(Office::President, 2022, None);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].round, Some(Round::First));
        assert_eq!(sources[1].round, Some(Round::Second));
    }

    #[test]
    fn round_scoped_query_returns_the_subset() {
        let registry = SourceRegistry::new();
        let second = registry.resolve_sources(Office::President, 2022, Some(Round::Second));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].file_name, "president_2022_r2.csv");
    }

    #[test]
    fn unsplit_offices_answer_the_first_round_query() {
        let registry = SourceRegistry::new();
        let first = registry.resolve_sources(Office::Senator, 2022, Some(Round::First));
        assert_eq!(first.len(), 1);
        let second = registry.resolve_sources(Office::Senator, 2022, Some(Round::Second));
        assert!(second.is_empty());
    }

    #[test]
    fn second_round_existence_follows_the_table() {
        let registry = SourceRegistry::new();
        assert!(registry.has_second_round(Office::Governor, 2018));
        assert!(!registry.has_second_round(Office::Governor, 2022));
        assert!(!registry.has_second_round(Office::Senator, 2022));
    }

    #[test]
    fn reference_source_is_top_of_ballot_first_round() {
        let registry = SourceRegistry::new();
        let statewide = registry.reference_source(2022).unwrap();
        assert_eq!(statewide.office, Office::President);
        assert_eq!(statewide.round, Some(Round::First));
        let municipal = registry.reference_source(2020).unwrap();
        assert_eq!(municipal.office, Office::Mayor);
        assert!(registry.reference_source(2019).is_none());
    }

    #[test]
    fn split_sources_all_resolve() {
        let registry = SourceRegistry::new();
        let sources = registry.resolve_sources(Office::StateDeputy, 2022, None);
        assert_eq!(sources.len(), 2);
        assert_ne!(sources[0].name, sources[1].name);
    }
}
