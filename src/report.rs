//! Report assembly: turns committed pass data into the flat JSON
//! structures the presentation layer consumes, and checks them against a
//! reference summary when one is provided.

use log::warn;
use serde::Serialize;
use snafu::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::str::FromStr;

use election_analytics::{
    percentage, rank_candidates, variation_points, AggregateKey, CandidateIdentity, ColorScale,
    Dimension, DimensionAggregate, MunicipalityRank, RecordFilter,
};
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::engine::PeriodData;
use crate::{
    EngineResult, OpeningReferenceSnafu, ParsingReferenceSnafu, ReferenceMismatchSnafu,
    SerializingReportSnafu, WritingReportSnafu,
};

// **** Output structures ****

/// One row of a flat per-dimension aggregation table.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedRow {
    pub name: String,
    pub candidate: String,
    pub party: String,
    pub votes: u64,
    #[serde(rename = "totalValidVotes")]
    pub total_valid_votes: u64,
    pub percentage: f64,
}

/// One map-ready municipality entry.
#[derive(Debug, Clone, Serialize)]
pub struct MapEntry {
    pub name: String,
    #[serde(rename = "valueForPeriodA")]
    pub value_for_period_a: f64,
    #[serde(rename = "valueForPeriodB")]
    pub value_for_period_b: f64,
    #[serde(rename = "percentageChange")]
    pub percentage_change: f64,
    pub color: String,
    #[serde(rename = "infoText")]
    pub info_text: String,
}

/// Ranked candidates of one dimension key.
#[derive(Debug, Clone, Serialize)]
pub struct RankingBlock {
    pub name: String,
    pub entries: Vec<RankingRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankingRow {
    pub rank: u32,
    pub candidate: String,
    pub party: String,
    pub votes: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MunicipalityRankRow {
    pub rank: u32,
    pub municipality: String,
    pub votes: u64,
    pub percentage: f64,
}

/// Per-municipality comparison of two periods (or two candidates).
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonRow {
    pub name: String,
    #[serde(rename = "votesA")]
    pub votes_a: u64,
    #[serde(rename = "percentageA")]
    pub percentage_a: f64,
    #[serde(rename = "votesB")]
    pub votes_b: u64,
    #[serde(rename = "percentageB")]
    pub percentage_b: f64,
    /// Percentage-point variation of the vote shares.
    pub variation: f64,
}

/// Comparative summary scalars of one period selection.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub period: String,
    #[serde(rename = "eligibleVoters")]
    pub eligible_voters: u64,
    pub turnout: u64,
    pub abstention: u64,
    #[serde(rename = "turnoutPercentage")]
    pub turnout_percentage: f64,
    #[serde(rename = "abstentionPercentage")]
    pub abstention_percentage: f64,
    #[serde(rename = "validVotes")]
    pub valid_votes: u64,
    #[serde(rename = "blankVotes")]
    pub blank_votes: u64,
    #[serde(rename = "nullVotes")]
    pub null_votes: u64,
}

/// What a map feed plots per municipality.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum MapMetric {
    VoteShare,
    Turnout,
    Abstention,
}

impl MapMetric {
    /// Conventional color domain half-span, in percentage points.
    pub fn default_domain(&self) -> f64 {
        match self {
            MapMetric::VoteShare => 20.0,
            MapMetric::Turnout | MapMetric::Abstention => 10.0,
        }
    }
}

impl FromStr for MapMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vote-share" => Ok(MapMetric::VoteShare),
            "turnout" => Ok(MapMetric::Turnout),
            "abstention" => Ok(MapMetric::Abstention),
            x => Err(format!("unknown map metric: {:?}", x)),
        }
    }
}

// **** Builders ****

/// Flattens aggregates into table rows, one per (key, candidate), ordered
/// by key name and then by rank within the key.
pub fn aggregated_rows(
    aggregates: &HashMap<AggregateKey, DimensionAggregate>,
) -> Vec<AggregatedRow> {
    let mut keys: Vec<&AggregateKey> = aggregates.keys().collect();
    keys.sort();
    let mut rows: Vec<AggregatedRow> = Vec::new();
    for key in keys {
        let aggregate = &aggregates[key];
        for ranked in rank_candidates(&aggregate.candidate_totals) {
            rows.push(AggregatedRow {
                name: key.to_string(),
                candidate: ranked.identity.name.clone(),
                party: ranked.identity.party.clone(),
                votes: ranked.votes,
                total_valid_votes: aggregate.total_valid_votes,
                percentage: percentage(ranked.votes, aggregate.total_valid_votes),
            });
        }
    }
    rows
}

/// Ranking lists per dimension key.
pub fn ranking_blocks(
    aggregates: &HashMap<AggregateKey, DimensionAggregate>,
) -> Vec<RankingBlock> {
    let mut keys: Vec<&AggregateKey> = aggregates.keys().collect();
    keys.sort();
    keys.iter()
        .map(|key| {
            let aggregate = &aggregates[*key];
            let entries = rank_candidates(&aggregate.candidate_totals)
                .into_iter()
                .map(|ranked| RankingRow {
                    rank: ranked.rank,
                    candidate: ranked.identity.name.clone(),
                    party: ranked.identity.party.clone(),
                    votes: ranked.votes,
                    percentage: percentage(ranked.votes, aggregate.total_valid_votes),
                })
                .collect();
            RankingBlock {
                name: key.to_string(),
                entries,
            }
        })
        .collect()
}

pub fn municipality_ranking_rows(ranked: &[MunicipalityRank]) -> Vec<MunicipalityRankRow> {
    ranked
        .iter()
        .map(|r| MunicipalityRankRow {
            rank: r.rank,
            municipality: r.municipality.clone(),
            votes: r.votes,
            percentage: r.percentage,
        })
        .collect()
}

/// Per-municipality share of one candidate, with the vote count.
fn municipality_shares(
    data: &PeriodData,
    identity: &CandidateIdentity,
    filter: &RecordFilter,
) -> HashMap<String, (u64, f64)> {
    data.aggregate(Dimension::Municipality, filter)
        .into_iter()
        .filter_map(|(key, aggregate)| match key {
            AggregateKey::Municipality(name) => {
                let votes = aggregate.votes_for(identity);
                Some((
                    name,
                    (votes, percentage(votes, aggregate.total_valid_votes)),
                ))
            }
            AggregateKey::Section(_) => None,
        })
        .collect()
}

/// Per-municipality turnout or abstention rate from the section metrics.
fn municipality_rates(data: &PeriodData, metric: MapMetric) -> HashMap<String, (u64, f64)> {
    let mut sums: HashMap<String, (u64, u64)> = HashMap::new();
    for m in data.section_metrics.values() {
        let entry = sums.entry(m.municipality.clone()).or_insert((0, 0));
        entry.0 += match metric {
            MapMetric::Turnout => m.turnout,
            MapMetric::Abstention => m.abstention,
            MapMetric::VoteShare => 0,
        };
        entry.1 += m.eligible_voters;
    }
    sums.into_iter()
        .map(|(name, (count, eligible))| (name, (count, percentage(count, eligible))))
        .collect()
}

/// Builds the choropleth feed comparing one metric across two periods.
///
/// For `VoteShare` a candidate identity is required; turnout and
/// abstention come from the reference metrics and ignore the identity.
pub fn map_entries(
    data_a: &PeriodData,
    data_b: &PeriodData,
    metric: MapMetric,
    identity: Option<&CandidateIdentity>,
    filter: &RecordFilter,
    scale: ColorScale,
) -> Vec<MapEntry> {
    let (values_a, values_b) = match (metric, identity) {
        (MapMetric::VoteShare, Some(identity)) => (
            municipality_shares(data_a, identity, filter),
            municipality_shares(data_b, identity, filter),
        ),
        (MapMetric::VoteShare, None) => {
            warn!("map_entries: vote-share metric without a candidate, empty feed");
            return Vec::new();
        }
        _ => (
            municipality_rates(data_a, metric),
            municipality_rates(data_b, metric),
        ),
    };

    let names: BTreeSet<&String> = values_a.keys().chain(values_b.keys()).collect();
    names
        .into_iter()
        .map(|name| {
            let (votes_a, pct_a) = values_a.get(name).copied().unwrap_or((0, 0.0));
            let (votes_b, pct_b) = values_b.get(name).copied().unwrap_or((0, 0.0));
            let change = variation_points(pct_a, pct_b);
            MapEntry {
                name: name.clone(),
                value_for_period_a: pct_a,
                value_for_period_b: pct_b,
                percentage_change: change,
                color: scale.color_for(change).to_hex(),
                info_text: format!(
                    "{}: {:.2}% ({} votes); {}: {:.2}% ({} votes)",
                    data_a.period.label(),
                    pct_a,
                    votes_a,
                    data_b.period.label(),
                    pct_b,
                    votes_b
                ),
            }
        })
        .collect()
}

/// Per-municipality comparison rows between two (period, candidate)
/// selections.
pub fn comparison_rows(
    data_a: &PeriodData,
    identity_a: &CandidateIdentity,
    data_b: &PeriodData,
    identity_b: &CandidateIdentity,
    filter: &RecordFilter,
) -> Vec<ComparisonRow> {
    let values_a = municipality_shares(data_a, identity_a, filter);
    let values_b = municipality_shares(data_b, identity_b, filter);
    let names: BTreeSet<&String> = values_a.keys().chain(values_b.keys()).collect();
    names
        .into_iter()
        .map(|name| {
            let (votes_a, pct_a) = values_a.get(name).copied().unwrap_or((0, 0.0));
            let (votes_b, pct_b) = values_b.get(name).copied().unwrap_or((0, 0.0));
            ComparisonRow {
                name: name.clone(),
                votes_a,
                percentage_a: pct_a,
                votes_b,
                percentage_b: pct_b,
                variation: variation_points(pct_a, pct_b),
            }
        })
        .collect()
}

/// Summary scalars of one loaded period.
pub fn summary_report(data: &PeriodData, filter: &RecordFilter) -> SummaryReport {
    let summary = election_analytics::build_summary(&data.records, &data.section_metrics, filter);
    SummaryReport {
        period: data.period.label(),
        eligible_voters: summary.eligible_voters,
        turnout: summary.turnout,
        abstention: summary.abstention,
        turnout_percentage: summary.turnout_percentage(),
        abstention_percentage: summary.abstention_percentage(),
        valid_votes: summary.valid_votes,
        blank_votes: summary.blank_votes,
        null_votes: summary.null_votes,
    }
}

// **** Emission and reference checking ****

/// Writes the report as pretty JSON to the given destination ("stdout" or
/// a file path; stdout when omitted).
pub fn write_report(report: &JSValue, out: Option<&str>) -> EngineResult<()> {
    let pretty = serde_json::to_string_pretty(report).context(SerializingReportSnafu {})?;
    match out {
        None | Some("stdout") => {
            println!("{}", pretty);
            Ok(())
        }
        Some(path) => fs::write(path, pretty).context(WritingReportSnafu { path }),
    }
}

/// Compares the report against a stored reference summary, printing a
/// diff and failing on mismatch.
pub fn check_reference(report: &JSValue, reference_path: &str) -> EngineResult<()> {
    let contents = fs::read_to_string(reference_path).context(OpeningReferenceSnafu {
        path: reference_path,
    })?;
    let reference: JSValue = serde_json::from_str(&contents).context(ParsingReferenceSnafu {
        path: reference_path,
    })?;
    let pretty_reference =
        serde_json::to_string_pretty(&reference).context(SerializingReportSnafu {})?;
    let pretty_report = serde_json::to_string_pretty(report).context(SerializingReportSnafu {})?;
    if pretty_reference != pretty_report {
        warn!("report differs from the reference {}", reference_path);
        print_diff(pretty_reference.as_str(), pretty_report.as_str(), "\n");
        return ReferenceMismatchSnafu {
            path: reference_path,
        }
        .fail();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Period, PeriodData};
    use election_analytics::{
        build_section_metrics, Office, RawVoteRecord, Round, SCALE_GREEN, SCALE_RED,
    };

    fn record(municipality: &str, name: &str, party: &str, number: &str, votes: u64) -> RawVoteRecord {
        RawVoteRecord {
            municipality: municipality.to_string(),
            zone: "1".to_string(),
            section: "101".to_string(),
            location_code: "1015".to_string(),
            candidate_number: number.to_string(),
            candidate_name: name.to_string(),
            votes,
            party: party.to_string(),
            office: Office::Governor,
            year: 2018,
            round: Some(Round::First),
            eligible_voters: 1000,
            turnout: 800,
            abstention: 200,
            location_name: "SCHOOL".to_string(),
            address: "MAIN ST 1".to_string(),
            neighborhood: "CENTER".to_string(),
        }
    }

    fn period_data(cycle: u16, records: Vec<RawVoteRecord>) -> PeriodData {
        let section_metrics = build_section_metrics(&records);
        PeriodData {
            period: Period::new(Office::Governor, cycle, Some(Round::First)),
            records,
            section_metrics,
        }
    }

    fn alice() -> CandidateIdentity {
        CandidateIdentity {
            name: "ALICE VANCE".to_string(),
            party: "PWT".to_string(),
        }
    }

    #[test]
    fn map_entries_compare_vote_shares_and_clamp_colors() {
        let data_a = period_data(
            2018,
            vec![
                record("RIVERTON", "ALICE VANCE", "PWT", "40", 10),
                record("RIVERTON", "BO REN", "UDN", "23", 90),
            ],
        );
        let data_b = period_data(
            2022,
            vec![
                record("RIVERTON", "ALICE VANCE", "PWT", "40", 90),
                record("RIVERTON", "BO REN", "UDN", "23", 10),
            ],
        );
        let entries = map_entries(
            &data_a,
            &data_b,
            MapMetric::VoteShare,
            Some(&alice()),
            &RecordFilter::default(),
            ColorScale::symmetric(20.0),
        );
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.name, "RIVERTON");
        assert!((entry.value_for_period_a - 10.0).abs() < 1e-9);
        assert!((entry.value_for_period_b - 90.0).abs() < 1e-9);
        assert!((entry.percentage_change - 80.0).abs() < 1e-9);
        // +80pp is far beyond the +20pp bound: clamped to the green stop.
        assert_eq!(entry.color, SCALE_GREEN.to_hex());
        assert!(entry.info_text.contains("governor 2018"));
    }

    #[test]
    fn map_entries_cover_the_union_of_municipalities() {
        let data_a = period_data(2018, vec![record("RIVERTON", "ALICE VANCE", "PWT", "40", 50)]);
        let data_b = period_data(2022, vec![record("LAKEWOOD", "ALICE VANCE", "PWT", "40", 50)]);
        let entries = map_entries(
            &data_a,
            &data_b,
            MapMetric::VoteShare,
            Some(&alice()),
            &RecordFilter::default(),
            ColorScale::symmetric(20.0),
        );
        assert_eq!(entries.len(), 2);
        let lakewood = entries.iter().find(|e| e.name == "LAKEWOOD").unwrap();
        assert_eq!(lakewood.value_for_period_a, 0.0);
        let riverton = entries.iter().find(|e| e.name == "RIVERTON").unwrap();
        assert_eq!(riverton.value_for_period_b, 0.0);
        assert_eq!(riverton.color, SCALE_RED.to_hex());
    }

    #[test]
    fn turnout_map_uses_reference_metrics() {
        let mut low = record("RIVERTON", "ALICE VANCE", "PWT", "40", 1);
        low.turnout = 600;
        low.abstention = 400;
        let data_a = period_data(2018, vec![low]);
        let data_b = period_data(2022, vec![record("RIVERTON", "ALICE VANCE", "PWT", "40", 1)]);
        let entries = map_entries(
            &data_a,
            &data_b,
            MapMetric::Turnout,
            None,
            &RecordFilter::default(),
            ColorScale::symmetric(10.0),
        );
        assert_eq!(entries.len(), 1);
        assert!((entries[0].value_for_period_a - 60.0).abs() < 1e-9);
        assert!((entries[0].value_for_period_b - 80.0).abs() < 1e-9);
    }

    #[test]
    fn aggregated_rows_are_ordered_and_carry_the_shared_denominator() {
        let data = period_data(
            2018,
            vec![
                record("RIVERTON", "ALICE VANCE", "PWT", "40", 60),
                record("RIVERTON", "BO REN", "UDN", "23", 40),
            ],
        );
        let aggregates = data.aggregate(Dimension::Municipality, &RecordFilter::default());
        let rows = aggregated_rows(&aggregates);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].candidate, "ALICE VANCE");
        assert_eq!(rows[0].total_valid_votes, 100);
        assert_eq!(rows[1].total_valid_votes, 100);
        assert!((rows[0].percentage - 60.0).abs() < 1e-9);
    }

    #[test]
    fn summary_report_carries_the_period_label() {
        let data = period_data(2018, vec![record("RIVERTON", "ALICE VANCE", "PWT", "40", 60)]);
        let report = summary_report(&data, &RecordFilter::default());
        assert_eq!(report.period, "governor 2018 (first-round)");
        assert_eq!(report.eligible_voters, 1000);
        assert_eq!(report.valid_votes, 60);
        assert!((report.turnout_percentage - 80.0).abs() < 1e-9);
    }
}
