//! Derivations over committed aggregates: percentages, variations,
//! rankings and comparative summaries.

use crate::classify::classify;
use crate::records::*;
use itertools::Itertools;
use std::collections::HashMap;

// **** Percentages and variations ****

/// Vote share of a candidate against the valid-vote denominator, in
/// percent. Defined as 0 when the denominator is 0; never NaN or infinite.
pub fn percentage(votes: u64, total_valid_votes: u64) -> f64 {
    if total_valid_votes == 0 {
        0.0
    } else {
        votes as f64 / total_valid_votes as f64 * 100.0
    }
}

/// Percentage-point variation between two rates (turnout %, abstention %,
/// vote-share %).
pub fn variation_points(rate_a: f64, rate_b: f64) -> f64 {
    rate_b - rate_a
}

/// Relative variation between two absolute counts, in percent.
///
/// Saturates instead of dividing by zero: growing from 0 counts as +100,
/// and two zeros count as no variation.
pub fn variation_relative(value_a: u64, value_b: u64) -> f64 {
    if value_a == 0 {
        if value_b > 0 {
            100.0
        } else {
            0.0
        }
    } else {
        (value_b as f64 - value_a as f64) / value_a as f64 * 100.0
    }
}

// **** Rankings ****

/// One candidate of a ranked list.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RankedCandidate {
    pub identity: CandidateIdentity,
    pub votes: u64,
    /// Standard competition rank: ties share a rank, the next distinct
    /// count takes its 1-based position in the sorted sequence.
    pub rank: u32,
}

/// Ranks the candidates of one dimension key by descending vote count.
///
/// Ties share the same rank; among tied candidates the output order is
/// alphabetical so reports are deterministic.
pub fn rank_candidates(totals: &HashMap<CandidateIdentity, u64>) -> Vec<RankedCandidate> {
    let sorted: Vec<(&CandidateIdentity, &u64)> = totals
        .iter()
        .sorted_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)))
        .collect();

    let mut ranked: Vec<RankedCandidate> = Vec::with_capacity(sorted.len());
    let mut current_rank = 0u32;
    let mut previous_votes: Option<u64> = None;
    for (position, (identity, votes)) in sorted.iter().enumerate() {
        if previous_votes != Some(**votes) {
            current_rank = position as u32 + 1;
            previous_votes = Some(**votes);
        }
        ranked.push(RankedCandidate {
            identity: (*identity).clone(),
            votes: **votes,
            rank: current_rank,
        });
    }
    ranked
}

/// One municipality of a candidate-centric ranking.
#[derive(PartialEq, Debug, Clone)]
pub struct MunicipalityRank {
    pub municipality: String,
    pub votes: u64,
    pub percentage: f64,
    pub rank: u32,
}

/// Ranks municipalities by one candidate's vote count, descending, with
/// the same competition-rank rule as [`rank_candidates`]. The percentage
/// is taken against each municipality's own valid-vote denominator.
pub fn rank_municipalities(
    aggregates: &HashMap<AggregateKey, DimensionAggregate>,
    identity: &CandidateIdentity,
) -> Vec<MunicipalityRank> {
    let sorted: Vec<(String, u64, u64)> = aggregates
        .iter()
        .filter_map(|(key, aggregate)| match key {
            AggregateKey::Municipality(name) => Some((
                name.clone(),
                aggregate.votes_for(identity),
                aggregate.total_valid_votes,
            )),
            AggregateKey::Section(_) => None,
        })
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .collect();

    let mut ranked: Vec<MunicipalityRank> = Vec::with_capacity(sorted.len());
    let mut current_rank = 0u32;
    let mut previous_votes: Option<u64> = None;
    for (position, (municipality, votes, total)) in sorted.into_iter().enumerate() {
        if previous_votes != Some(votes) {
            current_rank = position as u32 + 1;
            previous_votes = Some(votes);
        }
        ranked.push(MunicipalityRank {
            municipality,
            votes,
            percentage: percentage(votes, total),
            rank: current_rank,
        });
    }
    ranked
}

// **** Comparative summary ****

/// Summary scalars for one office/cycle selection: turnout figures from
/// the reference metrics plus vote-class totals from the selection's own
/// records.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ComparativeSummary {
    pub eligible_voters: u64,
    pub turnout: u64,
    pub abstention: u64,
    pub valid_votes: u64,
    pub blank_votes: u64,
    pub null_votes: u64,
}

impl ComparativeSummary {
    pub fn turnout_percentage(&self) -> f64 {
        percentage(self.turnout, self.eligible_voters)
    }

    pub fn abstention_percentage(&self) -> f64 {
        percentage(self.abstention, self.eligible_voters)
    }
}

/// Builds the comparative summary for a filtered selection.
///
/// Turnout figures come from the section metrics of the cycle's reference
/// source (restricted to the filter's municipality, when set), so they are
/// available even when the selected office's own source is sparse.
pub fn build_summary(
    records: &[RawVoteRecord],
    metrics: &HashMap<SectionKey, SectionMetrics>,
    filter: &RecordFilter,
) -> ComparativeSummary {
    let mut summary = ComparativeSummary::default();
    for m in metrics.values() {
        if let Some(municipality) = &filter.municipality {
            if !m.municipality.eq_ignore_ascii_case(municipality) {
                continue;
            }
        }
        summary.eligible_voters += m.eligible_voters;
        summary.turnout += m.turnout;
        summary.abstention += m.abstention;
    }
    for record in records.iter().filter(|r| filter.matches(r)) {
        match classify(record) {
            CandidateVoteClass::Valid => summary.valid_votes += record.votes,
            CandidateVoteClass::Blank => summary.blank_votes += record.votes,
            CandidateVoteClass::Null => summary.null_votes += record.votes,
            // Legend votes are neither valid nor blank/null ballots; they
            // stay out of the summary scalars.
            CandidateVoteClass::PartyLegend => {}
        }
    }
    summary
}
