//! Aggregation and comparative analytics for per-section electoral tallies.
//!
//! The crate is the computation core of a results-comparison pipeline: it
//! takes flat, already-parsed vote records (one per candidate per polling
//! section) and produces per-section or per-municipality aggregates, from
//! which percentages, variations, rankings and map colors are derived.
//!
//! Everything here is pure and total: no I/O, no failure modes beyond what
//! the type system states. Loading, caching and cancellation live in the
//! pipeline crate that wraps this one.

mod analytics;
mod classify;
mod color;
mod records;

use log::debug;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

pub use crate::analytics::*;
pub use crate::classify::*;
pub use crate::color::*;
pub use crate::records::*;

// **** Vote aggregation engine ****

/// Sums candidate votes and valid-vote totals per dimension key for a
/// filtered record set.
///
/// Single pass: each record is classified; `Valid` records add their vote
/// count to both the per-key denominator (`total_valid_votes`) and the
/// per-candidate total; blank, null and party-legend records contribute to
/// neither. This yields, for any downstream candidate selection, both the
/// numerator and the correct shared denominator without recomputation.
pub fn aggregate_votes(
    records: &[RawVoteRecord],
    dimension: Dimension,
    filter: &RecordFilter,
) -> HashMap<AggregateKey, DimensionAggregate> {
    let mut aggregates: HashMap<AggregateKey, DimensionAggregate> = HashMap::new();
    let mut skipped: u64 = 0;
    for record in records.iter().filter(|r| filter.matches(r)) {
        if classify(record) != CandidateVoteClass::Valid {
            skipped += 1;
            continue;
        }
        let key = match dimension {
            Dimension::Section => AggregateKey::Section(record.section_key()),
            Dimension::Municipality => AggregateKey::Municipality(record.municipality.clone()),
        };
        let aggregate = aggregates.entry(key).or_default();
        aggregate.total_valid_votes += record.votes;
        *aggregate
            .candidate_totals
            .entry(identity_of(record))
            .or_insert(0) += record.votes;
    }
    debug!(
        "aggregate_votes: {} keys, {} non-valid records excluded",
        aggregates.len(),
        skipped
    );
    aggregates
}

// **** Section metrics ****

/// Extracts eligible-voter/turnout/abstention counts per section from a
/// reference record set.
///
/// The first record observed for a section wins; later duplicates from
/// repeated sheet rows are discarded so that a source listing the same
/// section several times cannot double count.
pub fn build_section_metrics(records: &[RawVoteRecord]) -> HashMap<SectionKey, SectionMetrics> {
    let mut metrics: HashMap<SectionKey, SectionMetrics> = HashMap::new();
    for record in records {
        match metrics.entry(record.section_key()) {
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                slot.insert(SectionMetrics {
                    eligible_voters: record.eligible_voters,
                    turnout: record.turnout,
                    abstention: record.abstention,
                    municipality: record.municipality.clone(),
                    zone: record.zone.clone(),
                    section: record.section.clone(),
                    location_code: record.location_code.clone(),
                });
            }
        }
    }
    debug!("build_section_metrics: {} sections", metrics.len());
    metrics
}
