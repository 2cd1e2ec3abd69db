// ********* Input data structures ***********

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

/// Placeholder used whenever a polling location cannot be resolved.
pub const NOT_INFORMED: &str = "NOT INFORMED";

/// The offices covered by the tally sources.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Office {
    President,
    Governor,
    Senator,
    FederalDeputy,
    StateDeputy,
    Mayor,
    Councilor,
}

impl Office {
    /// Whether this office is decided by majority and may require a runoff.
    ///
    /// Whether a runoff actually happened in a given cycle is a property of
    /// the source registry, not of the office.
    pub fn has_runoff(&self) -> bool {
        matches!(self, Office::President | Office::Governor | Office::Mayor)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Office::President => "president",
            Office::Governor => "governor",
            Office::Senator => "senator",
            Office::FederalDeputy => "federal-deputy",
            Office::StateDeputy => "state-deputy",
            Office::Mayor => "mayor",
            Office::Councilor => "councilor",
        }
    }
}

impl Display for Office {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Office {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "president" => Ok(Office::President),
            "governor" => Ok(Office::Governor),
            "senator" => Ok(Office::Senator),
            "federal-deputy" => Ok(Office::FederalDeputy),
            "state-deputy" => Ok(Office::StateDeputy),
            "mayor" => Ok(Office::Mayor),
            "councilor" => Ok(Office::Councilor),
            x => Err(format!("unknown office: {:?}", x)),
        }
    }
}

/// One of the two rounds of a majority election. Offices without runoffs
/// are modeled with no round at all (`Option<Round>` everywhere).
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Round {
    First,
    Second,
}

impl Round {
    pub fn label(&self) -> &'static str {
        match self {
            Round::First => "first-round",
            Round::Second => "second-round",
        }
    }
}

/// One parsed row of a tally source, enriched with location metadata.
/// Immutable once created by the loader.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RawVoteRecord {
    pub municipality: String,
    pub zone: String,
    pub section: String,
    pub location_code: String,
    /// Kept as a string: the number of digits carries meaning for round
    /// classification, and leading zeros must survive.
    pub candidate_number: String,
    pub candidate_name: String,
    pub votes: u64,
    pub party: String,
    pub office: Office,
    pub year: u16,
    pub round: Option<Round>,
    // Turnout columns carried by every row of the reference source.
    pub eligible_voters: u64,
    pub turnout: u64,
    pub abstention: u64,
    // Enrichment from the location directory.
    pub location_name: String,
    pub address: String,
    pub neighborhood: String,
}

impl RawVoteRecord {
    pub fn location_key(&self) -> LocationKey {
        LocationKey {
            municipality: self.municipality.clone(),
            zone: self.zone.clone(),
            section: self.section.clone(),
            location_code: self.location_code.clone(),
        }
    }

    pub fn section_key(&self) -> SectionKey {
        SectionKey {
            municipality: self.municipality.clone(),
            zone: self.zone.clone(),
            section: self.section.clone(),
        }
    }
}

/// Key of a polling location: the section plus the location code.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LocationKey {
    pub municipality: String,
    pub zone: String,
    pub section: String,
    pub location_code: String,
}

/// Key of the smallest polling unit.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub struct SectionKey {
    pub municipality: String,
    pub zone: String,
    pub section: String,
}

impl Display for SectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} zone {} section {}",
            self.municipality, self.zone, self.section
        )
    }
}

/// Canonical polling-location metadata, loaded once per session.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PollingLocation {
    pub municipality: String,
    pub zone: String,
    pub section: String,
    pub location_code: String,
    /// Display name of the location.
    pub name: String,
    pub address: String,
    pub neighborhood: String,
}

impl PollingLocation {
    /// The sentinel returned by lookups that find no match.
    pub fn not_informed() -> PollingLocation {
        PollingLocation {
            municipality: NOT_INFORMED.to_string(),
            zone: NOT_INFORMED.to_string(),
            section: NOT_INFORMED.to_string(),
            location_code: NOT_INFORMED.to_string(),
            name: NOT_INFORMED.to_string(),
            address: NOT_INFORMED.to_string(),
            neighborhood: NOT_INFORMED.to_string(),
        }
    }

    pub fn key(&self) -> LocationKey {
        LocationKey {
            municipality: self.municipality.clone(),
            zone: self.zone.clone(),
            section: self.section.clone(),
            location_code: self.location_code.clone(),
        }
    }
}

/// Eligible-voter/turnout/abstention counts for one section, extracted from
/// the reference source of a cycle.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SectionMetrics {
    pub eligible_voters: u64,
    pub turnout: u64,
    pub abstention: u64,
    pub municipality: String,
    pub zone: String,
    pub section: String,
    pub location_code: String,
}

/// Classification of a single record. Derived, never stored.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum CandidateVoteClass {
    /// A vote for an actual, named candidate.
    Valid,
    /// An explicit "no candidate chosen" ballot.
    Blank,
    /// An invalid/spoiled ballot.
    Null,
    /// A summary row whose candidate name is the party acronym: votes for
    /// the party list, not for an individual.
    PartyLegend,
}

/// Cross-year candidate key: normalized name plus party acronym.
///
/// The candidate number is deliberately not part of the key; it may
/// legitimately change between election cycles.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub struct CandidateIdentity {
    pub name: String,
    pub party: String,
}

impl Display for CandidateIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.party)
    }
}

/// A fully qualified reference to one candidacy: identity plus the office,
/// cycle and round it ran in. Carried as typed fields from the point of
/// construction; never round-tripped through a display label.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct CandidateRecordRef {
    pub identity: CandidateIdentity,
    pub office: Office,
    pub year: u16,
    pub round: Option<Round>,
}

// ********* Aggregation structures ***********

/// The grouping axis of an aggregation pass.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Dimension {
    Section,
    Municipality,
}

/// Key of one aggregated group.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub enum AggregateKey {
    Section(SectionKey),
    Municipality(String),
}

impl Display for AggregateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateKey::Section(k) => write!(f, "{}", k),
            AggregateKey::Municipality(m) => write!(f, "{}", m),
        }
    }
}

/// Restriction applied to records before aggregation. Empty filters match
/// every record.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RecordFilter {
    pub municipality: Option<String>,
    pub neighborhood: Option<String>,
    pub office: Option<Office>,
}

impl RecordFilter {
    pub fn matches(&self, record: &RawVoteRecord) -> bool {
        if let Some(m) = &self.municipality {
            if !record.municipality.eq_ignore_ascii_case(m) {
                return false;
            }
        }
        if let Some(n) = &self.neighborhood {
            if !record.neighborhood.eq_ignore_ascii_case(n) {
                return false;
            }
        }
        if let Some(o) = self.office {
            if record.office != o {
                return false;
            }
        }
        true
    }
}

/// Sums for one dimension key: per-candidate totals plus the shared
/// valid-vote denominator for that key.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct DimensionAggregate {
    pub candidate_totals: HashMap<CandidateIdentity, u64>,
    pub total_valid_votes: u64,
}

impl DimensionAggregate {
    pub fn votes_for(&self, identity: &CandidateIdentity) -> u64 {
        self.candidate_totals.get(identity).copied().unwrap_or(0)
    }
}
