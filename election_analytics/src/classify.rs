//! Per-record candidate classification and identity resolution.
//!
//! All functions here are pure over a single record; the aggregation engine
//! applies them while reducing a record set.

use crate::records::*;

/// Normalized candidate name of an explicit "no candidate chosen" ballot.
pub const BLANK_NAME_SENTINEL: &str = "BLANK";
/// Normalized candidate name of a spoiled ballot.
pub const NULL_NAME_SENTINEL: &str = "NULL";
/// Party acronym used by null-vote summary rows.
pub const NULL_PARTY_SENTINEL: &str = "#NULL#";

/// Reserved candidate number of blank votes.
pub const BLANK_CANDIDATE_NUMBER: &str = "95";
/// Reserved candidate number of null votes.
pub const NULL_CANDIDATE_NUMBER: &str = "96";

/// Trim and uppercase, the normalization applied to every name and party
/// acronym before comparison.
pub fn normalize_label(s: &str) -> String {
    s.trim().to_uppercase()
}

/// Classifies one record as a valid candidate vote, blank, null, or a
/// party-legend summary row.
pub fn classify(record: &RawVoteRecord) -> CandidateVoteClass {
    let name = normalize_label(&record.candidate_name);
    let party = normalize_label(&record.party);
    if name == BLANK_NAME_SENTINEL {
        CandidateVoteClass::Blank
    } else if name == NULL_NAME_SENTINEL || party == NULL_PARTY_SENTINEL {
        CandidateVoteClass::Null
    } else if !name.is_empty() && name == party {
        // The "candidate name" is the party acronym itself: a legend row
        // representing votes for the party list.
        CandidateVoteClass::PartyLegend
    } else {
        CandidateVoteClass::Valid
    }
}

/// The cross-year identity key of a record: normalized name plus party.
pub fn identity_of(record: &RawVoteRecord) -> CandidateIdentity {
    CandidateIdentity {
        name: normalize_label(&record.candidate_name),
        party: normalize_label(&record.party),
    }
}

/// The fully qualified candidacy reference of a record.
pub fn candidate_ref(record: &RawVoteRecord) -> CandidateRecordRef {
    CandidateRecordRef {
        identity: identity_of(record),
        office: record.office,
        year: record.year,
        round: record.round,
    }
}

/// Round classification for a raw candidate number.
///
/// For offices with a runoff, a record belongs to the first round when its
/// candidate number has exactly two digits and is neither of the reserved
/// blank/null codes. Otherwise it belongs to the second round, provided a
/// second-round source actually exists for that office and cycle
/// (`has_second_round`); with no runoff source the record stays in the
/// first round. Offices without runoffs have a single, unsplit round,
/// modeled as `None`.
///
/// This is a heuristic over the raw data, not an authoritative field; the
/// reserved codes are applied identically at every call site.
pub fn round_of(candidate_number: &str, office: Office, has_second_round: bool) -> Option<Round> {
    if !office.has_runoff() {
        return None;
    }
    let number = candidate_number.trim();
    let two_digit = number.len() == 2 && number.chars().all(|c| c.is_ascii_digit());
    let reserved = number == BLANK_CANDIDATE_NUMBER || number == NULL_CANDIDATE_NUMBER;
    if two_digit && !reserved {
        Some(Round::First)
    } else if has_second_round {
        Some(Round::Second)
    } else {
        Some(Round::First)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(number: &str, name: &str, party: &str) -> RawVoteRecord {
        RawVoteRecord {
            municipality: "RIVERTON".to_string(),
            zone: "7".to_string(),
            section: "101".to_string(),
            location_code: "1015".to_string(),
            candidate_number: number.to_string(),
            candidate_name: name.to_string(),
            votes: 1,
            party: party.to_string(),
            office: Office::Governor,
            year: 2022,
            round: None,
            eligible_voters: 0,
            turnout: 0,
            abstention: 0,
            location_name: String::new(),
            address: String::new(),
            neighborhood: String::new(),
        }
    }

    #[test]
    fn classifies_named_candidate_as_valid() {
        let r = record("40", "Alice Vance", "PWT");
        assert_eq!(classify(&r), CandidateVoteClass::Valid);
    }

    #[test]
    fn classifies_blank_by_normalized_name() {
        let r = record("95", "  blank ", "");
        assert_eq!(classify(&r), CandidateVoteClass::Blank);
    }

    #[test]
    fn classifies_null_by_name_or_party_sentinel() {
        assert_eq!(classify(&record("96", "NULL", "")), CandidateVoteClass::Null);
        assert_eq!(
            classify(&record("96", "whatever", "#null#")),
            CandidateVoteClass::Null
        );
    }

    #[test]
    fn classifies_party_legend_when_name_equals_party() {
        let r = record("40", "pwt", "PWT");
        assert_eq!(classify(&r), CandidateVoteClass::PartyLegend);
    }

    #[test]
    fn identity_is_normalized_and_ignores_number() {
        let a = identity_of(&record("40", "  Alice Vance ", "pwt"));
        let b = identity_of(&record("41", "ALICE VANCE", "PWT"));
        assert_eq!(a, b);
        assert_eq!(a.name, "ALICE VANCE");
        assert_eq!(a.party, "PWT");
    }

    #[test]
    fn two_digit_number_is_first_round() {
        assert_eq!(round_of("40", Office::Governor, true), Some(Round::First));
        assert_eq!(round_of(" 12 ", Office::President, true), Some(Round::First));
    }

    #[test]
    fn reserved_codes_are_not_first_round() {
        assert_eq!(round_of("95", Office::Governor, true), Some(Round::Second));
        assert_eq!(round_of("96", Office::Governor, true), Some(Round::Second));
        // Without a runoff source they stay in the first round.
        assert_eq!(round_of("95", Office::Governor, false), Some(Round::First));
    }

    #[test]
    fn long_numbers_are_second_round_only_with_a_runoff_source() {
        assert_eq!(round_of("1234", Office::Governor, true), Some(Round::Second));
        assert_eq!(round_of("1234", Office::Governor, false), Some(Round::First));
    }

    #[test]
    fn offices_without_runoff_are_unsplit() {
        assert_eq!(round_of("12345", Office::StateDeputy, true), None);
        assert_eq!(round_of("123", Office::Senator, false), None);
    }
}
