mod args;

use clap::Parser;
use log::info;
use snafu::prelude::*;
use std::sync::Arc;

use serde_json::json;
use serde_json::Value as JSValue;

use election_analytics::{
    normalize_label, rank_municipalities, CandidateIdentity, ColorScale, Dimension, Office,
    RecordFilter, Round,
};
use vote_compare::engine::{ComparisonEngine, PassOutput, Period, Selection};
use vote_compare::loader::FileFetcher;
use vote_compare::report::{
    aggregated_rows, check_reference, comparison_rows, map_entries, municipality_ranking_rows,
    ranking_blocks, summary_report, write_report, MapMetric,
};
use vote_compare::EngineResult;

use crate::args::{Args, Command};

fn main() {
    let args = Args::parse();
    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    match run(&args) {
        Ok(report) => {
            if let Err(e) = write_report(&report, args.out.as_deref()) {
                eprintln!("An error occured: {}", e);
                std::process::exit(1);
            }
            if let Some(reference) = &args.reference {
                if let Err(e) = check_reference(&report, reference) {
                    eprintln!("An error occured: {}", e);
                    std::process::exit(1);
                }
                info!("report matches the reference {}", reference);
            }
        }
        Err(e) => {
            eprintln!("An error occured: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> EngineResult<JSValue> {
    let cache_dir = args.cache_dir.as_ref().map(|d| d.into());
    let engine = ComparisonEngine::new(Box::new(FileFetcher::new(&args.data_dir)), cache_dir);

    match &args.command {
        Command::CompareOffices {
            cycle,
            office_a,
            office_b,
            name_a,
            party_a,
            name_b,
            party_b,
            round,
            municipality,
            neighborhood,
        } => {
            let office_a = parse_office(office_a)?;
            let office_b = parse_office(office_b)?;
            let round = parse_round(*round)?;
            let identity_a = identity(name_a, party_a);
            let identity_b = identity(name_b, party_b);
            let selection = Selection {
                periods: vec![
                    Period::new(office_a, *cycle, round),
                    Period::new(office_b, *cycle, round),
                ],
                filter: filter_of(municipality, neighborhood),
            };
            let output = run_selection(&engine, &selection)?;
            let rows = comparison_rows(
                &output.periods[0],
                &identity_a,
                &output.periods[1],
                &identity_b,
                &output.filter,
            );
            Ok(json!({
                "query": {
                    "kind": "compare-offices",
                    "cycle": cycle,
                    "officeA": office_a.label(),
                    "officeB": office_b.label(),
                    "candidateA": { "name": identity_a.name, "party": identity_a.party },
                    "candidateB": { "name": identity_b.name, "party": identity_b.party },
                },
                "rows": rows,
                "summaries": [
                    summary_report(&output.periods[0], &output.filter),
                    summary_report(&output.periods[1], &output.filter),
                ],
            }))
        }
        Command::CompareYears {
            office,
            cycle_a,
            cycle_b,
            name,
            party,
            round,
            municipality,
            neighborhood,
            domain,
        } => {
            let office = parse_office(office)?;
            let round = parse_round(*round)?;
            let candidate = identity(name, party);
            let selection = Selection {
                periods: vec![
                    Period::new(office, *cycle_a, round),
                    Period::new(office, *cycle_b, round),
                ],
                filter: filter_of(municipality, neighborhood),
            };
            let output = run_selection(&engine, &selection)?;
            let rows = comparison_rows(
                &output.periods[0],
                &candidate,
                &output.periods[1],
                &candidate,
                &output.filter,
            );
            let scale = ColorScale::symmetric(domain.unwrap_or(MapMetric::VoteShare.default_domain()));
            let map = map_entries(
                &output.periods[0],
                &output.periods[1],
                MapMetric::VoteShare,
                Some(&candidate),
                &output.filter,
                scale,
            );
            Ok(json!({
                "query": {
                    "kind": "compare-years",
                    "office": office.label(),
                    "cycleA": cycle_a,
                    "cycleB": cycle_b,
                    "candidate": { "name": candidate.name, "party": candidate.party },
                },
                "rows": rows,
                "map": map,
                "summaries": [
                    summary_report(&output.periods[0], &output.filter),
                    summary_report(&output.periods[1], &output.filter),
                ],
            }))
        }
        Command::Candidate {
            office,
            cycle,
            name,
            party,
            round,
            municipality,
            neighborhood,
            dimension,
        } => {
            let office = parse_office(office)?;
            let round = parse_round(*round)?;
            let dimension = parse_dimension(dimension)?;
            let candidate = identity(name, party);
            let selection = Selection {
                periods: vec![Period::new(office, *cycle, round)],
                filter: filter_of(municipality, neighborhood),
            };
            let output = run_selection(&engine, &selection)?;
            let aggregates = output.periods[0].aggregate(dimension, &output.filter);
            Ok(json!({
                "query": {
                    "kind": "candidate",
                    "office": office.label(),
                    "cycle": cycle,
                    "candidate": { "name": candidate.name, "party": candidate.party },
                },
                "rows": aggregated_rows(&aggregates),
                "rankings": ranking_blocks(&aggregates),
            }))
        }
        Command::Rank {
            office,
            cycle,
            name,
            party,
            round,
        } => {
            let office = parse_office(office)?;
            let round = parse_round(*round)?;
            let candidate = identity(name, party);
            let selection = Selection {
                periods: vec![Period::new(office, *cycle, round)],
                filter: RecordFilter::default(),
            };
            let output = run_selection(&engine, &selection)?;
            let aggregates = output.periods[0].aggregate(Dimension::Municipality, &output.filter);
            let ranking = rank_municipalities(&aggregates, &candidate);
            Ok(json!({
                "query": {
                    "kind": "rank",
                    "office": office.label(),
                    "cycle": cycle,
                    "candidate": { "name": candidate.name, "party": candidate.party },
                },
                "ranking": municipality_ranking_rows(&ranking),
            }))
        }
        Command::Map {
            office,
            cycle_a,
            cycle_b,
            metric,
            name,
            party,
            round,
            domain,
        } => {
            let office = parse_office(office)?;
            let round = parse_round(*round)?;
            let metric: MapMetric = match metric.parse() {
                Ok(m) => m,
                Err(message) => whatever!("{}", message),
            };
            let candidate = match (name, party) {
                (Some(name), Some(party)) => Some(identity(name, party)),
                (None, None) => None,
                _ => whatever!("--name and --party must be given together"),
            };
            if metric == MapMetric::VoteShare && candidate.is_none() {
                whatever!("the vote-share map needs --name and --party");
            }
            let selection = Selection {
                periods: vec![
                    Period::new(office, *cycle_a, round),
                    Period::new(office, *cycle_b, round),
                ],
                filter: RecordFilter::default(),
            };
            let output = run_selection(&engine, &selection)?;
            let scale = ColorScale::symmetric(domain.unwrap_or(metric.default_domain()));
            let map = map_entries(
                &output.periods[0],
                &output.periods[1],
                metric,
                candidate.as_ref(),
                &output.filter,
                scale,
            );
            Ok(json!({
                "query": {
                    "kind": "map",
                    "office": office.label(),
                    "cycleA": cycle_a,
                    "cycleB": cycle_b,
                },
                "map": map,
            }))
        }
        Command::Summary {
            office,
            cycle,
            round,
            municipality,
        } => {
            let office = parse_office(office)?;
            let round = parse_round(*round)?;
            let selection = Selection {
                periods: vec![Period::new(office, *cycle, round)],
                filter: filter_of(municipality, &None),
            };
            let output = run_selection(&engine, &selection)?;
            Ok(json!({
                "query": {
                    "kind": "summary",
                    "office": office.label(),
                    "cycle": cycle,
                },
                "summary": summary_report(&output.periods[0], &output.filter),
            }))
        }
    }
}

/// Runs one pass to completion. The CLI issues a single pass per
/// invocation, so a cancelled pass can only mean a programming error.
fn run_selection(engine: &ComparisonEngine, selection: &Selection) -> EngineResult<Arc<PassOutput>> {
    let token = engine.begin_pass();
    match engine.run_pass(selection, &token)? {
        Some(output) => Ok(output),
        None => whatever!("the pass was cancelled before it could commit"),
    }
}

fn parse_office(s: &str) -> EngineResult<Office> {
    match s.parse::<Office>() {
        Ok(office) => Ok(office),
        Err(message) => whatever!("{}", message),
    }
}

fn parse_round(round: Option<u8>) -> EngineResult<Option<Round>> {
    match round {
        None => Ok(None),
        Some(1) => Ok(Some(Round::First)),
        Some(2) => Ok(Some(Round::Second)),
        Some(x) => whatever!("round must be 1 or 2, got {}", x),
    }
}

fn parse_dimension(s: &str) -> EngineResult<Dimension> {
    match s.trim().to_lowercase().as_str() {
        "section" => Ok(Dimension::Section),
        "municipality" => Ok(Dimension::Municipality),
        x => whatever!("unknown dimension: {:?}", x),
    }
}

fn identity(name: &str, party: &str) -> CandidateIdentity {
    CandidateIdentity {
        name: normalize_label(name),
        party: normalize_label(party),
    }
}

fn filter_of(municipality: &Option<String>, neighborhood: &Option<String>) -> RecordFilter {
    RecordFilter {
        municipality: municipality.clone(),
        neighborhood: neighborhood.clone(),
        office: None,
    }
}
