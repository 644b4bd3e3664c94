pub mod tally;

use crate::models::{District, ResultRecord};
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
pub use tally::PartyTotal;

/// Everything the dashboards display, derived from the reference data and
/// the raw result list. Borrows its inputs and never mutates them.
#[derive(Debug, Clone, Serialize)]
pub struct DerivedView<'a> {
    /// Newest first; equal timestamps keep submission order.
    pub results_sorted: Vec<&'a ResultRecord>,
    pub latest_result: Option<&'a ResultRecord>,
    pub latest_per_division: BTreeMap<&'a str, &'a ResultRecord>,
    pub district_rollup: Vec<DistrictRollup<'a>>,
    pub winners: Vec<DistrictWinner<'a>>,
    pub district_totals: Vec<DistrictTotal<'a>>,
    pub island_totals: Vec<PartyTotal<'a>>,
    pub total_districts: usize,
    pub complete_districts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistrictRollup<'a> {
    pub ed_code: &'a str,
    pub ed_name: &'a str,
    pub division_codes: Vec<&'a str>,
    pub reported_divisions: Vec<&'a str>,
    pub reported_count: usize,
    pub total_divisions: usize,
    pub coverage_ratio: f64,
    pub complete: bool,
    pub parties: Vec<PartyTotal<'a>>,
    pub parties_count: usize,
    pub top_party: Option<&'a str>,
    pub top_votes: u64,
    pub total_votes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistrictWinner<'a> {
    pub ed_code: &'a str,
    pub ed_name: &'a str,
    pub party_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party_name: Option<&'a str>,
    pub votes: u64,
    pub complete: bool,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistrictTotal<'a> {
    pub ed_code: &'a str,
    pub ed_name: &'a str,
    pub total_votes: u64,
    pub top_party: Option<&'a str>,
    pub top_votes: u64,
    pub coverage: f64,
}

impl<'a> DistrictRollup<'a> {
    pub fn winner(&self) -> Option<&PartyTotal<'a>> {
        self.parties.first()
    }
}

/// Recomputes every derived statistic from scratch.
pub fn derive<'a>(districts: &'a [District], results: &'a [ResultRecord]) -> DerivedView<'a> {
    let mut results_sorted: Vec<&ResultRecord> = results.iter().collect();
    results_sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let latest_result = results_sorted.first().copied();

    let latest_per_division = latest_per_division(results);

    let district_rollup: Vec<DistrictRollup> = districts
        .iter()
        .map(|district| rollup(district, &latest_per_division))
        .collect();

    let winners = district_rollup
        .iter()
        .filter_map(|d| {
            d.winner().map(|top| DistrictWinner {
                ed_code: d.ed_code,
                ed_name: d.ed_name,
                party_code: top.party_code,
                party_name: top.party_name,
                votes: top.votes,
                complete: d.complete,
                ratio: d.coverage_ratio,
            })
        })
        .collect();

    let district_totals = district_rollup
        .iter()
        .map(|d| DistrictTotal {
            ed_code: d.ed_code,
            ed_name: d.ed_name,
            total_votes: d.total_votes,
            top_party: d.top_party,
            top_votes: d.top_votes,
            coverage: d.coverage_ratio,
        })
        .collect();

    let island_totals =
        tally::accumulate(district_rollup.iter().flat_map(|d| d.parties.iter().cloned()));

    let total_districts = district_rollup.len();
    let complete_districts = district_rollup.iter().filter(|d| d.complete).count();

    DerivedView {
        results_sorted,
        latest_result,
        latest_per_division,
        district_rollup,
        winners,
        district_totals,
        island_totals,
        total_districts,
        complete_districts,
    }
}

/// Most recent record per division code. District-level reports (no
/// division) are left out. On equal `createdAt` the earlier entry stays.
pub fn latest_per_division(results: &[ResultRecord]) -> BTreeMap<&str, &ResultRecord> {
    let mut latest: BTreeMap<&str, &ResultRecord> = BTreeMap::new();
    for record in results {
        let Some(code) = record.report.division_code() else {
            continue;
        };
        match latest.entry(code) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(mut slot) => {
                if record.created_at > slot.get().created_at {
                    slot.insert(record);
                }
            }
        }
    }
    latest
}

fn rollup<'a>(
    district: &'a District,
    latest: &BTreeMap<&'a str, &'a ResultRecord>,
) -> DistrictRollup<'a> {
    let division_codes: Vec<&str> = district.divisions.iter().map(|d| d.id.as_str()).collect();
    let reported: Vec<(&str, &ResultRecord)> = division_codes
        .iter()
        .filter_map(|code| latest.get(code).map(|record| (*code, *record)))
        .collect();

    let reported_count = reported.len();
    let total_divisions = division_codes.len();
    let coverage_ratio = if total_divisions == 0 {
        0.0
    } else {
        reported_count as f64 / total_divisions as f64
    };
    let complete = total_divisions > 0 && reported_count == total_divisions;

    let parties = tally::accumulate(reported.iter().flat_map(|&(_, record)| {
        record.report.by_party.iter().map(|p| PartyTotal {
            party_code: p.party_code.as_str(),
            party_name: p.party_name.as_deref(),
            votes: p.votes,
        })
    }));

    let top_party = parties.first().map(|p| p.party_code);
    let top_votes = parties.first().map_or(0, |p| p.votes);
    let total_votes = parties.iter().map(|p| p.votes).sum();

    DistrictRollup {
        ed_code: &district.id,
        ed_name: district.display_name(),
        division_codes,
        reported_divisions: reported.iter().map(|(code, _)| *code).collect(),
        reported_count,
        total_divisions,
        coverage_ratio,
        complete,
        parties_count: parties.len(),
        parties,
        top_party,
        top_votes,
        total_votes,
    }
}
