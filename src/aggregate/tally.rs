use serde::Serialize;
use std::collections::HashMap;

/// Summed votes for one party.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartyTotal<'a> {
    pub party_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party_name: Option<&'a str>,
    pub votes: u64,
}

/// Groups by party code, keeping the first name seen, then sorts by votes
/// descending. The sort is stable, so tied parties stay in first-seen order.
pub fn accumulate<'a, I>(items: I) -> Vec<PartyTotal<'a>>
where
    I: IntoIterator<Item = PartyTotal<'a>>,
{
    let mut totals: Vec<PartyTotal<'a>> = Vec::new();
    let mut positions: HashMap<&'a str, usize> = HashMap::new();

    for item in items {
        match positions.get(item.party_code) {
            Some(&idx) => {
                let total = &mut totals[idx];
                total.votes = total.votes.saturating_add(item.votes);
            }
            None => {
                positions.insert(item.party_code, totals.len());
                totals.push(item);
            }
        }
    }

    totals.sort_by(|a, b| b.votes.cmp(&a.votes));
    totals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total<'a>(code: &'a str, votes: u64) -> PartyTotal<'a> {
        PartyTotal {
            party_code: code,
            party_name: None,
            votes,
        }
    }

    #[test]
    fn sums_and_sorts_descending() {
        let totals = accumulate([total("A", 10), total("B", 30), total("A", 25)]);
        assert_eq!(totals, vec![total("A", 35), total("B", 30)]);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let totals = accumulate([total("C", 5), total("A", 9), total("B", 5), total("D", 5)]);
        let codes: Vec<&str> = totals.iter().map(|t| t.party_code).collect();
        assert_eq!(codes, vec!["A", "C", "B", "D"]);
    }

    #[test]
    fn keeps_first_party_name() {
        let totals = accumulate([
            PartyTotal {
                party_code: "A",
                party_name: Some("Alpha"),
                votes: 1,
            },
            PartyTotal {
                party_code: "A",
                party_name: Some("Renamed"),
                votes: 1,
            },
        ]);
        assert_eq!(totals[0].party_name, Some("Alpha"));
        assert_eq!(totals[0].votes, 2);
    }
}
