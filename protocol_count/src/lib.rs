mod config;
pub mod builder;
pub mod geo;
pub mod images;
pub mod manual;
pub mod store;
pub mod verification;

use log::{debug, info, warn};

use std::cmp::Ordering;
use std::collections::BTreeMap;

pub use crate::config::*;
use crate::store::ProtocolStore;

/// Partitions the protocols by ward.
///
/// This is a full group-by over the collection: protocols for the same ward do not need
/// to be adjacent in the input. Inside a group, the input order is preserved.
pub fn group_by_ward(protocols: &[Protocol]) -> BTreeMap<WardId, Vec<&Protocol>> {
    let mut groups: BTreeMap<WardId, Vec<&Protocol>> = BTreeMap::new();
    for p in protocols.iter() {
        groups.entry(p.ward.clone()).or_default().push(p);
    }
    groups
}

// Greater means preferred.
fn compare_preference(a: &Protocol, b: &Protocol, mode: SelectionMode) -> Ordering {
    let by_endorsement = a.net_endorsement().cmp(&b.net_endorsement());
    let by_update = a.update_time.cmp(&b.update_time);
    let ranked = match mode {
        SelectionMode::ApprovalsFirst => by_endorsement.then(by_update),
        SelectionMode::LatestFirst => by_update.then(by_endorsement),
    };
    a.verified
        .cmp(&b.verified)
        .then(ranked)
        // The lowest id wins the last tie.
        .then_with(|| b.id.cmp(&a.id))
}

/// Picks the protocol retained for a ward among all the protocols submitted for it.
///
/// Returns None only for an empty group.
pub fn select_protocol<'a>(
    protocols: &[&'a Protocol],
    rules: &CountingRules,
) -> Option<&'a Protocol> {
    protocols
        .iter()
        .copied()
        .max_by(|a, b| compare_preference(a, b, rules.selection_mode))
}

/// The canonical result of a ward, given all the protocols submitted for it.
///
/// The counts of exactly one protocol are returned: competing submissions are never
/// merged together.
pub fn select_result(protocols: &[Protocol], rules: &CountingRules) -> Option<BallotResult> {
    let refs: Vec<&Protocol> = protocols.iter().collect();
    select_protocol(&refs, rules).map(BallotResult::from)
}

/// Sums the votes of one ballot, retaining one protocol per ward.
///
/// The result does not depend on the order of the input.
pub fn sum_votes(protocols: &[Protocol], rules: &CountingRules) -> CountingResult<BallotResult> {
    tally_ballot(protocols, rules).map(|t| t.total)
}

/// Like `sum_votes`, with the breakdown per ward.
pub fn tally_ballot(protocols: &[Protocol], rules: &CountingRules) -> CountingResult<BallotTally> {
    info!(
        "Processing {:?} protocols, rules: {:?}",
        protocols.len(),
        rules
    );

    let ballot = protocols.first().map(|p| p.ballot);
    if let Some(b) = ballot {
        if let Some(other) = protocols.iter().find(|p| p.ballot != b) {
            return InvalidArgumentSnafu {
                reason: format!(
                    "protocol {} belongs to ballot {}, expected {}",
                    other.id, other.ballot, b
                ),
            }
            .fail();
        }
    }

    let groups = group_by_ward(protocols);
    debug!("tally_ballot: {} wards", groups.len());

    let mut total: Option<BallotResult> = None;
    let mut wards: Vec<WardTally> = Vec::new();
    let mut contested_wards: Vec<WardId> = Vec::new();
    for (ward, group) in groups.iter() {
        let selected = match select_protocol(group, rules) {
            Some(p) => p,
            None => continue,
        };
        if group.len() > 1 {
            warn!(
                "tally_ballot: ward {} has {} competing protocols, retaining {}",
                ward,
                group.len(),
                selected.id
            );
            contested_wards.push(ward.clone());
        }
        let result = BallotResult::from(selected);
        debug!("tally_ballot: ward {}: {:?}", ward, result);
        total
            .get_or_insert_with(|| BallotResult::zero(result.votes_count_per_option.len()))
            .accumulate(&result, ward)?;
        wards.push(WardTally {
            ward: ward.clone(),
            submissions: group.len(),
            selected: selected.id,
            result,
        });
    }

    let total = total.unwrap_or_default();
    info!(
        "Ballot {:?}: {} wards, {} contested, total {:?}",
        ballot,
        wards.len(),
        contested_wards.len(),
        total
    );
    Ok(BallotTally {
        ballot,
        total,
        wards,
        contested_wards,
        protocol_count: protocols.len(),
    })
}

/// Fetches all the protocols of a ballot and tallies them.
///
/// A ballot without any protocol yields the zero result.
pub fn count_ballot<S: ProtocolStore + ?Sized>(
    store: &S,
    ballot: &Ballot,
    rules: &CountingRules,
) -> CountingResult<BallotTally> {
    let protocols = store.find_by_ballot(ballot);
    debug!("count_ballot: {} protocols for {}", protocols.len(), ballot);
    let mut tally = tally_ballot(&protocols, rules)?;
    tally.ballot = Some(*ballot);
    Ok(tally)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    fn approved(mut p: Protocol, actors: &[&str]) -> Protocol {
        for a in actors {
            p.approvals.insert(a.to_string());
        }
        p
    }

    fn deprecated(mut p: Protocol, actors: &[&str]) -> Protocol {
        for a in actors {
            p.deprecations.insert(a.to_string());
        }
        p
    }

    #[test]
    fn sum_two_wards() {
        init();
        let w1 = protocol_with_counts("146501", 1, 100, 80, 78, &[40, 38]);
        let w2 = protocol_with_counts("146501", 2, 50, 40, 39, &[20, 19]);
        let res = sum_votes(&[w1, w2], &CountingRules::DEFAULT_RULES).unwrap();
        assert_eq!(res.voters_entitled_count, 150);
        assert_eq!(res.votes_cast_count, 120);
        assert_eq!(res.votes_valid_count, 117);
        assert_eq!(res.votes_count_per_option, vec![60, 57]);
    }

    #[test]
    fn sum_is_independent_of_input_order() {
        init();
        let a1 = protocol_at("146501", 1, &[10, 5], 0);
        let a2 = approved(protocol_at("146501", 1, &[11, 4], 5), &["alice"]);
        let b1 = protocol_at("146501", 2, &[3, 3], 1);
        let c1 = protocol_at("020101", 7, &[8, 1], 2);
        let c2 = protocol_at("020101", 7, &[9, 1], 3);

        let ordered = vec![a1.clone(), a2.clone(), b1.clone(), c1.clone(), c2.clone()];
        let interleaved = vec![c2.clone(), a1.clone(), b1.clone(), c1.clone(), a2.clone()];
        let reversed: Vec<Protocol> = ordered.iter().rev().cloned().collect();

        let expected = sum_votes(&ordered, &CountingRules::DEFAULT_RULES).unwrap();
        assert_eq!(
            sum_votes(&interleaved, &CountingRules::DEFAULT_RULES).unwrap(),
            expected
        );
        assert_eq!(
            sum_votes(&reversed, &CountingRules::DEFAULT_RULES).unwrap(),
            expected
        );
        // a2 (approved) and c2 (latest) are retained.
        assert_eq!(expected.votes_count_per_option, vec![11 + 3 + 9, 4 + 3 + 1]);
    }

    #[test]
    fn non_adjacent_protocols_are_grouped() {
        let a1 = protocol("146501", 1, &[1]);
        let b1 = protocol("146501", 2, &[1]);
        let a2 = protocol("146501", 1, &[1]);
        let input = vec![a1, b1, a2];
        let groups = group_by_ward(&input);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&WardId::new("146501", 1)].len(), 2);
    }

    #[test]
    fn verified_protocol_is_selected() {
        let mut a = protocol("146501", 1, &[40, 38]);
        a.verified = true;
        let b = approved(protocol_at("146501", 1, &[50, 28], 60), &["alice", "bob"]);
        let res = select_result(&[b, a.clone()], &CountingRules::DEFAULT_RULES);
        assert_eq!(res, Some(BallotResult::from(&a)));
    }

    #[test]
    fn selection_returns_one_of_the_inputs() {
        let a = protocol("146501", 1, &[40, 38]);
        let b = protocol("146501", 1, &[20, 19]);
        let c = protocol("146501", 1, &[1, 1]);
        let input = vec![a, b, c];
        let res = select_result(&input, &CountingRules::DEFAULT_RULES).unwrap();
        assert!(input.iter().any(|p| BallotResult::from(p) == res));
    }

    #[test]
    fn selection_modes() {
        let endorsed = approved(protocol_at("146501", 1, &[1, 0], 0), &["alice"]);
        let latest = protocol_at("146501", 1, &[0, 1], 30);
        let input = vec![endorsed.clone(), latest.clone()];

        let approvals_first = select_result(&input, &CountingRules::DEFAULT_RULES);
        assert_eq!(approvals_first, Some(BallotResult::from(&endorsed)));

        let rules = CountingRules {
            selection_mode: SelectionMode::LatestFirst,
        };
        assert_eq!(
            select_result(&input, &rules),
            Some(BallotResult::from(&latest))
        );
    }

    #[test]
    fn deprecations_count_against_a_protocol() {
        let a = deprecated(
            approved(protocol("146501", 1, &[1, 0]), &["alice"]),
            &["bob", "carol"],
        );
        let b = protocol("146501", 1, &[0, 1]);
        let res = select_result(&[a, b.clone()], &CountingRules::DEFAULT_RULES);
        assert_eq!(res, Some(BallotResult::from(&b)));
    }

    #[test]
    fn full_tie_is_broken_by_lowest_id() {
        let a = protocol("146501", 1, &[1, 0]);
        let b = protocol("146501", 1, &[0, 1]);
        let lowest = if a.id < b.id { a.clone() } else { b.clone() };
        for input in [vec![a.clone(), b.clone()], vec![b, a]] {
            let res = select_result(&input, &CountingRules::DEFAULT_RULES);
            assert_eq!(res, Some(BallotResult::from(&lowest)));
        }
    }

    #[test]
    fn empty_group_selects_nothing() {
        assert_eq!(select_result(&[], &CountingRules::DEFAULT_RULES), None);
    }

    #[test]
    fn empty_ballot_sums_to_zero() {
        let res = sum_votes(&[], &CountingRules::DEFAULT_RULES).unwrap();
        assert_eq!(res, BallotResult::zero(0));
    }

    #[test]
    fn mismatched_options_fail() {
        let a = protocol("146501", 1, &[1, 2]);
        let b = protocol("146501", 2, &[1, 2, 3]);
        let res = sum_votes(&[a, b], &CountingRules::DEFAULT_RULES);
        assert_eq!(
            res,
            Err(CountingError::ShapeMismatch {
                expected: 2,
                found: 3,
                ward: "146501/2".to_string()
            })
        );
    }

    #[test]
    fn overflowing_counts_fail() {
        let a = protocol_with_counts("146501", 1, u64::MAX, 10, 10, &[5, 5]);
        let b = protocol_with_counts("146501", 2, 1, 1, 1, &[1, 0]);
        assert!(matches!(
            sum_votes(&[a, b], &CountingRules::DEFAULT_RULES),
            Err(CountingError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn overflow_leaves_accumulator_untouched() {
        let mut acc = BallotResult {
            voters_entitled_count: 10,
            votes_count_per_option: vec![u64::MAX, 1],
            ..Default::default()
        };
        let before = acc.clone();
        let other = BallotResult {
            voters_entitled_count: 5,
            votes_count_per_option: vec![0, 1],
            ..Default::default()
        };
        let big = BallotResult {
            votes_count_per_option: vec![1, 0],
            ..other.clone()
        };
        assert!(acc.accumulate(&big, &WardId::new("146501", 2)).is_err());
        assert_eq!(acc, before);
        acc.accumulate(&other, &WardId::new("146501", 2)).unwrap();
        assert_eq!(acc.votes_count_per_option, vec![u64::MAX, 2]);
    }

    #[test]
    fn mixed_ballots_are_rejected() {
        let a = protocol("146501", 1, &[1, 2]);
        let mut b = protocol("146501", 2, &[1, 2]);
        b.ballot.no = 2;
        assert!(matches!(
            sum_votes(&[a, b], &CountingRules::DEFAULT_RULES),
            Err(CountingError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn tally_reports_contested_wards() {
        let a1 = protocol_at("146501", 1, &[10, 5], 0);
        let a2 = protocol_at("146501", 1, &[11, 4], 5);
        let b1 = protocol_at("146501", 2, &[3, 3], 1);
        let tally = tally_ballot(&[a1, b1.clone(), a2.clone()], &CountingRules::DEFAULT_RULES)
            .unwrap();
        assert_eq!(tally.protocol_count, 3);
        assert_eq!(tally.contested_wards, vec![WardId::new("146501", 1)]);
        assert_eq!(tally.wards.len(), 2);
        assert_eq!(tally.wards[0].submissions, 2);
        assert_eq!(tally.wards[0].selected, a2.id);
        assert_eq!(tally.wards[1].selected, b1.id);
        assert_eq!(tally.total.votes_count_per_option, vec![14, 7]);
    }

    #[test]
    fn count_ballot_reads_from_store() {
        let w1 = protocol_with_counts("146501", 1, 100, 80, 78, &[40, 38]);
        let mut other = protocol("146501", 2, &[1000, 1000]);
        other.ballot.no = 2;
        let store = store::MemoryProtocolStore::from_protocols(vec![w1, other]).unwrap();
        let tally = count_ballot(&store, &ballot(), &CountingRules::DEFAULT_RULES).unwrap();
        assert_eq!(tally.ballot, Some(ballot()));
        assert_eq!(tally.total.votes_count_per_option, vec![40, 38]);

        let empty = Ballot {
            no: 3,
            ..ballot()
        };
        let tally = count_ballot(&store, &empty, &CountingRules::DEFAULT_RULES).unwrap();
        assert_eq!(tally.total, BallotResult::zero(0));
        assert!(tally.wards.is_empty());
    }
}
