use std::collections::{HashMap, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::constraints::{avoids, PairMap};
use crate::error::{Result, TeeSheetError};

use super::force_fit::fit_to_slots;
use super::types::{Block, Member, PlacementWarning};

/// A group under construction
pub type Draft = Vec<Block>;

/// Everything the grouping phases consult besides the blocks themselves
#[derive(Debug, Clone, Copy)]
pub struct GroupingParams<'a> {
    pub pairings: &'a PairMap,
    pub avoidances: &'a PairMap,
    pub max_group_size: usize,
    pub min_group_size: usize,
    pub slot_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct GroupingOutcome {
    pub groups: Vec<Draft>,
    pub warnings: Vec<PlacementWarning>,
}

pub fn draft_len(draft: &[Block]) -> usize {
    draft.iter().map(Block::len).sum()
}

/// Names already in `draft` that someone in `block` avoids
pub fn conflicts(avoidances: &PairMap, block: &Block, draft: &[Block]) -> Vec<String> {
    let mut found = Vec::new();
    for existing in draft.iter().flat_map(|b| b.names()) {
        if block.names().any(|n| avoids(avoidances, n, existing)) {
            found.push(existing.to_string());
        }
    }
    found
}

fn drafts_conflict(avoidances: &PairMap, a: &[Block], b: &[Block]) -> bool {
    a.iter().any(|block| !conflicts(avoidances, block, b).is_empty())
}

fn can_join(params: &GroupingParams, block: &Block, draft: &[Block]) -> bool {
    draft_len(draft) + block.len() <= params.max_group_size
        && conflicts(params.avoidances, block, draft).is_empty()
}

/// Packs blocks into groups of at most `max_group_size`, never more groups
/// than `slot_count`.
///
/// Phases, in order: preference-first seeding, filling the rest, merging
/// small groups, balancing undersized groups, and finally forcing the
/// result into the slot ceiling. Only the neutral-block order in the
/// second phase draws on `rng`.
pub fn build_groups<R: Rng + ?Sized>(
    blocks: Vec<Block>,
    params: &GroupingParams,
    rng: &mut R,
) -> Result<GroupingOutcome> {
    let players: usize = blocks.iter().map(Block::len).sum();
    if players == 0 {
        return Ok(GroupingOutcome::default());
    }
    let capacity = params.slot_count * params.max_group_size;
    if players > capacity {
        return Err(TeeSheetError::CapacityExceeded { players, capacity });
    }

    let mut warnings = Vec::new();
    let blocks = split_oversized(blocks, params.max_group_size, &mut warnings);

    let (mut groups, used) = seed_preferences(&blocks, params);
    fill_remaining(&mut groups, &blocks, &used, params, rng);
    debug!(groups = groups.len(), players, "Placed all blocks");

    consolidate(&mut groups, params);
    balance(&mut groups, params);

    if groups.len() > params.slot_count {
        debug!(
            groups = groups.len(),
            slots = params.slot_count,
            "Too many groups for the booked slots; forcing fit"
        );
        groups = fit_to_slots(groups, params, &mut warnings);
    }

    Ok(GroupingOutcome { groups, warnings })
}

/// A host with more guests than a group holds cannot stay together.
fn split_oversized(
    blocks: Vec<Block>,
    max_group_size: usize,
    warnings: &mut Vec<PlacementWarning>,
) -> Vec<Block> {
    let mut out = Vec::with_capacity(blocks.len());
    for block in blocks {
        if block.len() <= max_group_size {
            out.push(block);
            continue;
        }
        warn!(host = %block.host, size = block.len(), "Block larger than a group; splitting");
        warnings.push(PlacementWarning::GuestsSplit {
            host: block.host.clone(),
        });
        for (i, chunk) in block.members.chunks(max_group_size).enumerate() {
            let members: Vec<Member> = chunk.to_vec();
            let host = if i == 0 {
                block.host.clone()
            } else {
                members[0].name.clone()
            };
            out.push(Block {
                host,
                members,
                preference: block.preference,
            });
        }
    }
    out
}

/// Phase 1: blocks whose host has a pairing seed a group and pull in their
/// partners while there is room and nobody objects.
fn seed_preferences(blocks: &[Block], params: &GroupingParams) -> (Vec<Draft>, HashSet<String>) {
    let by_host: HashMap<&str, &Block> = blocks.iter().map(|b| (b.host.as_str(), b)).collect();

    let mut seeds: Vec<&Block> = blocks
        .iter()
        .filter(|b| params.pairings.contains_key(&b.host))
        .collect();
    seeds.sort_by(|a, b| b.len().cmp(&a.len()));

    let mut groups = Vec::new();
    let mut used = HashSet::new();

    for block in seeds {
        if used.contains(&block.host) {
            continue;
        }
        let mut draft = vec![block.clone()];
        used.insert(block.host.clone());

        for partner in params.pairings.get(&block.host).into_iter().flatten() {
            if used.contains(partner) {
                continue;
            }
            let Some(partner_block) = by_host.get(partner.as_str()) else {
                continue;
            };
            if can_join(params, partner_block, &draft) {
                draft.push((*partner_block).clone());
                used.insert(partner.clone());
                if draft_len(&draft) >= params.max_group_size {
                    break;
                }
            }
        }
        groups.push(draft);
    }

    (groups, used)
}

/// Lower is better. Time-preference blocks look for a group sharing their
/// preference; neutral blocks stay out of groups that have one so the
/// preference holders still find room.
fn fill_rank(block: &Block, draft: &[Block]) -> u8 {
    match block.preference {
        Some(pref) => {
            if draft.iter().any(|b| b.preference == Some(pref)) {
                0
            } else {
                1
            }
        }
        None => {
            if draft.iter().any(|b| b.preference.is_some()) {
                1
            } else {
                0
            }
        }
    }
}

/// Phase 2: everything not seeded joins the best existing group or starts
/// a new one.
fn fill_remaining<R: Rng + ?Sized>(
    groups: &mut Vec<Draft>,
    blocks: &[Block],
    used: &HashSet<String>,
    params: &GroupingParams,
    rng: &mut R,
) {
    let remaining: Vec<&Block> = blocks.iter().filter(|b| !used.contains(&b.host)).collect();
    let (mut with_pref, mut neutral): (Vec<&Block>, Vec<&Block>) =
        remaining.into_iter().partition(|b| b.preference.is_some());
    with_pref.sort_by(|a, b| b.len().cmp(&a.len()));
    neutral.shuffle(rng);

    for block in with_pref.into_iter().chain(neutral) {
        let mut candidates: Vec<usize> = (0..groups.len()).collect();
        candidates.sort_by_key(|&i| (fill_rank(block, &groups[i]), draft_len(&groups[i]), i));

        match candidates.into_iter().find(|&i| can_join(params, block, &groups[i])) {
            Some(i) => groups[i].push(block.clone()),
            None => groups.push(vec![block.clone()]),
        }
    }
}

/// Phase 3: merge the smallest compatible pair until nothing fits together.
fn consolidate(groups: &mut Vec<Draft>, params: &GroupingParams) {
    loop {
        groups.sort_by_key(|g| draft_len(g));
        let mut merge = None;

        'search: for i in 0..groups.len() {
            if draft_len(&groups[i]) >= params.max_group_size {
                continue;
            }
            for j in (i + 1)..groups.len() {
                if draft_len(&groups[i]) + draft_len(&groups[j]) <= params.max_group_size
                    && !drafts_conflict(params.avoidances, &groups[i], &groups[j])
                {
                    merge = Some((i, j));
                    break 'search;
                }
            }
        }

        let Some((i, j)) = merge else {
            break;
        };
        let absorbed = groups.remove(j);
        groups[i].extend(absorbed);
    }
}

/// Phase 4: top up groups below the preferred floor with solo players from
/// groups that can spare them (2 and 4 becomes 3 and 3).
fn balance(groups: &mut Vec<Draft>, params: &GroupingParams) {
    let min = params.min_group_size;
    loop {
        groups.sort_by_key(|g| draft_len(g));
        let mut improved = false;

        for i in 0..groups.len() {
            if draft_len(&groups[i]) >= min {
                break;
            }
            for j in ((i + 1)..groups.len()).rev() {
                if draft_len(&groups[j]) <= min {
                    continue;
                }
                let mut k = groups[j].len();
                while k > 0 {
                    k -= 1;
                    if draft_len(&groups[i]) >= min || draft_len(&groups[j]) <= min {
                        break;
                    }
                    let candidate = &groups[j][k];
                    if candidate.is_solo()
                        && conflicts(params.avoidances, candidate, &groups[i]).is_empty()
                    {
                        let moved = groups[j].remove(k);
                        debug!(player = %moved.host, "Balancing: moved into smaller group");
                        groups[i].push(moved);
                        improved = true;
                    }
                }
            }
            if improved {
                break;
            }
        }

        if !improved {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{ConstraintKind, ConstraintStore};
    use crate::roster::TimePreference;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn solo(name: &str) -> Block {
        Block {
            host: name.to_string(),
            members: vec![Member::player(name)],
            preference: None,
        }
    }

    fn with_guests(name: &str, guests: usize) -> Block {
        let mut block = solo(name);
        for g in 0..guests {
            block
                .members
                .push(Member::guest(format!("{} guest {}", name, g + 1), name));
        }
        block
    }

    fn with_pref(name: &str, pref: TimePreference) -> Block {
        Block {
            preference: Some(pref),
            ..solo(name)
        }
    }

    fn names(n: usize) -> Vec<Block> {
        (0..n).map(|i| solo(&format!("P{}", i))).collect()
    }

    fn params<'a>(pairings: &'a PairMap, avoidances: &'a PairMap, slots: usize) -> GroupingParams<'a> {
        GroupingParams {
            pairings,
            avoidances,
            max_group_size: 4,
            min_group_size: 3,
            slot_count: slots,
        }
    }

    fn group_with<'a>(groups: &'a [Draft], name: &str) -> &'a Draft {
        groups
            .iter()
            .find(|g| g.iter().any(|b| b.names().any(|n| n == name)))
            .unwrap()
    }

    fn sizes(groups: &[Draft]) -> Vec<usize> {
        let mut s: Vec<usize> = groups.iter().map(|g| draft_len(g)).collect();
        s.sort();
        s
    }

    #[test]
    fn test_empty_input() {
        let empty = PairMap::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let outcome = build_groups(Vec::new(), &params(&empty, &empty, 0), &mut rng).unwrap();
        assert!(outcome.groups.is_empty());
    }

    #[test]
    fn test_over_capacity_is_an_error() {
        let empty = PairMap::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = build_groups(names(9), &params(&empty, &empty, 2), &mut rng).unwrap_err();
        assert!(matches!(err, TeeSheetError::CapacityExceeded { players: 9, capacity: 8 }));
    }

    #[test]
    fn test_partners_share_a_group() {
        let mut store = ConstraintStore::new();
        store.add(ConstraintKind::PartnerPreference, "X", "Y");
        let pairings = store.resolve_pairings();
        let empty = PairMap::new();

        let mut blocks = names(10);
        blocks.insert(3, solo("X"));
        blocks.push(solo("Y"));

        for seed in 0..20 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let outcome = build_groups(blocks.clone(), &params(&pairings, &empty, 3), &mut rng).unwrap();
            assert_eq!(outcome.groups.len(), 3);
            let g = group_with(&outcome.groups, "X");
            assert!(g.iter().any(|b| b.host == "Y"), "seed {}", seed);
        }
    }

    #[test]
    fn test_avoiders_are_kept_apart() {
        let mut store = ConstraintStore::new();
        store.add(ConstraintKind::Avoid, "M", "N");
        let avoidances = store.resolve_avoidances();
        let empty = PairMap::new();

        let mut blocks = names(6);
        blocks.insert(1, solo("M"));
        blocks.insert(4, solo("N"));

        for seed in 0..20 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let outcome = build_groups(blocks.clone(), &params(&empty, &avoidances, 2), &mut rng).unwrap();
            assert!(outcome.groups.len() <= 2);
            let g = group_with(&outcome.groups, "M");
            assert!(!g.iter().any(|b| b.host == "N"), "seed {}", seed);
            assert!(outcome.warnings.is_empty());
        }
    }

    #[test]
    fn test_balancing_turns_four_and_two_into_three_and_three() {
        let empty = PairMap::new();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let outcome = build_groups(names(6), &params(&empty, &empty, 3), &mut rng).unwrap();
        assert_eq!(sizes(&outcome.groups), vec![3, 3]);
    }

    #[test]
    fn test_balancing_never_splits_a_host_from_guests() {
        let empty = PairMap::new();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        // A 4-ball made of two host+guest pairs can't donate anyone
        let blocks = vec![with_guests("A", 1), with_guests("B", 1), solo("C"), solo("D")];
        let p = GroupingParams {
            min_group_size: 3,
            ..params(&empty, &empty, 2)
        };
        let outcome = build_groups(blocks, &p, &mut rng).unwrap();
        for g in &outcome.groups {
            for b in g {
                if b.host == "A" || b.host == "B" {
                    assert_eq!(b.len(), 2);
                }
            }
        }
        assert_eq!(draft_len(&outcome.groups.concat()), 6);
    }

    #[test]
    fn test_time_preferences_cluster() {
        let empty = PairMap::new();
        let mut blocks = names(4);
        blocks.push(with_pref("E1", TimePreference::Early));
        blocks.push(with_pref("L1", TimePreference::Late));
        blocks.push(with_pref("E2", TimePreference::Early));
        blocks.push(with_pref("L2", TimePreference::Late));

        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let outcome = build_groups(blocks, &params(&empty, &empty, 3), &mut rng).unwrap();
        let early = group_with(&outcome.groups, "E1");
        assert!(early.iter().any(|b| b.host == "E2"));
        let late = group_with(&outcome.groups, "L1");
        assert!(late.iter().any(|b| b.host == "L2"));
    }

    #[test]
    fn test_neutral_blocks_prefer_groups_without_preferences() {
        let early_group = vec![with_pref("E", TimePreference::Early)];
        let plain_group = vec![solo("A")];
        let neutral = solo("N");
        let early = with_pref("E2", TimePreference::Early);
        assert!(fill_rank(&neutral, &plain_group) < fill_rank(&neutral, &early_group));
        assert!(fill_rank(&early, &early_group) < fill_rank(&early, &plain_group));
    }

    #[test]
    fn test_consolidation_minimises_groups() {
        // Avoidances force early splits; consolidation merges what it can
        let mut store = ConstraintStore::new();
        store.add(ConstraintKind::Avoid, "A", "B");
        store.add(ConstraintKind::Avoid, "B", "C");
        let avoidances = store.resolve_avoidances();
        let empty = PairMap::new();
        let blocks = vec![solo("A"), solo("B"), solo("C"), solo("D")];
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let outcome = build_groups(blocks, &params(&empty, &avoidances, 4), &mut rng).unwrap();
        assert_eq!(outcome.groups.len(), 2);
        let b = group_with(&outcome.groups, "B");
        assert!(b.iter().all(|blk| blk.host != "A" && blk.host != "C"));
    }

    #[test]
    fn test_oversized_block_is_split_with_warning() {
        let empty = PairMap::new();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let outcome = build_groups(vec![with_guests("Big", 5)], &params(&empty, &empty, 2), &mut rng).unwrap();
        assert_eq!(sizes(&outcome.groups), vec![2, 4]);
        assert_eq!(
            outcome.warnings,
            vec![PlacementWarning::GuestsSplit { host: "Big".into() }]
        );
    }

    #[test]
    fn test_same_seed_same_groups() {
        let empty = PairMap::new();
        let run = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            build_groups(names(11), &params(&empty, &empty, 3), &mut rng)
                .unwrap()
                .groups
        };
        assert_eq!(run(42), run(42));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn roster(guest_counts: &[usize]) -> Vec<Block> {
            guest_counts
                .iter()
                .enumerate()
                .map(|(i, &g)| with_guests(&format!("P{}", i), g))
                .collect()
        }

        proptest! {
            #[test]
            fn every_player_placed_exactly_once(
                guest_counts in proptest::collection::vec(0usize..3, 0..30),
                extra_slots in 0usize..3,
                seed in any::<u64>(),
                avoid_pairs in proptest::collection::vec((0usize..30, 0usize..30), 0..8),
            ) {
                let blocks = roster(&guest_counts);
                let players: usize = blocks.iter().map(Block::len).sum();
                let slots = (players + 3) / 4 + extra_slots;

                let mut store = ConstraintStore::new();
                for (a, b) in avoid_pairs {
                    if a != b && a < guest_counts.len() && b < guest_counts.len() {
                        store.add(ConstraintKind::Avoid, &format!("P{}", a), &format!("P{}", b));
                    }
                }
                let avoidances = store.resolve_avoidances();
                let empty = PairMap::new();

                let mut expected: Vec<String> = blocks
                    .iter()
                    .flat_map(|b| b.members.iter().map(|m| m.name.clone()))
                    .collect();
                expected.sort();

                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let outcome = build_groups(blocks, &params(&empty, &avoidances, slots), &mut rng).unwrap();

                let mut placed: Vec<String> = outcome
                    .groups
                    .iter()
                    .flatten()
                    .flat_map(|b| b.members.iter().map(|m| m.name.clone()))
                    .collect();
                placed.sort();

                prop_assert_eq!(placed, expected);
                prop_assert!(outcome.groups.len() <= slots);
                prop_assert!(outcome.groups.iter().all(|g| draft_len(g) <= 4));
            }

            #[test]
            fn tight_capacity_still_fits_slots(
                guest_counts in proptest::collection::vec(0usize..2, 1..24),
                seed in any::<u64>(),
            ) {
                let blocks = roster(&guest_counts);
                let players: usize = blocks.iter().map(Block::len).sum();
                let slots = (players + 3) / 4;
                let empty = PairMap::new();
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let outcome = build_groups(blocks, &params(&empty, &empty, slots), &mut rng).unwrap();
                prop_assert!(outcome.groups.len() <= slots);
                prop_assert_eq!(outcome.groups.iter().map(|g| draft_len(g)).sum::<usize>(), players);
            }
        }
    }
}
