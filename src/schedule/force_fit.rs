//! Last-resort repacking when the grouping phases produced more groups than
//! there are booked slots. Slots are pre-booked, so the ceiling is hard;
//! avoidances and host/guest cohesion give way if they must.

use tracing::{info, warn};

use crate::constraints::PairMap;

use super::grouping::{conflicts, draft_len, Draft, GroupingParams};
use super::types::{Block, PlacementWarning};

/// Repacks `groups` into at most `params.slot_count` groups.
///
/// Full groups are left alone at first and the rest are broken into units
/// packed largest first, best fit, into the free slots. If that packing has
/// to override an avoidance or split a host from their guests, the least
/// constrained full group is broken up as well and packing is retried. The
/// attempt with the fewest overrides wins.
///
/// Callers guarantee the total player count fits `slot_count × max`.
pub fn fit_to_slots(
    groups: Vec<Draft>,
    params: &GroupingParams,
    warnings: &mut Vec<PlacementWarning>,
) -> Vec<Draft> {
    let max = params.max_group_size;
    let (mut full, non_full): (Vec<Draft>, Vec<Draft>) =
        groups.into_iter().partition(|g| draft_len(g) >= max);
    let mut units = extract_units(non_full, params);
    let mut best: Option<(Vec<Draft>, Vec<PlacementWarning>)> = None;

    loop {
        let target = params.slot_count.saturating_sub(full.len());
        let mut attempt_warnings = Vec::new();
        let packed = pack(units.clone(), target, params, &mut attempt_warnings);

        let mut attempt = full.clone();
        attempt.extend(packed.into_iter().filter(|g| !g.is_empty()));
        let clean = attempt_warnings.is_empty();
        if best
            .as_ref()
            .map_or(true, |(_, w)| attempt_warnings.len() < w.len())
        {
            best = Some((attempt, attempt_warnings));
        }
        if clean || full.is_empty() {
            break;
        }

        let victim = full
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| {
                freedom_score(a, params)
                    .cmp(&freedom_score(b, params))
                    .then(ib.cmp(ia))
            })
            .map(|(i, _)| i)
            .unwrap_or(0);
        let victim = full.remove(victim);
        info!(
            size = draft_len(&victim),
            "Breaking apart a full group to make room"
        );
        units.extend(extract_units(vec![victim], params));
    }

    match best {
        Some((groups, attempt_warnings)) => {
            for warning in &attempt_warnings {
                warn!(%warning, "Constraint overridden to fit tee times");
            }
            warnings.extend(attempt_warnings);
            groups
        }
        None => full,
    }
}

/// Splits groups back into blocks, then re-joins blocks whose hosts want to
/// play together so repacking keeps them side by side.
fn extract_units(groups: Vec<Draft>, params: &GroupingParams) -> Vec<Draft> {
    let mut units: Vec<Draft> = groups.into_iter().flatten().map(|b| vec![b]).collect();

    loop {
        let mut merge = None;
        'search: for i in 0..units.len() {
            for j in (i + 1)..units.len() {
                if linked(params.pairings, &units[i], &units[j])
                    && draft_len(&units[i]) + draft_len(&units[j]) <= params.max_group_size
                {
                    merge = Some((i, j));
                    break 'search;
                }
            }
        }
        let Some((i, j)) = merge else {
            break;
        };
        let absorbed = units.remove(j);
        units[i].extend(absorbed);
    }
    units
}

fn linked(pairings: &PairMap, a: &[Block], b: &[Block]) -> bool {
    a.iter().any(|x| {
        pairings
            .get(&x.host)
            .is_some_and(|partners| b.iter().any(|y| partners.contains(&y.host)))
    })
}

/// Higher means fewer constraints, so cheaper to break apart.
fn freedom_score(group: &[Block], params: &GroupingParams) -> u32 {
    group
        .iter()
        .map(|block| {
            let mut score = 0;
            if !params.pairings.contains_key(&block.host) {
                score += 2;
            }
            if !params.avoidances.contains_key(&block.host) {
                score += 2;
            }
            if block.is_solo() {
                score += 1;
            }
            if block.preference.is_none() {
                score += 1;
            }
            score
        })
        .sum()
}

/// Index of the group with the least remaining space that still takes
/// `size` more players; `allow` filters candidates.
fn best_fit(groups: &[Draft], size: usize, max: usize, allow: impl Fn(&[Block]) -> bool) -> Option<usize> {
    groups
        .iter()
        .enumerate()
        .map(|(i, g)| (i, max.saturating_sub(draft_len(g)), g))
        .filter(|&(_, room, g)| room >= size && allow(g))
        .min_by_key(|&(i, room, _)| (room, i))
        .map(|(i, _, _)| i)
}

fn pack(
    mut units: Vec<Draft>,
    target: usize,
    params: &GroupingParams,
    warnings: &mut Vec<PlacementWarning>,
) -> Vec<Draft> {
    let max = params.max_group_size;
    units.sort_by(|a, b| draft_len(b).cmp(&draft_len(a)));
    let mut groups: Vec<Draft> = vec![Vec::new(); target];

    for unit in units {
        let size = draft_len(&unit);
        let clean = best_fit(&groups, size, max, |g| {
            unit.iter().all(|b| conflicts(params.avoidances, b, g).is_empty())
        });
        if let Some(idx) = clean {
            groups[idx].extend(unit);
            continue;
        }
        if let Some(idx) = best_fit(&groups, size, max, |_| true) {
            for block in &unit {
                note_override(block, &groups[idx], params, warnings);
            }
            groups[idx].extend(unit);
            continue;
        }
        for block in unit {
            place_block(&mut groups, block, params, warnings);
        }
    }
    groups
}

fn place_block(
    groups: &mut [Draft],
    block: Block,
    params: &GroupingParams,
    warnings: &mut Vec<PlacementWarning>,
) {
    let max = params.max_group_size;
    let clean = best_fit(groups, block.len(), max, |g| {
        conflicts(params.avoidances, &block, g).is_empty()
    });
    if let Some(idx) = clean {
        groups[idx].push(block);
        return;
    }
    if let Some(idx) = best_fit(groups, block.len(), max, |_| true) {
        note_override(&block, &groups[idx], params, warnings);
        groups[idx].push(block);
        return;
    }

    // Fragmented free space: spread the host and guests one by one.
    warnings.push(PlacementWarning::GuestsSplit {
        host: block.host.clone(),
    });
    for member in block.members {
        let single = Block {
            host: member.name.clone(),
            members: vec![member],
            preference: block.preference,
        };
        let clean = best_fit(groups, 1, max, |g| {
            conflicts(params.avoidances, &single, g).is_empty()
        });
        match clean.or(best_fit(groups, 1, max, |_| true)) {
            Some(idx) => {
                note_override(&single, &groups[idx], params, warnings);
                groups[idx].push(single);
            }
            None => {
                // Only reachable if the capacity precondition was broken;
                // keep the player on the sheet regardless.
                if let Some(smallest) = (0..groups.len()).min_by_key(|&i| draft_len(&groups[i])) {
                    groups[smallest].push(single);
                }
            }
        }
    }
}

fn note_override(block: &Block, group: &[Block], params: &GroupingParams, warnings: &mut Vec<PlacementWarning>) {
    let conflicts_with = conflicts(params.avoidances, block, group);
    if conflicts_with.is_empty() {
        return;
    }
    warnings.push(PlacementWarning::AvoidanceOverridden {
        player: block.host.clone(),
        conflicts_with,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{ConstraintKind, ConstraintStore};
    use crate::roster::TimePreference;
    use crate::schedule::types::Member;

    fn solo(name: &str) -> Block {
        Block {
            host: name.to_string(),
            members: vec![Member::player(name)],
            preference: None,
        }
    }

    fn pair(host: &str) -> Block {
        Block {
            host: host.to_string(),
            members: vec![Member::player(host), Member::guest(format!("{} guest 1", host), host)],
            preference: None,
        }
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

    #[test]
    fn test_three_pairs_into_two_slots() {
        // Two 3-balls and a 2-ball: merging alone can't get below 3 groups
        let empty = PairMap::new();
        let groups = vec![
            vec![pair("A"), solo("C")],
            vec![pair("B"), solo("D")],
            vec![solo("E"), solo("F")],
        ];
        let mut warnings = Vec::new();
        let out = fit_to_slots(groups, &params(&empty, &empty, 2), &mut warnings);
        assert_eq!(out.len(), 2);
        assert_eq!(out.iter().map(|g| draft_len(g)).sum::<usize>(), 8);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_full_groups_kept_when_free_slots_suffice() {
        let mut store = ConstraintStore::new();
        store.add(ConstraintKind::PartnerPreference, "A", "B");
        let pairings = store.resolve_pairings();
        let empty = PairMap::new();

        let constrained = vec![solo("A"), solo("B"), solo("C"), solo("D")];
        let free = vec![solo("E"), solo("F"), solo("G"), solo("H")];
        let leftover = vec![solo("I")];
        let groups = vec![constrained.clone(), free, leftover];

        let mut warnings = Vec::new();
        let out = fit_to_slots(groups, &params(&pairings, &empty, 3), &mut warnings);
        // I fits into a free slot without breaking anything
        assert_eq!(out.len(), 3);
        assert!(out.contains(&constrained));
    }

    #[test]
    fn test_breaks_freest_full_group_instead_of_overriding() {
        let mut store = ConstraintStore::new();
        store.add(ConstraintKind::PartnerPreference, "A", "B");
        store.add(ConstraintKind::Avoid, "M", "N");
        let pairings = store.resolve_pairings();
        let avoidances = store.resolve_avoidances();

        let constrained = vec![solo("A"), solo("B"), solo("C"), solo("D")];
        let free = vec![solo("E"), solo("F"), solo("G"), solo("H")];
        let groups = vec![constrained.clone(), free, vec![solo("M")], vec![solo("N")]];

        let mut warnings = Vec::new();
        let out = fit_to_slots(groups, &params(&pairings, &avoidances, 3), &mut warnings);
        assert_eq!(out.len(), 3);
        assert!(warnings.is_empty());
        assert!(out.contains(&constrained));
        let with_m = out.iter().find(|g| g.iter().any(|b| b.host == "M")).unwrap();
        assert!(!with_m.iter().any(|b| b.host == "N"));
    }

    #[test]
    fn test_freedom_score_prefers_unconstrained() {
        let mut store = ConstraintStore::new();
        store.add(ConstraintKind::Avoid, "A", "Z");
        let avoidances = store.resolve_avoidances();
        let empty = PairMap::new();
        let p = params(&empty, &avoidances, 1);

        let mut early = solo("C");
        early.preference = Some(TimePreference::Early);
        assert!(freedom_score(&[solo("B")], &p) > freedom_score(&[solo("A")], &p));
        assert!(freedom_score(&[solo("B")], &p) > freedom_score(&[early], &p));
        assert!(freedom_score(&[solo("B")], &p) > freedom_score(&[pair("D")], &p));
    }

    #[test]
    fn test_partners_stay_together_through_repack() {
        let mut store = ConstraintStore::new();
        store.add(ConstraintKind::PartnerPreference, "A", "B");
        let pairings = store.resolve_pairings();
        let empty = PairMap::new();
        let groups = vec![vec![solo("A"), solo("C")], vec![solo("B"), solo("D")], vec![solo("E")]];
        let mut warnings = Vec::new();
        let out = fit_to_slots(groups, &params(&pairings, &empty, 2), &mut warnings);
        assert_eq!(out.len(), 2);
        let with_a = out.iter().find(|g| g.iter().any(|b| b.host == "A")).unwrap();
        assert!(with_a.iter().any(|b| b.host == "B"));
    }

    #[test]
    fn test_avoidance_overridden_when_capacity_demands() {
        let mut store = ConstraintStore::new();
        store.add(ConstraintKind::Avoid, "M", "N");
        let avoidances = store.resolve_avoidances();
        let empty = PairMap::new();
        let groups = vec![vec![solo("M")], vec![solo("N")]];
        let mut warnings = Vec::new();
        let out = fit_to_slots(groups, &params(&empty, &avoidances, 1), &mut warnings);
        assert_eq!(out.len(), 1);
        assert_eq!(draft_len(&out[0]), 2);
        assert_eq!(
            warnings,
            vec![PlacementWarning::AvoidanceOverridden {
                player: "N".into(),
                conflicts_with: vec!["M".into()],
            }]
        );
    }

    #[test]
    fn test_fragmented_space_splits_guests() {
        // Blocks of 3, 3 and 2 fill two 4-balls only if the pair splits
        let empty = PairMap::new();
        let triple = |h: &str| Block {
            host: h.to_string(),
            members: vec![
                Member::player(h),
                Member::guest(format!("{} guest 1", h), h),
                Member::guest(format!("{} guest 2", h), h),
            ],
            preference: None,
        };
        let groups = vec![vec![triple("A")], vec![triple("B")], vec![pair("C")]];
        let mut warnings = Vec::new();
        let out = fit_to_slots(groups, &params(&empty, &empty, 2), &mut warnings);
        assert_eq!(out.len(), 2);
        assert_eq!(out.iter().map(|g| draft_len(g)).sum::<usize>(), 8);
        assert!(warnings
            .iter()
            .any(|w| matches!(w, PlacementWarning::GuestsSplit { .. })));
    }
}
