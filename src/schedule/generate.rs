use rand::Rng;
use tracing::info;

use crate::config::EngineConfig;
use crate::constraints::PairMap;
use crate::error::Result;
use crate::roster::Participant;

use super::assign::assign_slots;
use super::blocks::build_blocks;
use super::grouping::{build_groups, GroupingParams};
use super::types::Allocation;

/// Fresh allocation for the playing participants: blocks, groups, slots.
pub fn generate_allocation<'a, I, R>(
    playing: I,
    pairings: &PairMap,
    avoidances: &PairMap,
    config: &EngineConfig,
    slots: &[String],
    rng: &mut R,
) -> Result<Allocation>
where
    I: IntoIterator<Item = &'a Participant>,
    R: Rng + ?Sized,
{
    let blocks = build_blocks(playing);
    let params = GroupingParams {
        pairings,
        avoidances,
        max_group_size: config.max_group_size,
        min_group_size: config.min_group_size,
        slot_count: slots.len(),
    };
    let outcome = build_groups(blocks, &params, rng)?;
    let (groups, returnable_slots) = assign_slots(outcome.groups, slots);

    let allocation = Allocation {
        groups,
        returnable_slots,
        warnings: outcome.warnings,
    };
    info!(
        players = allocation.total_players(),
        groups = allocation.groups.len(),
        returnable = allocation.returnable_slots.len(),
        "Generated allocation"
    );
    Ok(allocation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{ConstraintKind, ConstraintStore};
    use crate::error::TeeSheetError;
    use crate::roster::{Guest, TimePreference};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn participants(n: usize) -> Vec<Participant> {
        (0..n).map(|i| Participant::new(format!("P{}", i), i as u64)).collect()
    }

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("08:{:02}", i * 8)).collect()
    }

    #[test]
    fn test_partner_preference_scenario() {
        let mut players = participants(10);
        players.push(Participant::new("X", 10));
        players.push(Participant::new("Y", 11));
        let mut store = ConstraintStore::new();
        store.add(ConstraintKind::PartnerPreference, "X", "Y");

        for seed in 0..20 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let allocation = generate_allocation(
                &players,
                &store.resolve_pairings(),
                &store.resolve_avoidances(),
                &EngineConfig::default(),
                &labels(3),
                &mut rng,
            )
            .unwrap();
            assert_eq!(allocation.total_players(), 12);
            assert!(allocation.groups.len() <= 3);
            assert!(allocation.group_of("X").unwrap().contains("Y"));
        }
    }

    #[test]
    fn test_avoidance_scenario() {
        let mut players = participants(6);
        players.push(Participant::new("M", 6));
        players.push(Participant::new("N", 7));
        let mut store = ConstraintStore::new();
        store.add(ConstraintKind::Avoid, "M", "N");

        for seed in 0..20 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let allocation = generate_allocation(
                &players,
                &store.resolve_pairings(),
                &store.resolve_avoidances(),
                &EngineConfig::default(),
                &labels(2),
                &mut rng,
            )
            .unwrap();
            assert!(allocation.groups.len() <= 2);
            assert!(!allocation.group_of("M").unwrap().contains("N"));
            assert!(allocation.warnings.is_empty());
        }
    }

    #[test]
    fn test_spare_slots_are_returnable() {
        let mut players = participants(3);
        players[0].guests.push(Guest::anonymous());
        players[1].preference = Some(TimePreference::Late);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let empty = PairMap::new();
        let allocation = generate_allocation(
            &players,
            &empty,
            &empty,
            &EngineConfig::default(),
            &labels(4),
            &mut rng,
        )
        .unwrap();
        assert_eq!(allocation.groups.len(), 1);
        assert_eq!(allocation.groups[0].slot.as_deref(), Some("08:00"));
        assert!(allocation.groups[0].contains("P0 guest 1"));
        assert_eq!(allocation.returnable_slots, vec!["08:08", "08:16", "08:24"]);
    }

    #[test]
    fn test_no_slots_with_players_is_over_capacity() {
        let players = participants(1);
        let empty = PairMap::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let err = generate_allocation(
            &players,
            &empty,
            &empty,
            &EngineConfig::default(),
            &[],
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, TeeSheetError::CapacityExceeded { players: 1, capacity: 0 }));
    }
}
