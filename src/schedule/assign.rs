use crate::roster::TimePreference;

use super::grouping::{draft_len, Draft};
use super::types::{Group, GroupId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SlotBand {
    Early,
    Neutral,
    Late,
}

fn band(draft: &Draft) -> SlotBand {
    let has = |pref| draft.iter().any(|b| b.preference == Some(pref));
    match (has(TimePreference::Early), has(TimePreference::Late)) {
        (true, false) => SlotBand::Early,
        (false, true) => SlotBand::Late,
        _ => SlotBand::Neutral,
    }
}

/// Orders groups early → neutral → late (smaller groups first within a
/// band) and binds them to `slots` in order. Returns the groups and the
/// trailing slots left unused.
pub fn assign_slots(drafts: Vec<Draft>, slots: &[String]) -> (Vec<Group>, Vec<String>) {
    let mut ordered: Vec<(SlotBand, usize, Draft)> = drafts
        .into_iter()
        .map(|d| (band(&d), draft_len(&d), d))
        .collect();
    // stable: equal keys keep grouping order
    ordered.sort_by_key(|(band, len, _)| (*band, *len));

    let groups: Vec<Group> = ordered
        .into_iter()
        .enumerate()
        .map(|(i, (_, _, draft))| Group {
            id: GroupId(i),
            slot: slots.get(i).cloned(),
            members: draft.into_iter().flat_map(|b| b.members).collect(),
        })
        .collect();

    let returnable = slots.iter().skip(groups.len()).cloned().collect();
    (groups, returnable)
}
