//! Minimal edits to a published tee sheet.
//!
//! Once a sheet has been announced, roster changes only touch the groups
//! that hold the players who came or went. Everyone else keeps their group
//! and their time.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::constraints::{avoids, PairMap};
use crate::error::{Result, TeeSheetError};

use super::types::{Block, Group, GroupId, Member, PlacementWarning};

/// Who came and went, in sheet order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeReport {
    pub removed: Vec<String>,
    pub added: Vec<String>,
    /// Tee times that groups were on and are no longer available
    pub returned_slots: Vec<String>,
}

impl ChangeReport {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty() && self.returned_slots.is_empty()
    }

    /// One line for the header of an updated sheet
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.removed.is_empty() {
            parts.push(format!("Removed: {}", self.removed.join(", ")));
        }
        if !self.added.is_empty() {
            parts.push(format!("Added: {}", self.added.join(", ")));
        }
        if !self.returned_slots.is_empty() {
            parts.push(format!("Returned: {}", self.returned_slots.join(", ")));
        }
        parts.join("; ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Adjustment {
    /// Same players and tee times as published; keep the stored rendering
    Unchanged,
    Changed {
        groups: Vec<Group>,
        report: ChangeReport,
        warnings: Vec<PlacementWarning>,
    },
}

/// Settings the diff needs from the engine configuration
#[derive(Debug, Clone, Copy)]
pub struct AdjustParams<'a> {
    pub avoidances: &'a PairMap,
    /// Tee times available now, in order
    pub slots: &'a [String],
    pub max_group_size: usize,
    pub min_group_size: usize,
}

/// Brings `published` in line with the `current` playing blocks and the
/// available tee times.
///
/// Dropped players leave their groups; groups that lost players and fell
/// below the minimum merge into the smallest compatible group with room,
/// or stay short; new blocks join the smallest compatible group with room,
/// or open a new group with no tee time. Groups on a returned tee time lose
/// it, and while there are more groups than tee times the loosest group is
/// spread over the others.
pub fn adjust(published: &[Group], current: &[Block], params: &AdjustParams) -> Adjustment {
    let current_names: HashSet<&str> = current.iter().flat_map(Block::names).collect();
    let published_names: HashSet<&str> = published.iter().flat_map(Group::names).collect();

    let removed: Vec<String> = published
        .iter()
        .flat_map(Group::names)
        .filter(|n| !current_names.contains(n))
        .map(str::to_string)
        .collect();
    let added: Vec<String> = current
        .iter()
        .flat_map(Block::names)
        .filter(|n| !published_names.contains(n))
        .map(str::to_string)
        .collect();
    let returned_slots: Vec<String> = published
        .iter()
        .filter_map(|g| g.slot.as_ref())
        .filter(|s| !params.slots.contains(*s))
        .cloned()
        .collect();

    if removed.is_empty()
        && added.is_empty()
        && returned_slots.is_empty()
        && published.len() <= params.slots.len()
    {
        debug!("Roster and tee times match published sheet");
        return Adjustment::Unchanged;
    }

    let mut groups = published.to_vec();
    let mut warnings = Vec::new();
    let released = release_slots(&mut groups, params.slots);
    let mut affected = drop_members(&mut groups, &current_names);
    merge_short_groups(&mut groups, &affected, params);
    insert_blocks(&mut groups, current, &published_names, params, &mut warnings);
    affected.extend(released.iter().copied());
    fit_to_slot_count(&mut groups, &affected, params, &mut warnings);
    rebind_released(&mut groups, &released, params.slots);

    for warning in &warnings {
        warn!(%warning, "Republished with a placement warning");
    }
    info!(
        removed = removed.len(),
        added = added.len(),
        returned = returned_slots.len(),
        groups = groups.len(),
        "Adjusted published sheet"
    );
    Adjustment::Changed {
        groups,
        report: ChangeReport {
            removed,
            added,
            returned_slots,
        },
        warnings,
    }
}

/// Unbinds groups from tee times that are gone; returns their ids
fn release_slots(groups: &mut [Group], slots: &[String]) -> Vec<GroupId> {
    let mut released = Vec::new();
    for group in groups.iter_mut() {
        if group.slot.as_ref().is_some_and(|s| !slots.contains(s)) {
            debug!(group = %group.id, slot = group.slot_label(), "Tee time returned");
            group.slot = None;
            released.push(group.id);
        }
    }
    released
}

/// Gives groups that lost their tee time the first free one, if any.
/// Groups opened for newcomers stay TBC until a full republish.
fn rebind_released(groups: &mut [Group], released: &[GroupId], slots: &[String]) {
    for idx in 0..groups.len() {
        if groups[idx].slot.is_some() || !released.contains(&groups[idx].id) {
            continue;
        }
        let free = slots
            .iter()
            .find(|s| !groups.iter().any(|g| g.slot.as_ref() == Some(*s)))
            .cloned();
        if let Some(slot) = free {
            debug!(group = %groups[idx].id, slot = %slot, "Moved to a free tee time");
            groups[idx].slot = Some(slot);
        }
    }
}

/// Removes everyone not in `keep` and returns the ids of groups that lost
/// someone. Emptied groups are dropped.
fn drop_members(groups: &mut Vec<Group>, keep: &HashSet<&str>) -> Vec<GroupId> {
    let mut affected = Vec::new();
    for group in groups.iter_mut() {
        let before = group.len();
        group.members.retain(|m| keep.contains(m.name.as_str()));
        if group.len() < before {
            affected.push(group.id);
        }
    }
    groups.retain(|g| !g.is_empty());
    affected
}

fn clashes(avoidances: &PairMap, incoming: &[Member], group: &Group) -> bool {
    incoming
        .iter()
        .any(|m| group.names().any(|n| avoids(avoidances, &m.name, n)))
}

fn fits(group: &Group, incoming: &[Member], params: &AdjustParams) -> bool {
    group.len() + incoming.len() <= params.max_group_size && !clashes(params.avoidances, incoming, group)
}

/// Smallest group (lowest position on ties) with room for `incoming` and no
/// avoidance clash, skipping `exclude`
fn smallest_fit(
    groups: &[Group],
    incoming: &[Member],
    exclude: Option<GroupId>,
    params: &AdjustParams,
) -> Option<usize> {
    groups
        .iter()
        .enumerate()
        .filter(|(_, g)| Some(g.id) != exclude)
        .filter(|(_, g)| fits(g, incoming, params))
        .min_by_key(|(i, g)| (g.len(), *i))
        .map(|(i, _)| i)
}

/// Smallest group with room for `size` more, avoidances ignored
fn smallest_with_room(groups: &[Group], size: usize, params: &AdjustParams) -> Option<usize> {
    groups
        .iter()
        .enumerate()
        .filter(|(_, g)| g.len() + size <= params.max_group_size)
        .min_by_key(|(i, g)| (g.len(), *i))
        .map(|(i, _)| i)
}

fn merge_short_groups(groups: &mut Vec<Group>, affected: &[GroupId], params: &AdjustParams) {
    for id in affected {
        let Some(source) = groups.iter().position(|g| g.id == *id) else {
            continue;
        };
        if groups[source].len() >= params.min_group_size {
            continue;
        }
        let members = groups[source].members.clone();
        let Some(target) = smallest_fit(groups, &members, Some(*id), params) else {
            debug!(group = %id, "Short group kept; nowhere to merge it");
            continue;
        };
        debug!(from = %id, into = %groups[target].id, "Merging short group");
        groups[target].members.extend(members);
        groups.remove(source);
    }
}

fn next_id(groups: &[Group]) -> GroupId {
    GroupId(groups.iter().map(|g| g.id.0 + 1).max().unwrap_or(0))
}

fn open_group(groups: &mut Vec<Group>, members: Vec<Member>, host: &str) {
    let id = next_id(groups);
    debug!(group = %id, host, "Opening a new group without a tee time");
    groups.push(Group {
        id,
        slot: None,
        members,
    });
}

/// Joins the smallest compatible group, or opens a new one
fn place_new(groups: &mut Vec<Group>, incoming: Vec<Member>, host: &str, params: &AdjustParams) {
    match smallest_fit(groups, &incoming, None, params) {
        Some(idx) => groups[idx].members.extend(incoming),
        None => open_group(groups, incoming, host),
    }
}

fn insert_blocks(
    groups: &mut Vec<Group>,
    current: &[Block],
    published_names: &HashSet<&str>,
    params: &AdjustParams,
    warnings: &mut Vec<PlacementWarning>,
) {
    for block in current {
        let incoming: Vec<Member> = block
            .members
            .iter()
            .filter(|m| !published_names.contains(m.name.as_str()))
            .cloned()
            .collect();
        if incoming.is_empty() {
            continue;
        }

        match groups.iter().position(|g| g.contains(&block.host)) {
            None => place_new(groups, incoming, &block.host, params),
            Some(h) if fits(&groups[h], &incoming, params) => groups[h].members.extend(incoming),
            Some(h) => keep_block_together(groups, h, block, incoming, params, warnings),
        }
    }
}

fn in_block(block: &Block, member: &Member) -> bool {
    block.members.iter().any(|b| b.name == member.name)
}

/// New guests of a host whose group has no room for them. In order: the
/// whole block moves to a group with room, players without guests make
/// room in the host's group, the block takes a spare tee time, and only
/// then do the guests go elsewhere.
fn keep_block_together(
    groups: &mut Vec<Group>,
    h: usize,
    block: &Block,
    incoming: Vec<Member>,
    params: &AdjustParams,
    warnings: &mut Vec<PlacementWarning>,
) {
    let from = groups[h].id;
    let mut moving: Vec<Member> = groups[h]
        .members
        .iter()
        .filter(|m| in_block(block, m))
        .cloned()
        .collect();
    moving.extend(incoming.iter().cloned());

    if moving.len() <= params.max_group_size {
        if let Some(target) = smallest_fit(groups, &moving, Some(from), params) {
            debug!(host = %block.host, from = %from, into = %groups[target].id, "Moving block to fit new guests");
            groups[h].members.retain(|m| !in_block(block, m));
            groups[target].members.extend(moving);
            groups.retain(|g| !g.is_empty());
            return;
        }
        if make_room(groups, h, block, &incoming, params) {
            groups[h].members.extend(incoming);
            return;
        }
        if groups.len() < params.slots.len() {
            groups[h].members.retain(|m| !in_block(block, m));
            open_group(groups, moving, &block.host);
            groups.retain(|g| !g.is_empty());
            return;
        }
    }

    warnings.push(PlacementWarning::GuestsSplit {
        host: block.host.clone(),
    });
    place_new(groups, incoming, &block.host, params);
}

/// A player with no guests who is not part of `block`
fn can_make_room(member: &Member, group: &Group, block: &Block) -> bool {
    !member.is_guest()
        && !in_block(block, member)
        && !group
            .members
            .iter()
            .any(|o| o.host.as_deref() == Some(member.name.as_str()))
}

/// Moves players without guests out of group `h`, last listed first, until
/// `incoming` fits. Leaves `groups` untouched when that is not possible.
fn make_room(
    groups: &mut Vec<Group>,
    h: usize,
    block: &Block,
    incoming: &[Member],
    params: &AdjustParams,
) -> bool {
    let mut trial = groups.clone();
    let from = trial[h].id;
    while trial[h].len() + incoming.len() > params.max_group_size {
        let Some(pos) = trial[h]
            .members
            .iter()
            .rposition(|m| can_make_room(m, &trial[h], block))
        else {
            return false;
        };
        let member = trial[h].members.remove(pos);
        let Some(target) = smallest_fit(&trial, std::slice::from_ref(&member), Some(from), params) else {
            return false;
        };
        debug!(player = %member.name, into = %trial[target].id, "Making room for new guests");
        trial[target].members.push(member);
    }
    if clashes(params.avoidances, incoming, &trial[h]) {
        return false;
    }
    *groups = trial;
    true
}

/// Dissolves groups until there are no more groups than tee times. Groups
/// without a time go first, then groups already disturbed, then the
/// smallest.
fn fit_to_slot_count(
    groups: &mut Vec<Group>,
    affected: &[GroupId],
    params: &AdjustParams,
    warnings: &mut Vec<PlacementWarning>,
) {
    while groups.len() > params.slots.len() {
        let Some(idx) = groups
            .iter()
            .enumerate()
            .min_by_key(|(i, g)| (g.slot.is_some(), !affected.contains(&g.id), g.len(), *i))
            .map(|(i, _)| i)
        else {
            break;
        };
        let Group { id, slot, members } = groups.remove(idx);
        debug!(group = %id, "Spreading group over the others to fit the tee times");
        let leftover = spread(groups, members, params, warnings);
        if !leftover.is_empty() {
            warn!(group = %id, "No room left to spread group; more groups than tee times");
            groups.push(Group {
                id,
                slot,
                members: leftover,
            });
            break;
        }
    }
}

/// Splits members back into host blocks, in order of first appearance
fn host_units(members: Vec<Member>) -> Vec<(String, Vec<Member>)> {
    let mut units: Vec<(String, Vec<Member>)> = Vec::new();
    for member in members {
        let host = member.host.clone().unwrap_or_else(|| member.name.clone());
        match units.iter_mut().find(|(h, _)| *h == host) {
            Some((_, unit)) => unit.push(member),
            None => units.push((host, vec![member])),
        }
    }
    units
}

fn note_overrides(group: &Group, unit: &[Member], avoidances: &PairMap, warnings: &mut Vec<PlacementWarning>) {
    for member in unit {
        let conflicts: Vec<String> = group
            .names()
            .filter(|n| avoids(avoidances, &member.name, n))
            .map(str::to_string)
            .collect();
        if !conflicts.is_empty() {
            warnings.push(PlacementWarning::AvoidanceOverridden {
                player: member.name.clone(),
                conflicts_with: conflicts,
            });
        }
    }
}

/// Places `members` into the remaining groups, largest block first.
/// Returns whoever found no room at all.
fn spread(
    groups: &mut [Group],
    members: Vec<Member>,
    params: &AdjustParams,
    warnings: &mut Vec<PlacementWarning>,
) -> Vec<Member> {
    let mut units = host_units(members);
    units.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    let mut leftover = Vec::new();
    for (host, unit) in units {
        if let Some(idx) = place_unit(groups, &unit, params, warnings) {
            groups[idx].members.extend(unit);
            continue;
        }
        if unit.len() > 1 {
            warnings.push(PlacementWarning::GuestsSplit { host });
        }
        for member in unit {
            let single = std::slice::from_ref(&member);
            match place_unit(groups, single, params, warnings) {
                Some(idx) => groups[idx].members.push(member),
                None => leftover.push(member),
            }
        }
    }
    leftover
}

/// Target for `unit`: a clean fit, or failing that any group with room
/// with the overridden avoidances noted
fn place_unit(
    groups: &[Group],
    unit: &[Member],
    params: &AdjustParams,
    warnings: &mut Vec<PlacementWarning>,
) -> Option<usize> {
    if let Some(idx) = smallest_fit(groups, unit, None, params) {
        return Some(idx);
    }
    let idx = smallest_with_room(groups, unit.len(), params)?;
    note_overrides(&groups[idx], unit, params.avoidances, warnings);
    Some(idx)
}

fn find_player(groups: &[Group], name: &str) -> Result<(usize, usize)> {
    groups
        .iter()
        .enumerate()
        .find_map(|(gi, g)| {
            g.members
                .iter()
                .position(|m| m.name.eq_ignore_ascii_case(name))
                .map(|mi| (gi, mi))
        })
        .ok_or_else(|| TeeSheetError::UnknownPlayer(name.to_string()))
}

/// Swaps two players between groups. Names match case-insensitively;
/// returns the names as they appear on the sheet.
pub fn swap_players(groups: &mut [Group], a: &str, b: &str) -> Result<(String, String)> {
    let (ga, ma) = find_player(groups, a)?;
    let (gb, mb) = find_player(groups, b)?;
    let name_a = groups[ga].members[ma].name.clone();
    let name_b = groups[gb].members[mb].name.clone();
    if ga == gb {
        return Err(TeeSheetError::SameGroup(name_a, name_b));
    }

    let member_a = groups[ga].members[ma].clone();
    let member_b = std::mem::replace(&mut groups[gb].members[mb], member_a);
    groups[ga].members[ma] = member_b;
    info!(a = %name_a, b = %name_b, "Swapped players");
    Ok((name_a, name_b))
}

/// Moves a player into group `group_number` (1-based, as printed).
/// The target may end up above the usual group size; the caller asked.
pub fn move_player(groups: &mut Vec<Group>, name: &str, group_number: usize) -> Result<String> {
    if group_number == 0 || group_number > groups.len() {
        return Err(TeeSheetError::NoSuchGroup {
            group: group_number,
            groups: groups.len(),
        });
    }
    let target = group_number - 1;
    let (gi, mi) = find_player(groups, name)?;
    let member = groups[gi].members[mi].clone();
    if gi == target {
        return Err(TeeSheetError::SameGroup(
            member.name.clone(),
            format!("group {}", group_number),
        ));
    }

    groups[gi].members.remove(mi);
    groups[target].members.push(member.clone());
    groups.retain(|g| !g.is_empty());
    info!(player = %member.name, group = group_number, "Moved player");
    Ok(member.name)
}
