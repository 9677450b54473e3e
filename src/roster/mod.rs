//! Signup roster and capacity bookkeeping.
//!
//! Signup order decides who holds a playing spot. Existing participants are
//! never reordered; only new arrivals get new positions, so playing/reserve
//! status is a pure function of (ordered roster, capacity).

pub mod participant;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, TeeSheetError};

pub use participant::{
    ExtractedPlayer, ExtractionDelta, Guest, GuestEdit, Participant, Status, TimePreference,
};

/// Names whose status flipped during a recompute
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanges {
    /// reserve → playing
    pub promoted: Vec<String>,
    /// playing → reserve
    pub demoted: Vec<String>,
}

impl StatusChanges {
    pub fn is_empty(&self) -> bool {
        self.promoted.is_empty() && self.demoted.is_empty()
    }

    pub fn absorb(&mut self, other: StatusChanges) {
        self.promoted.extend(other.promoted);
        self.demoted.extend(other.demoted);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Playing,
    Reserve,
    Exists,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub removed: bool,
    pub was_status: Option<Status>,
    pub promoted: Vec<String>,
}

/// Participants kept in signup order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    participants: Vec<Participant>,
    #[serde(default)]
    next_index: u64,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Playing participants in signup order
    pub fn playing(&self) -> Vec<&Participant> {
        self.participants.iter().filter(|p| p.is_playing()).collect()
    }

    /// Reserves in waitlist order
    pub fn reserves(&self) -> Vec<&Participant> {
        self.participants
            .iter()
            .filter(|p| p.status == Status::Reserve)
            .collect()
    }

    /// Spots taken by playing participants and their guests
    pub fn spots_used(&self) -> usize {
        self.playing().iter().map(|p| p.block_size()).sum()
    }

    fn allocate_index(&mut self) -> u64 {
        let index = self.next_index.max(index_floor(&self.participants));
        self.next_index = index + 1;
        index
    }

    /// Recomputes playing/reserve status from signup order and capacity.
    ///
    /// Walks the roster in signup order taking `1 + guests` spots per
    /// participant. The first participant that does not fit, and everyone
    /// after them, is a reserve, so a shrinking capacity always demotes the
    /// most recent signups first. A later, smaller participant never takes
    /// leftover spots ahead of an earlier one who did not fit.
    pub fn recompute_statuses(&mut self, capacity: usize) -> StatusChanges {
        self.participants.sort_by_key(|p| p.signup_index);

        let mut changes = StatusChanges::default();
        let mut spots_used = 0;
        let mut full = false;

        for participant in &mut self.participants {
            let block_size = participant.block_size();
            let new_status = if !full && spots_used + block_size <= capacity {
                spots_used += block_size;
                Status::Playing
            } else {
                full = true;
                Status::Reserve
            };

            if new_status != participant.status {
                match (participant.status, new_status) {
                    (Status::New, _) => {}
                    (_, Status::Playing) => changes.promoted.push(participant.name.clone()),
                    _ => changes.demoted.push(participant.name.clone()),
                }
                participant.status = new_status;
            }
        }

        if !changes.is_empty() {
            info!(
                promoted = ?changes.promoted,
                demoted = ?changes.demoted,
                capacity,
                "Roster statuses changed"
            );
        }
        changes
    }

    /// Adds a participant at the back of the signup order.
    pub fn add_manually(
        &mut self,
        name: &str,
        guests: Vec<Guest>,
        preference: Option<TimePreference>,
        capacity: usize,
    ) -> Result<AddOutcome> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TeeSheetError::MissingName);
        }
        if self.contains(name) {
            return Ok(AddOutcome::Exists);
        }

        let index = self.allocate_index();
        let mut participant = Participant::new(name, index);
        participant.guests = guests;
        participant.preference = preference;
        participant.manually_added = true;
        self.participants.push(participant);

        self.recompute_statuses(capacity);
        let outcome = match self.get(name).map(|p| p.status) {
            Some(Status::Playing) => AddOutcome::Playing,
            _ => AddOutcome::Reserve,
        };
        debug!(name, ?outcome, "Added participant");
        Ok(outcome)
    }

    /// Removes a participant and the guests they host.
    pub fn remove(&mut self, name: &str, capacity: usize) -> RemoveOutcome {
        let Some(position) = self.participants.iter().position(|p| p.name == name) else {
            return RemoveOutcome::default();
        };
        let removed = self.participants.remove(position);
        let changes = self.recompute_statuses(capacity);
        debug!(name, "Removed participant");
        RemoveOutcome {
            removed: true,
            was_status: Some(removed.status),
            promoted: changes.promoted,
        }
    }

    pub fn add_guest(&mut self, host: &str, guest: Guest, capacity: usize) -> Result<StatusChanges> {
        let participant = self
            .participants
            .iter_mut()
            .find(|p| p.name == host)
            .ok_or_else(|| TeeSheetError::UnknownPlayer(host.to_string()))?;
        if guest.name.is_none() || !participant.guests.contains(&guest) {
            participant.guests.push(guest);
        }
        Ok(self.recompute_statuses(capacity))
    }

    /// Removes a guest by label from one host, or from every host when
    /// `host` is `None`.
    pub fn remove_guest(
        &mut self,
        guest_name: &str,
        host: Option<&str>,
        capacity: usize,
    ) -> Result<StatusChanges> {
        if let Some(host) = host {
            if !self.contains(host) {
                return Err(TeeSheetError::UnknownPlayer(host.to_string()));
            }
        }

        let mut removed = false;
        for participant in &mut self.participants {
            if host.is_some_and(|h| h != participant.name) {
                continue;
            }
            let labels = participant.guest_labels();
            if let Some(idx) = labels.iter().position(|label| label == guest_name) {
                participant.guests.remove(idx);
                removed = true;
            }
        }

        if !removed {
            return Err(TeeSheetError::UnknownPlayer(guest_name.to_string()));
        }
        Ok(self.recompute_statuses(capacity))
    }

    pub fn set_time_preference(&mut self, name: &str, preference: Option<TimePreference>) -> Result<()> {
        let participant = self
            .participants
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| TeeSheetError::UnknownPlayer(name.to_string()))?;
        participant.preference = preference;
        Ok(())
    }

    pub fn clear_time_preferences(&mut self) {
        for participant in &mut self.participants {
            participant.preference = None;
        }
    }

    /// Merges the extraction service's ordered list into the roster.
    ///
    /// Reappearing names keep their signup index and status; new names are
    /// appended in the order supplied. Manually added participants the
    /// extractor did not see are kept, as are their guests and any time
    /// preference the extractor failed to report. A list shorter than
    /// `existing × min_ratio` is treated as a failed scrape and rejected.
    pub fn replace_from_extraction(
        &mut self,
        players: Vec<ExtractedPlayer>,
        capacity: usize,
        min_ratio: f64,
    ) -> Result<StatusChanges> {
        let mut seen = HashSet::new();
        let players: Vec<ExtractedPlayer> = players
            .into_iter()
            .filter(|p| !p.name.trim().is_empty() && seen.insert(p.name.trim().to_string()))
            .collect();

        let existing = self.participants.len();
        if existing > 0 && (players.len() as f64) < existing as f64 * min_ratio {
            warn!(
                incoming = players.len(),
                existing, "Extraction looks truncated; keeping existing roster"
            );
            return Err(TeeSheetError::SuspiciousShrink {
                incoming: players.len(),
                existing,
            });
        }

        let previous = std::mem::take(&mut self.participants);
        let mut next_index = self.next_index.max(index_floor(&previous));
        let mut merged = Vec::with_capacity(players.len());

        for player in players {
            let name = player.name.trim().to_string();
            match previous.iter().find(|p| p.name == name) {
                Some(old) => {
                    let mut guests = player.guests;
                    if old.manually_added {
                        for guest in &old.guests {
                            if guest.name.is_some() && !guests.contains(guest) {
                                guests.push(guest.clone());
                            }
                        }
                    }
                    merged.push(Participant {
                        name,
                        signup_index: old.signup_index,
                        guests,
                        preference: player.preference.or(old.preference),
                        status: old.status,
                        manually_added: old.manually_added,
                    });
                }
                None => {
                    let mut participant = Participant::new(name, next_index);
                    next_index += 1;
                    participant.guests = player.guests;
                    participant.preference = player.preference;
                    merged.push(participant);
                }
            }
        }

        for old in previous {
            if old.manually_added && !merged.iter().any(|p| p.name == old.name) {
                debug!(name = %old.name, "Keeping manually added participant missed by extraction");
                merged.push(old);
            }
        }

        self.participants = merged;
        self.next_index = next_index;
        Ok(self.recompute_statuses(capacity))
    }

    /// Applies incremental extraction output as individual edits.
    pub fn apply_delta(&mut self, delta: ExtractionDelta, capacity: usize) -> StatusChanges {
        let mut changes = StatusChanges::default();

        for player in delta.add {
            match self.add_manually(&player.name, player.guests, player.preference, capacity) {
                Ok(outcome) => debug!(name = %player.name, ?outcome, "Delta add"),
                Err(e) => warn!(name = %player.name, error = %e, "Skipping delta add"),
            }
        }

        for name in delta.remove {
            let outcome = self.remove(&name, capacity);
            changes.promoted.extend(outcome.promoted);
        }

        for edit in delta.guest_add {
            let Some(host) = edit.host.as_deref() else {
                continue;
            };
            match self.add_guest(host, Guest::parse(&edit.guest_name), capacity) {
                Ok(c) => changes.absorb(c),
                Err(e) => warn!(host, guest = %edit.guest_name, error = %e, "Skipping delta guest add"),
            }
        }

        for edit in delta.guest_remove {
            match self.remove_guest(&edit.guest_name, edit.host.as_deref(), capacity) {
                Ok(c) => changes.absorb(c),
                Err(e) => warn!(guest = %edit.guest_name, error = %e, "Skipping delta guest remove"),
            }
        }

        changes
    }

    /// Weekly reset: everyone goes
    pub fn clear(&mut self) {
        self.participants.clear();
        self.next_index = 0;
    }
}

fn index_floor(participants: &[Participant]) -> u64 {
    participants
        .iter()
        .map(|p| p.signup_index + 1)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster_of(names: &[&str], capacity: usize) -> Roster {
        let mut roster = Roster::new();
        for name in names {
            roster.add_manually(name, Vec::new(), None, capacity).unwrap();
        }
        roster
    }

    fn names(ps: &[&Participant]) -> Vec<String> {
        ps.iter().map(|p| p.name.clone()).collect()
    }

    #[test]
    fn test_capacity_splits_playing_and_reserve() {
        let roster = roster_of(&["A", "B", "C", "D", "E", "F", "G", "H", "I", "J"], 8);
        assert_eq!(names(&roster.playing()), vec!["A", "B", "C", "D", "E", "F", "G", "H"]);
        assert_eq!(names(&roster.reserves()), vec!["I", "J"]);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let mut roster = roster_of(&["A", "B", "C", "D", "E"], 4);
        assert!(roster.recompute_statuses(4).is_empty());
        assert!(roster.recompute_statuses(4).is_empty());
    }

    #[test]
    fn test_shrinking_capacity_demotes_latest_first() {
        let mut roster = roster_of(&["A", "B", "C", "D", "E", "F"], 8);
        let changes = roster.recompute_statuses(4);
        assert_eq!(changes.demoted, vec!["E", "F"]);
        assert!(changes.promoted.is_empty());

        let changes = roster.recompute_statuses(5);
        assert_eq!(changes.promoted, vec!["E"]);
    }

    #[test]
    fn test_guests_take_spots_and_block_later_signups() {
        let mut roster = Roster::new();
        roster.add_manually("A", vec![Guest::anonymous(), Guest::anonymous()], None, 4).unwrap();
        // B fits, C would overflow, D is after C so stays reserve too
        assert_eq!(roster.add_manually("B", Vec::new(), None, 4).unwrap(), AddOutcome::Playing);
        roster.add_manually("C", vec![Guest::named("X")], None, 4).unwrap();
        assert_eq!(roster.add_manually("D", Vec::new(), None, 4).unwrap(), AddOutcome::Reserve);
        assert_eq!(names(&roster.reserves()), vec!["C", "D"]);
        assert_eq!(roster.spots_used(), 4);
    }

    #[test]
    fn test_later_small_signup_does_not_jump_queue() {
        let mut roster = Roster::new();
        roster.add_manually("A", vec![Guest::anonymous(), Guest::anonymous()], None, 5).unwrap();
        roster.add_manually("B", vec![Guest::anonymous(), Guest::anonymous()], None, 5).unwrap();
        // two spots are left, but C signed up after B
        assert_eq!(roster.add_manually("C", Vec::new(), None, 5).unwrap(), AddOutcome::Reserve);
        assert_eq!(names(&roster.reserves()), vec!["B", "C"]);
        assert_eq!(roster.spots_used(), 3);
    }

    #[test]
    fn test_add_existing_is_noop() {
        let mut roster = roster_of(&["A"], 4);
        assert_eq!(roster.add_manually("A", Vec::new(), None, 4).unwrap(), AddOutcome::Exists);
        assert_eq!(roster.len(), 1);
        assert!(matches!(
            roster.add_manually("  ", Vec::new(), None, 4),
            Err(TeeSheetError::MissingName)
        ));
    }

    #[test]
    fn test_remove_promotes_reserve() {
        let mut roster = roster_of(&["A", "B", "C"], 2);
        let outcome = roster.remove("A", 2);
        assert!(outcome.removed);
        assert_eq!(outcome.was_status, Some(Status::Playing));
        assert_eq!(outcome.promoted, vec!["C"]);
        assert!(!roster.remove("Nobody", 2).removed);
    }

    #[test]
    fn test_guest_edits_recompute() {
        let mut roster = roster_of(&["A", "B", "C"], 3);
        let changes = roster.add_guest("A", Guest::named("Sam"), 3).unwrap();
        assert_eq!(changes.demoted, vec!["C"]);

        let changes = roster.remove_guest("Sam", None, 3).unwrap();
        assert_eq!(changes.promoted, vec!["C"]);

        assert!(matches!(
            roster.add_guest("Nobody", Guest::anonymous(), 3),
            Err(TeeSheetError::UnknownPlayer(_))
        ));
        assert!(matches!(
            roster.remove_guest("Sam", Some("A"), 3),
            Err(TeeSheetError::UnknownPlayer(_))
        ));
    }

    #[test]
    fn test_remove_anonymous_guest_by_label() {
        let mut roster = Roster::new();
        roster.add_manually("A", vec![Guest::anonymous()], None, 8).unwrap();
        roster.remove_guest("A guest 1", Some("A"), 8).unwrap();
        assert_eq!(roster.get("A").unwrap().guests.len(), 0);
    }

    #[test]
    fn test_extraction_preserves_order_and_appends_new() {
        let mut roster = Roster::new();
        roster
            .replace_from_extraction(
                vec![ExtractedPlayer::new("A"), ExtractedPlayer::new("B"), ExtractedPlayer::new("C")],
                8,
                0.7,
            )
            .unwrap();

        // The extractor now lists them in a different order plus a newcomer
        roster
            .replace_from_extraction(
                vec![
                    ExtractedPlayer::new("D"),
                    ExtractedPlayer::new("C"),
                    ExtractedPlayer::new("A"),
                    ExtractedPlayer::new("B"),
                ],
                8,
                0.7,
            )
            .unwrap();

        let order: Vec<&str> = roster.participants().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_extraction_keeps_manual_entries_and_preferences() {
        let mut roster = Roster::new();
        roster
            .replace_from_extraction(
                vec![ExtractedPlayer::new("A"), ExtractedPlayer::new("B"), ExtractedPlayer::new("C")],
                8,
                0.7,
            )
            .unwrap();
        roster.add_manually("M", vec![Guest::named("G")], None, 8).unwrap();
        roster.set_time_preference("A", Some(TimePreference::Late)).unwrap();

        roster
            .replace_from_extraction(
                vec![ExtractedPlayer::new("A"), ExtractedPlayer::new("B"), ExtractedPlayer::new("C")],
                8,
                0.7,
            )
            .unwrap();

        let m = roster.get("M").unwrap();
        assert!(m.manually_added);
        assert_eq!(m.guests, vec![Guest::named("G")]);
        assert_eq!(roster.get("A").unwrap().preference, Some(TimePreference::Late));
        assert!(roster.get("M").unwrap().signup_index > roster.get("C").unwrap().signup_index);
    }

    #[test]
    fn test_extraction_merges_manual_guests() {
        let mut roster = Roster::new();
        roster.add_manually("A", vec![Guest::named("Sam")], None, 8).unwrap();
        roster
            .replace_from_extraction(
                vec![ExtractedPlayer::new("A").with_guests(vec![Guest::named("Jo")])],
                8,
                0.7,
            )
            .unwrap();
        assert_eq!(
            roster.get("A").unwrap().guests,
            vec![Guest::named("Jo"), Guest::named("Sam")]
        );
    }

    #[test]
    fn test_truncated_extraction_is_rejected() {
        let mut roster = roster_of(&["A", "B", "C", "D", "E", "F", "G", "H", "I", "J"], 40);
        let before = roster.clone();

        let err = roster
            .replace_from_extraction(vec![ExtractedPlayer::new("A"), ExtractedPlayer::new("B")], 40, 0.7)
            .unwrap_err();
        assert!(matches!(err, TeeSheetError::SuspiciousShrink { incoming: 2, existing: 10 }));
        assert_eq!(roster, before);

        assert!(roster.replace_from_extraction(Vec::new(), 40, 0.7).is_err());
    }

    #[test]
    fn test_extraction_reports_promotions() {
        let mut roster = Roster::new();
        roster
            .replace_from_extraction(
                vec![ExtractedPlayer::new("A"), ExtractedPlayer::new("B"), ExtractedPlayer::new("C")],
                2,
                0.7,
            )
            .unwrap();
        assert_eq!(roster.get("C").unwrap().status, Status::Reserve);

        // A drops out of the chat; C moves up
        let changes = roster
            .replace_from_extraction(vec![ExtractedPlayer::new("B"), ExtractedPlayer::new("C")], 2, 0.5)
            .unwrap();
        assert_eq!(changes.promoted, vec!["C"]);
    }

    #[test]
    fn test_apply_delta() {
        let mut roster = roster_of(&["A", "B"], 3);
        let delta = ExtractionDelta {
            add: vec![ExtractedPlayer::new("C"), ExtractedPlayer::new("D")],
            remove: vec!["A".to_string()],
            guest_add: vec![GuestEdit {
                host: Some("B".to_string()),
                guest_name: "Pat".to_string(),
            }],
            guest_remove: Vec::new(),
        };
        let changes = roster.apply_delta(delta, 3);
        // Removing A lets D in, then B's guest pushes D back out
        assert_eq!(names(&roster.playing()), vec!["B", "C"]);
        assert_eq!(changes.promoted, vec!["D"]);
        assert_eq!(changes.demoted, vec!["D"]);
    }
}
