use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::roster::TimePreference;

/// One person on the sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    /// Set for guests: the participant who brought them
    pub host: Option<String>,
}

impl Member {
    pub fn player(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn guest(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: Some(host.into()),
        }
    }

    pub fn is_guest(&self) -> bool {
        self.host.is_some()
    }
}

/// A participant plus their guests, placed as one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub host: String,
    pub members: Vec<Member>,
    pub preference: Option<TimePreference>,
}

impl Block {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// No guests: can be moved on its own without splitting anyone up
    pub fn is_solo(&self) -> bool {
        self.members.len() == 1
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.name.as_str())
    }
}

/// Stable group index, assigned when the group is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub usize);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A finished group bound (or not yet bound) to a slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    /// `None` renders as TBC
    pub slot: Option<String>,
    pub members: Vec<Member>,
}

impl Group {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.iter().any(|m| m.name == name)
    }

    pub fn slot_label(&self) -> &str {
        self.slot.as_deref().unwrap_or("TBC")
    }
}

/// Soft constraints traded away to honor the slot ceiling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlacementWarning {
    /// No group without a conflict had room; placed anyway
    AvoidanceOverridden {
        player: String,
        conflicts_with: Vec<String>,
    },
    /// No group had room for the whole block; its members were spread out
    GuestsSplit { host: String },
}

impl fmt::Display for PlacementWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AvoidanceOverridden {
                player,
                conflicts_with,
            } => write!(
                f,
                "{} placed with {} despite avoidance (must fit within tee times)",
                player,
                conflicts_with.join(", ")
            ),
            Self::GuestsSplit { host } => {
                write!(f, "{} split from their guests (must fit within tee times)", host)
            }
        }
    }
}

/// Result of a fresh generation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// In slot order
    pub groups: Vec<Group>,
    /// Trailing slots no group needs
    pub returnable_slots: Vec<String>,
    pub warnings: Vec<PlacementWarning>,
}

impl Allocation {
    pub fn total_players(&self) -> usize {
        self.groups.iter().map(Group::len).sum()
    }

    pub fn group_of(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.contains(name))
    }
}

/// A locked allocation; only ever nudged by the republish engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedAllocation {
    pub groups: Vec<Group>,
    pub rendered: String,
    pub published_at: NaiveDateTime,
}

impl PublishedAllocation {
    pub fn total_players(&self) -> usize {
        self.groups.iter().map(Group::len).sum()
    }

    pub fn group_of(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.contains(name))
    }

    /// Next unused group index
    pub fn next_group_id(&self) -> GroupId {
        GroupId(self.groups.iter().map(|g| g.id.0 + 1).max().unwrap_or(0))
    }
}
