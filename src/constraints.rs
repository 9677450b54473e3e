//! Pairing and avoidance preferences.
//!
//! Facts are stored the way they were entered (subject → target) and
//! resolved into symmetric relations when read.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Name → related names, symmetric
pub type PairMap = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Season-long wish to play together
    PartnerPreference,
    /// This week only; wiped on reset
    WeeklyPairing,
    /// Keep apart
    Avoid,
}

impl ConstraintKind {
    pub fn is_pairing(self) -> bool {
        match self {
            Self::PartnerPreference | Self::WeeklyPairing => true,
            Self::Avoid => false,
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PartnerPreference => write!(f, "partner preference"),
            Self::WeeklyPairing => write!(f, "weekly pairing"),
            Self::Avoid => write!(f, "avoid"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub subject: String,
    pub target: String,
    pub active: bool,
}

impl Constraint {
    fn matches(&self, kind: ConstraintKind, subject: &str, target: Option<&str>) -> bool {
        self.active
            && self.kind == kind
            && self.subject == subject
            && target.map_or(true, |t| self.target == t)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintStore {
    constraints: Vec<Constraint>,
}

impl ConstraintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an active constraint. Returns false if an identical one is
    /// already active.
    pub fn add(&mut self, kind: ConstraintKind, subject: &str, target: &str) -> bool {
        if self.constraints.iter().any(|c| c.matches(kind, subject, Some(target))) {
            return false;
        }
        self.constraints.push(Constraint {
            kind,
            subject: subject.to_string(),
            target: target.to_string(),
            active: true,
        });
        debug!(%kind, subject, target, "Constraint added");
        true
    }

    /// Deactivates matching constraints; with no target, every constraint
    /// of that kind for the subject. Returns whether anything changed.
    pub fn remove(&mut self, kind: ConstraintKind, subject: &str, target: Option<&str>) -> bool {
        let mut removed = false;
        for constraint in &mut self.constraints {
            if constraint.matches(kind, subject, target) {
                constraint.active = false;
                removed = true;
            }
        }
        if removed {
            debug!(%kind, subject, ?target, "Constraint removed");
        }
        removed
    }

    /// Active constraints, optionally only those whose subject is `name`
    pub fn active(&self, name: Option<&str>) -> Vec<&Constraint> {
        self.constraints
            .iter()
            .filter(|c| c.active && name.map_or(true, |n| c.subject == n))
            .collect()
    }

    /// Partner preferences and weekly pairings, both directions
    pub fn resolve_pairings(&self) -> PairMap {
        self.symmetric_closure(|kind| kind.is_pairing())
    }

    /// Avoidances, both directions
    pub fn resolve_avoidances(&self) -> PairMap {
        self.symmetric_closure(|kind| kind == ConstraintKind::Avoid)
    }

    fn symmetric_closure(&self, wanted: impl Fn(ConstraintKind) -> bool) -> PairMap {
        let mut map = PairMap::new();
        for c in self.constraints.iter().filter(|c| c.active && wanted(c.kind)) {
            link(&mut map, &c.subject, &c.target);
            link(&mut map, &c.target, &c.subject);
        }
        map
    }

    /// Replaces this week's pairings with freshly detected ones. An empty
    /// scan keeps what is stored; only `clear_weekly_pairings` wipes them.
    pub fn replace_weekly_pairings(&mut self, pairs: &[(String, String)]) {
        if pairs.is_empty() {
            debug!("No pairings detected; keeping this week's");
            return;
        }
        self.clear_weekly_pairings();
        for (a, b) in pairs {
            if a != b {
                self.add(ConstraintKind::WeeklyPairing, a, b);
            }
        }
    }

    pub fn clear_weekly_pairings(&mut self) {
        self.constraints.retain(|c| c.kind != ConstraintKind::WeeklyPairing);
    }
}

fn link(map: &mut PairMap, from: &str, to: &str) {
    let entry = map.entry(from.to_string()).or_default();
    if !entry.iter().any(|n| n == to) {
        entry.push(to.to_string());
    }
}

/// True when `a` and `b` must be kept apart
pub fn avoids(avoidances: &PairMap, a: &str, b: &str) -> bool {
    avoidances.get(a).is_some_and(|names| names.iter().any(|n| n == b))
}
