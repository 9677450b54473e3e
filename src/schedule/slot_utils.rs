use std::collections::BTreeSet;

use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TeeSheetError};

/// Auto-generated slot sequence: `num_slots` times, `interval_minutes` apart,
/// starting at `start_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotConfig {
    pub start_time: String,
    pub interval_minutes: u32,
    pub num_slots: usize,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            start_time: "08:00".to_string(),
            interval_minutes: 8,
            num_slots: 10,
        }
    }
}

impl SlotConfig {
    pub fn new(start_time: &str, interval_minutes: u32, num_slots: usize) -> Self {
        Self {
            start_time: start_time.to_string(),
            interval_minutes,
            num_slots,
        }
    }
}

/// Parses a time string (HH:MM), ignoring any trailing note in parentheses
pub fn parse_slot_time(time_str: &str) -> Result<NaiveTime> {
    let clean_time = time_str.split('(').next().unwrap_or(time_str).trim();
    NaiveTime::parse_from_str(clean_time, "%H:%M")
        .map_err(|_| TeeSheetError::InvalidTime(time_str.trim().to_string()))
}

/// Formats a slot time as HH:MM
pub fn format_slot_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Calculates the auto-generated slot times.
/// Times past midnight wrap around, matching the booking sheet.
pub fn calculate_time_slots(config: &SlotConfig) -> Result<Vec<NaiveTime>> {
    let start = parse_slot_time(&config.start_time)?;
    let step = Duration::minutes(i64::from(config.interval_minutes));

    let mut slots = Vec::with_capacity(config.num_slots);
    let mut current = start;
    for _ in 0..config.num_slots {
        slots.push(current);
        current = current.overflowing_add_signed(step).0;
    }
    Ok(slots)
}

/// The bookable slots: (auto-generated ∪ manually added) − manually removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSet {
    pub config: SlotConfig,
    added: BTreeSet<NaiveTime>,
    removed: BTreeSet<NaiveTime>,
}

impl SlotSet {
    pub fn new(config: SlotConfig) -> Self {
        Self {
            config,
            added: BTreeSet::new(),
            removed: BTreeSet::new(),
        }
    }

    /// Distinct available times in ascending order.
    pub fn times(&self) -> Vec<NaiveTime> {
        // A config that fails to parse was rejected at load time; treat it as
        // an empty auto sequence rather than poisoning every read.
        let mut times: BTreeSet<NaiveTime> = calculate_time_slots(&self.config)
            .unwrap_or_default()
            .into_iter()
            .collect();
        times.extend(self.added.iter().copied());
        for removed in &self.removed {
            times.remove(removed);
        }
        times.into_iter().collect()
    }

    /// Available slot labels (HH:MM) in ascending order.
    pub fn labels(&self) -> Vec<String> {
        self.times().into_iter().map(format_slot_time).collect()
    }

    pub fn len(&self) -> usize {
        self.times().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces the auto-generated sequence. Overrides are kept.
    pub fn configure(&mut self, config: SlotConfig) -> Result<()> {
        parse_slot_time(&config.start_time)?;
        self.config = config;
        Ok(())
    }

    /// Adds a slot, clearing any earlier removal of the same time.
    /// Returns whether the available list changed.
    pub fn add(&mut self, time_str: &str) -> Result<bool> {
        let time = parse_slot_time(time_str)?;
        let before = self.times().contains(&time);
        self.removed.remove(&time);
        self.added.insert(time);
        Ok(!before)
    }

    /// Removes a slot (auto-generated or manual).
    /// Returns false when the time was not available.
    pub fn remove(&mut self, time_str: &str) -> Result<bool> {
        let time = parse_slot_time(time_str)?;
        if !self.times().contains(&time) {
            return Ok(false);
        }
        self.added.remove(&time);
        self.removed.insert(time);
        Ok(true)
    }

    pub fn manual_additions(&self) -> Vec<String> {
        self.added.iter().copied().map(format_slot_time).collect()
    }

    pub fn manual_removals(&self) -> Vec<String> {
        self.removed.iter().copied().map(format_slot_time).collect()
    }

    /// Drops every manual add/remove, back to the pure auto sequence.
    pub fn clear_overrides(&mut self) {
        self.added.clear();
        self.removed.clear();
    }
}
