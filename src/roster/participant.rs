use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TeeSheetError};

/// Early/late tee time preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePreference {
    Early,
    Late,
}

impl TimePreference {
    /// Parses `early`/`late` (case insensitive); blank means no preference.
    pub fn parse(value: &str) -> Result<Option<Self>> {
        match value.trim().to_lowercase().as_str() {
            "" | "none" => Ok(None),
            "early" => Ok(Some(Self::Early)),
            "late" => Ok(Some(Self::Late)),
            other => Err(TeeSheetError::InvalidInput(format!(
                "unknown time preference '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for TimePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Early => write!(f, "early"),
            Self::Late => write!(f, "late"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Added but not yet placed by a recompute
    New,
    Playing,
    Reserve,
}

/// A guest brought by a participant. Anonymous guests get a label derived
/// from their host so every member of a group is uniquely named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    pub name: Option<String>,
}

impl Guest {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self { name: None }
    }

    /// Blank, `+1` and `guest` denote an anonymous guest.
    pub fn parse(token: &str) -> Self {
        let trimmed = token.trim();
        let lower = trimmed.to_lowercase();
        if trimmed.is_empty() || lower == "+1" || lower == "guest" {
            Self::anonymous()
        } else {
            Self::named(trimmed)
        }
    }
}

/// A signed-up player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    pub signup_index: u64,
    pub guests: Vec<Guest>,
    pub preference: Option<TimePreference>,
    pub status: Status,
    pub manually_added: bool,
}

impl Participant {
    pub fn new(name: impl Into<String>, signup_index: u64) -> Self {
        Self {
            name: name.into(),
            signup_index,
            guests: Vec::new(),
            preference: None,
            status: Status::New,
            manually_added: false,
        }
    }

    /// Spots this participant takes: themselves plus guests
    pub fn block_size(&self) -> usize {
        1 + self.guests.len()
    }

    /// Display labels for the guests, in the order they were added
    pub fn guest_labels(&self) -> Vec<String> {
        let mut anonymous = 0;
        self.guests
            .iter()
            .map(|guest| match &guest.name {
                Some(name) => name.clone(),
                None => {
                    anonymous += 1;
                    format!("{} guest {}", self.name, anonymous)
                }
            })
            .collect()
    }

    pub fn is_playing(&self) -> bool {
        self.status == Status::Playing
    }
}

/// One entry of the extraction service's ordered list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPlayer {
    pub name: String,
    #[serde(default)]
    pub guests: Vec<Guest>,
    #[serde(default)]
    pub preference: Option<TimePreference>,
}

impl ExtractedPlayer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            guests: Vec::new(),
            preference: None,
        }
    }

    pub fn with_guests(mut self, guests: Vec<Guest>) -> Self {
        self.guests = guests;
        self
    }

    pub fn with_preference(mut self, preference: TimePreference) -> Self {
        self.preference = Some(preference);
        self
    }
}

/// A guest edit from an incremental extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestEdit {
    pub host: Option<String>,
    pub guest_name: String,
}

/// Incremental extraction output, applied on top of the stored roster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionDelta {
    pub add: Vec<ExtractedPlayer>,
    pub remove: Vec<String>,
    pub guest_add: Vec<GuestEdit>,
    pub guest_remove: Vec<GuestEdit>,
}
