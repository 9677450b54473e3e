//! Error types for tee sheet operations

use thiserror::Error;

use crate::config::ConfigError;

/// Main error type for roster, constraint and allocation operations.
///
/// Every variant is recoverable: the operation that returned it left the
/// stored state untouched.
#[derive(Debug, Error)]
pub enum TeeSheetError {
    /// A slot time that is not `HH:MM`
    #[error("Invalid tee time '{0}' (expected HH:MM)")]
    InvalidTime(String),

    /// A command arrived without the player name it needs
    #[error("Missing player name")]
    MissingName,

    /// A command referenced someone who is not on the roster or sheet
    #[error("{0} not found")]
    UnknownPlayer(String),

    /// A pairing or avoidance whose subject and target are the same player
    #[error("{0} cannot be paired with or kept away from themselves")]
    SelfReference(String),

    /// Malformed extraction input (bad preference, unreadable row)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A re-extraction returned far fewer players than are stored
    #[error("Extraction returned {incoming} players but the roster has {existing}; keeping existing roster")]
    SuspiciousShrink { incoming: usize, existing: usize },

    /// More players than `slots × max group size`
    #[error("{players} players cannot fit into {capacity} spots")]
    CapacityExceeded { players: usize, capacity: usize },

    #[error("No published tee sheet")]
    NoPublishedAllocation,

    #[error("Group {group} doesn't exist; there are {groups} groups")]
    NoSuchGroup { group: usize, groups: usize },

    #[error("{0} and {1} are already in the same group")]
    SameGroup(String, String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type alias for tee sheet operations
pub type Result<T> = std::result::Result<T, TeeSheetError>;
