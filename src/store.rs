//! State file I/O.
//!
//! The engine snapshot lives in one JSON file. Writes go to a sibling temp
//! file that is renamed over the target, so a crash mid-write leaves the
//! previous snapshot intact.

use std::path::Path;

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::engine::EngineState;
use crate::error::Result;

/// Loads the engine state. A missing file is a fresh week.
pub fn load_state(path: &Path, config: &EngineConfig) -> Result<EngineState> {
    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No state file; starting fresh");
            return Ok(EngineState::new(config));
        }
        Err(e) => return Err(e.into()),
    };
    let state = serde_json::from_str(&data)?;
    debug!(path = %path.display(), "Loaded state");
    Ok(state)
}

/// Saves the engine state, creating parent directories if needed.
pub fn save_state(path: &Path, state: &EngineState) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json)?;
    std::fs::rename(&tmp, path)?;
    debug!(path = %path.display(), bytes = json.len(), "Saved state");
    Ok(())
}
