//! Weekly tee sheet allocation: who plays, who waits, who plays with whom
//! and at what time, and how a published sheet changes when the roster does.

pub mod config;
pub mod constraints;
pub mod display;
pub mod engine;
pub mod error;
pub mod parser;
pub mod roster;
pub mod schedule;
pub mod store;

pub use config::EngineConfig;
pub use engine::{Engine, EngineState, SharedEngine};
pub use error::{Result, TeeSheetError};
