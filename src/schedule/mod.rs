pub mod assign;
pub mod blocks;
pub mod force_fit;
pub mod generate;
pub mod grouping;
pub mod republish;
pub mod slot_utils;
pub mod types;

pub use generate::generate_allocation;
pub use republish::{adjust, Adjustment, ChangeReport};
pub use slot_utils::{SlotConfig, SlotSet};
pub use types::{Allocation, Block, Group, GroupId, Member, PlacementWarning, PublishedAllocation};
