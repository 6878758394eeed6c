pub mod manifest;
pub mod registry;
pub mod types;

pub use registry::{SkillsRegistry, COMPACTOR_SKILL_ID};
pub use types::SkillEntry;
