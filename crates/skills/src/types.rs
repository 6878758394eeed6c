use std::path::PathBuf;

use serde::Serialize;

/// What phase 1 discovery produces for one skill: just enough to route
/// (`spec.md` §4.7 phase 1). The full instruction body is loaded lazily in
/// phase 2 via `SkillsRegistry::read_doc`.
#[derive(Debug, Clone, Serialize)]
pub struct SkillEntry {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(skip)]
    pub location: PathBuf,
}
