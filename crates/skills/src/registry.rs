use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use swarm_domain::error::{Error, Result};

use crate::manifest::parse_frontmatter;
use crate::types::SkillEntry;

/// The canonical id of the compactor skill: activating it invokes the
/// compaction engine directly instead of appending tools (`spec.md` §4.7).
pub const COMPACTOR_SKILL_ID: &str = "compactor";

const MANIFEST_FILE_NAME: &str = "SKILL.md";

/// Discovers skill packages on disk (`spec.md` §4.7). Each skill is one
/// subdirectory of `skills_root` containing a `SKILL.md` manifest.
pub struct SkillsRegistry {
    skills_root: PathBuf,
    entries: RwLock<Vec<SkillEntry>>,
}

impl SkillsRegistry {
    /// Phase 1 discovery: scan `skills_root`, parse only front-matter for
    /// every skill directory found.
    pub fn load(skills_root: impl Into<PathBuf>) -> Result<Self> {
        let skills_root = skills_root.into();
        let entries = scan_skills(&skills_root)?;
        Ok(SkillsRegistry {
            skills_root,
            entries: RwLock::new(entries),
        })
    }

    pub fn empty(skills_root: impl Into<PathBuf>) -> Self {
        SkillsRegistry {
            skills_root: skills_root.into(),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn reload(&self) -> Result<()> {
        let entries = scan_skills(&self.skills_root)?;
        *self.entries.write() = entries;
        Ok(())
    }

    pub fn list(&self) -> Vec<SkillEntry> {
        self.entries.read().clone()
    }

    pub fn get(&self, id: &str) -> Option<SkillEntry> {
        self.entries.read().iter().find(|e| e.id == id).cloned()
    }

    /// The `[{id, name, description}]` list used in the system prompt
    /// (`spec.md` §4.7 phase 1), rendered as YAML.
    pub fn render_index(&self) -> String {
        let entries = self.entries.read();
        serde_yaml::to_string(&*entries).unwrap_or_default()
    }

    /// Phase 2 activation: read and return the full markdown body for
    /// `id`. Returns `SkillNotFound` if `id` isn't a discovered skill.
    pub fn read_doc(&self, id: &str) -> Result<String> {
        let entry = self.get(id).ok_or_else(|| Error::SkillNotFound(id.to_string()))?;
        let content = fs::read_to_string(&entry.location)?;
        let (_, body) = parse_frontmatter(&content);
        Ok(body)
    }
}

fn scan_skills(root: &Path) -> Result<Vec<SkillEntry>> {
    let mut entries = Vec::new();
    if !root.exists() {
        tracing::warn!(path = %root.display(), "skills directory does not exist; no skills loaded");
        return Ok(entries);
    }
    let mut dirs: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    for dir in dirs {
        let manifest_path = dir.join(MANIFEST_FILE_NAME);
        if !manifest_path.exists() {
            continue;
        }
        let content = match fs::read_to_string(&manifest_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %manifest_path.display(), error = %e, "failed to read skill manifest, skipping");
                continue;
            }
        };
        let (manifest, _) = parse_frontmatter(&content);
        let Some(manifest) = manifest else {
            tracing::warn!(path = %manifest_path.display(), "skill manifest missing valid front-matter, skipping");
            continue;
        };
        let id = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let entry = SkillEntry {
            id,
            name: manifest.name,
            description: manifest.description,
            location: manifest_path,
        };
        swarm_domain::trace::TraceEvent::SkillDiscovered { skill_id: entry.id.clone() }.emit();
        entries.push(entry);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_skill(root: &Path, id: &str, name: &str, description: &str, body: &str) {
        let dir = root.join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(MANIFEST_FILE_NAME),
            format!("---\nname: {name}\ndescription: {description}\n---\n{body}"),
        )
        .unwrap();
    }

    #[test]
    fn discovers_valid_skills_sorted_by_directory_name() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "web_search", "Web Search", "search the web", "# SOP");
        write_skill(tmp.path(), "compactor", "Compactor", "force compaction", "# SOP");
        let registry = SkillsRegistry::load(tmp.path()).unwrap();
        let ids: Vec<String> = registry.list().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["compactor".to_string(), "web_search".to_string()]);
    }

    #[test]
    fn skill_missing_frontmatter_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("broken");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MANIFEST_FILE_NAME), "no frontmatter here").unwrap();
        let registry = SkillsRegistry::load(tmp.path()).unwrap();
        assert!(registry.list().is_empty());
    }

    #[test]
    fn read_doc_returns_body_without_frontmatter() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "web_search", "Web Search", "search", "# Instructions\ndo the thing");
        let registry = SkillsRegistry::load(tmp.path()).unwrap();
        let body = registry.read_doc("web_search").unwrap();
        assert!(body.contains("do the thing"));
        assert!(!body.contains("description:"));
    }

    #[test]
    fn read_doc_for_unknown_id_is_skill_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = SkillsRegistry::load(tmp.path()).unwrap();
        let err = registry.read_doc("nope").unwrap_err();
        assert!(matches!(err, Error::SkillNotFound(_)));
    }
}
