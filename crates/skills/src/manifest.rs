//! Skill manifest front-matter parsing.
//!
//! A skill manifest is a markdown file whose body opens with a YAML
//! front-matter block delimited by `---` lines (`spec.md` §4.7):
//!
//! ```text
//! ---
//! name: Web Search
//! description: Search the web and summarize results.
//! ---
//! # Web Search
//! Use the `web.search` tool to ...
//! ```
//!
//! Parsing splits on the `---` delimiter; absence of front-matter means the
//! skill is invalid and is skipped by the scanner.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SkillManifest {
    pub name: String,
    pub description: String,
}

/// Split `content` into `(manifest, body)`. Returns `(None, content)` when
/// there is no leading `---` front-matter block or it fails to parse as
/// YAML — callers treat that as an invalid skill.
pub fn parse_frontmatter(content: &str) -> (Option<SkillManifest>, String) {
    let trimmed = content.trim_start();
    let Some(rest) = trimmed.strip_prefix("---") else {
        return (None, content.to_string());
    };
    // Skip the newline right after the opening delimiter.
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    let Some(end) = rest.find("\n---") else {
        return (None, content.to_string());
    };
    let yaml = &rest[..end];
    let body_start = end + 4;
    let body = rest[body_start..].trim_start_matches('\n').to_string();

    match serde_yaml::from_str::<SkillManifest>(yaml) {
        Ok(manifest) => (Some(manifest), body),
        Err(e) => {
            tracing::warn!(error = %e, "skill manifest front-matter failed to parse");
            (None, content.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_frontmatter() {
        let content = "---\nname: Web Search\ndescription: search the web\n---\n# Body\ntext";
        let (manifest, body) = parse_frontmatter(content);
        let manifest = manifest.expect("manifest should parse");
        assert_eq!(manifest.name, "Web Search");
        assert_eq!(body, "# Body\ntext");
    }

    #[test]
    fn missing_frontmatter_is_invalid() {
        let content = "# Just a heading\nno frontmatter here";
        let (manifest, _) = parse_frontmatter(content);
        assert!(manifest.is_none());
    }

    #[test]
    fn malformed_yaml_is_invalid() {
        let content = "---\nname: [unterminated\n---\nbody";
        let (manifest, _) = parse_frontmatter(content);
        assert!(manifest.is_none());
    }
}
