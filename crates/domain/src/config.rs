use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn d_true() -> bool {
    true
}

// ── server ──────────────────────────────────────────────────────────────

fn d_host() -> String {
    "0.0.0.0".to_string()
}

fn d_port() -> u16 {
    8000
}

fn d_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        CorsConfig {
            allowed_origins: d_cors_origins(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default)]
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: d_host(),
            port: d_port(),
            cors: CorsConfig::default(),
        }
    }
}

// ── llm ─────────────────────────────────────────────────────────────────

fn d_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn d_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn d_llm_auth_env() -> String {
    "SWARM_LLM_API_KEY".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_llm_base_url")]
    pub base_url: String,
    #[serde(default = "d_llm_model")]
    pub default_model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "d_llm_auth_env")]
    pub auth_env: String,
    /// Name of the environment variable holding the summarizer model
    /// override used by the compaction engine; falls back to
    /// `default_model` when unset.
    pub summarizer_model: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            base_url: d_llm_base_url(),
            default_model: d_llm_model(),
            auth_env: d_llm_auth_env(),
            summarizer_model: None,
        }
    }
}

// ── skills ──────────────────────────────────────────────────────────────

fn d_skills_path() -> PathBuf {
    PathBuf::from("./skills")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsConfig {
    #[serde(default = "d_skills_path")]
    pub path: PathBuf,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        SkillsConfig {
            path: d_skills_path(),
        }
    }
}

// ── compaction ──────────────────────────────────────────────────────────

fn d_predictive_ratio() -> f64 {
    0.9
}
fn d_structural_threshold() -> usize {
    700
}
fn d_min_events() -> usize {
    10
}
fn d_safety_cap_chars() -> usize {
    200_000
}
fn d_head_keep_ratio() -> f64 {
    0.2
}
fn d_tail_keep_ratio() -> f64 {
    0.3
}
fn d_chars_per_token() -> f64 {
    3.0
}

/// Tuning knobs for the three-tier compaction trigger and the
/// head/tail safety-cap truncation (`spec.md` §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    #[serde(default = "d_true")]
    pub auto: bool,
    #[serde(default = "d_predictive_ratio")]
    pub predictive_ratio: f64,
    #[serde(default = "d_structural_threshold")]
    pub structural_event_threshold: usize,
    /// Minimum event count below which compaction never runs, even if a
    /// tier's threshold is nominally crossed (`spec.md` §9 Open Question,
    /// decided as configuration — see DESIGN.md).
    #[serde(default = "d_min_events")]
    pub min_events_to_compact: usize,
    #[serde(default = "d_safety_cap_chars")]
    pub safety_cap_chars: usize,
    #[serde(default = "d_head_keep_ratio")]
    pub head_keep_ratio: f64,
    #[serde(default = "d_tail_keep_ratio")]
    pub tail_keep_ratio: f64,
    #[serde(default = "d_chars_per_token")]
    pub chars_per_token_estimate: f64,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        CompactionConfig {
            auto: true,
            predictive_ratio: d_predictive_ratio(),
            structural_event_threshold: d_structural_threshold(),
            min_events_to_compact: d_min_events(),
            safety_cap_chars: d_safety_cap_chars(),
            head_keep_ratio: d_head_keep_ratio(),
            tail_keep_ratio: d_tail_keep_ratio(),
            chars_per_token_estimate: d_chars_per_token(),
        }
    }
}

// ── registry ────────────────────────────────────────────────────────────

fn d_registry_db_template() -> String {
    "./data/swarm_nodes.sqlite3".to_string()
}
fn d_peer_chat_timeout_secs() -> u64 {
    180
}
fn d_registry_op_timeout_secs() -> u64 {
    10
}
fn d_prune_interval_secs() -> u64 {
    30
}
fn d_stale_after_secs() -> i64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "d_registry_db_template")]
    pub db_path: String,
    #[serde(default = "d_peer_chat_timeout_secs")]
    pub peer_chat_timeout_secs: u64,
    #[serde(default = "d_registry_op_timeout_secs")]
    pub registry_op_timeout_secs: u64,
    #[serde(default = "d_prune_interval_secs")]
    pub prune_interval_secs: u64,
    #[serde(default = "d_stale_after_secs")]
    pub stale_after_secs: i64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            db_path: d_registry_db_template(),
            peer_chat_timeout_secs: d_peer_chat_timeout_secs(),
            registry_op_timeout_secs: d_registry_op_timeout_secs(),
            prune_interval_secs: d_prune_interval_secs(),
            stale_after_secs: d_stale_after_secs(),
        }
    }
}

// ── sessions ────────────────────────────────────────────────────────────

fn d_sessions_db_template() -> String {
    "./data/swarm_sessions.sqlite3".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "d_sessions_db_template")]
    pub db_path: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        SessionsConfig {
            db_path: d_sessions_db_template(),
        }
    }
}

// ── top-level config ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub skills: SkillsConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Config {
    /// Per-node database paths are named by port (`spec.md` §6.4): when the
    /// configured path doesn't already embed the port, append a
    /// `_port_<N>` suffix before the extension.
    pub fn sessions_db_path_for_port(&self, port: u16) -> PathBuf {
        suffix_with_port(&self.sessions.db_path, port)
    }

    pub fn registry_db_path_for_port(&self, port: u16) -> PathBuf {
        suffix_with_port(&self.registry.db_path, port)
    }

    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.compaction.predictive_ratio <= 0.0 || self.compaction.predictive_ratio > 1.0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "compaction.predictive_ratio must be in (0, 1]".to_string(),
            });
        }
        if self.compaction.head_keep_ratio + self.compaction.tail_keep_ratio >= 1.0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "compaction head_keep_ratio + tail_keep_ratio should leave room for a dropped middle".to_string(),
            });
        }
        if std::env::var(&self.llm.auth_env).is_err() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: format!(
                    "{} is not set — LLM calls will fail until it is",
                    self.llm.auth_env
                ),
            });
        }
        issues
    }
}

fn suffix_with_port(path: &str, port: u16) -> PathBuf {
    let p = PathBuf::from(path);
    let stem = p
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "db".to_string());
    let ext = p.extension().map(|e| e.to_string_lossy().to_string());
    let file_name = match ext {
        Some(ext) => format!("{stem}_port_{port}.{ext}"),
        None => format!("{stem}_port_{port}"),
    };
    match p.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(file_name),
        _ => PathBuf::from(file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_error_severity_issues_besides_auth() {
        let config = Config::default();
        let issues = config.validate();
        assert!(issues
            .iter()
            .all(|i| i.severity == ConfigSeverity::Warning));
    }

    #[test]
    fn db_path_is_suffixed_by_port() {
        let config = Config::default();
        let path = config.sessions_db_path_for_port(8001);
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "swarm_sessions_port_8001.sqlite3"
        );
    }

    #[test]
    fn toml_roundtrips_with_partial_sections() {
        let toml_str = r#"
            [server]
            port = 9000

            [compaction]
            structural_event_threshold = 500
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.compaction.structural_event_threshold, 500);
        assert_eq!(config.compaction.min_events_to_compact, 10);
    }
}
