use std::path::PathBuf;

use clap::Parser;
use swarm_domain::config::Config;

/// One node of the swarm (`spec.md` §6.3): launched with `--port <N>`,
/// which becomes its identity for self-exclusion and peer registration.
#[derive(Debug, Parser)]
#[command(name = "swarmnode", version, about = "Distributed agent swarm orchestrator node")]
pub struct Cli {
    #[arg(long)]
    pub port: u16,

    #[arg(long, default_value = "./swarmnode.toml")]
    pub config: PathBuf,
}

/// Load configuration from `path` if present, else fall back to defaults.
/// Missing config files are not an error — a node with no TOML on disk
/// runs with every default, matching the teacher's `load_config` idiom.
pub fn load_config(path: &PathBuf) -> anyhow::Result<Config> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no config file found, using defaults");
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}
