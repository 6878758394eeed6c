use std::sync::Arc;

use swarm_domain::config::LlmConfig;
use swarm_domain::error::{Error, Result};

use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;

/// Mask long alphanumeric tokens (API keys) before they reach logs or error
/// messages. Grounded on the teacher's `providers::registry::mask_secrets`.
pub fn mask_secrets(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut current = String::new();
    let flush = |current: &mut String, out: &mut String| {
        if current.len() >= 20 && current.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            if current.len() > 8 {
                out.push_str(&current[..4]);
                out.push_str("...");
                out.push_str(&current[current.len() - 4..]);
            } else {
                out.push_str("***masked***");
            }
        } else {
            out.push_str(current);
        }
        current.clear();
    };
    for ch in message.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            current.push(ch);
        } else {
            flush(&mut current, &mut out);
            out.push(ch);
        }
    }
    flush(&mut current, &mut out);
    out
}

/// Holds the single configured LLM provider plus an optional summarizer
/// override (used by the compaction engine). `spec.md` scopes vendor
/// adapters out; this registry exists to keep the "resolve a provider for a
/// role" seam the runtime and compactor both need, the way the teacher's
/// `ProviderRegistry` does for a much larger adapter set.
pub struct ProviderRegistry {
    executor: Arc<dyn LlmProvider>,
    summarizer: Arc<dyn LlmProvider>,
}

impl ProviderRegistry {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.auth_env).unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!(
                env_var = %config.auth_env,
                "LLM API key not set — provider will fail on first call"
            );
        }
        let executor: Arc<dyn LlmProvider> = Arc::new(OpenAiCompatProvider::new(
            "executor",
            &config.base_url,
            &api_key,
            &config.default_model,
        )?);

        let summarizer: Arc<dyn LlmProvider> = match &config.summarizer_model {
            Some(model) => Arc::new(OpenAiCompatProvider::new(
                "summarizer",
                &config.base_url,
                &api_key,
                model,
            )?),
            None => executor.clone(),
        };

        Ok(ProviderRegistry { executor, summarizer })
    }

    pub fn executor(&self) -> Arc<dyn LlmProvider> {
        self.executor.clone()
    }

    pub fn summarizer(&self) -> Arc<dyn LlmProvider> {
        self.summarizer.clone()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("executor", &self.executor.provider_id())
            .field("summarizer", &self.summarizer.provider_id())
            .finish()
    }
}

/// Wraps a fallible LLM operation so any error message is scrubbed of
/// secrets before propagating — an adapter may echo request headers back in
/// an error body.
pub fn scrub_error(err: Error) -> Error {
    match err {
        Error::Http(msg) => Error::Http(mask_secrets(&msg)),
        Error::Other(msg) => Error::Other(mask_secrets(&msg)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_secrets_redacts_long_tokens() {
        let msg = "auth failed for key sk-abcdefghijklmnopqrstuvwxyz1234567890";
        let masked = mask_secrets(msg);
        assert!(!masked.contains("abcdefghijklmnopqrstuvwxyz"));
        assert!(masked.starts_with("auth failed for key"));
    }

    #[test]
    fn mask_secrets_leaves_short_tokens_alone() {
        let msg = "status 503 busy";
        assert_eq!(mask_secrets(msg), msg);
    }
}
