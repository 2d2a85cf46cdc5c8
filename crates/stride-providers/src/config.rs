//! Provider configuration and factory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use stride_core::engine::EngineConfig;
use stride_core::traits::{FeedbackGenerator, Translator};

use crate::anthropic::AnthropicGenerator;
use crate::offline::{OfflineGenerator, OfflineTranslator};
use crate::openai::OpenAiGenerator;
use crate::translator::PromptTranslator;

/// Configuration for a single generation backend.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        base_url: Option<String>,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key: _,
                model,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("model", model)
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Anthropic {
                api_key: _,
                model,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("model", model)
                .field("base_url", base_url)
                .finish(),
        }
    }
}

impl ProviderConfig {
    fn api_key(&self) -> &str {
        match self {
            ProviderConfig::OpenAI { api_key, .. } | ProviderConfig::Anthropic { api_key, .. } => {
                api_key
            }
        }
    }
}

/// Top-level stride configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrideConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    /// Provider that writes feedback. Defaults to the first usable provider.
    #[serde(default)]
    pub feedback_provider: Option<String>,
    /// Provider that translates feedback. Defaults to the feedback provider.
    #[serde(default)]
    pub translator_provider: Option<String>,
    /// Snapshot file the CLI reads and writes.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./stride-data/store.json")
}

impl Default for StrideConfig {
    fn default() -> Self {
        Self {
            providers: BTreeMap::new(),
            feedback_provider: None,
            translator_provider: None,
            store_path: default_store_path(),
            engine: EngineConfig::default(),
        }
    }
}

impl StrideConfig {
    /// Provider `name`, if it has a non-empty API key.
    fn usable_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers
            .get(name)
            .filter(|p| !p.api_key().trim().is_empty())
    }

    fn first_usable_provider(&self) -> Option<(&str, &ProviderConfig)> {
        self.providers
            .iter()
            .find(|(_, p)| !p.api_key().trim().is_empty())
            .map(|(name, p)| (name.as_str(), p))
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Resolve env vars in a provider config.
fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    let resolve = |v: &Option<String>| v.as_deref().map(resolve_env_vars);
    match config {
        ProviderConfig::OpenAI {
            api_key,
            model,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            model: resolve(model),
            base_url: resolve(base_url),
            org_id: resolve(org_id),
        },
        ProviderConfig::Anthropic {
            api_key,
            model,
            base_url,
        } => ProviderConfig::Anthropic {
            api_key: resolve_env_vars(api_key),
            model: resolve(model),
            base_url: resolve(base_url),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `stride.toml` in the current directory
/// 2. `~/.config/stride/config.toml`
///
/// Environment variable overrides: `STRIDE_OPENAI_KEY`, `STRIDE_ANTHROPIC_KEY`.
pub fn load_config() -> Result<StrideConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<StrideConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("stride.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<StrideConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => StrideConfig::default(),
    };

    // Apply env var overrides
    if let Ok(key) = std::env::var("STRIDE_ANTHROPIC_KEY") {
        let entry = config
            .providers
            .entry("anthropic".into())
            .or_insert(ProviderConfig::Anthropic {
                api_key: String::new(),
                model: None,
                base_url: None,
            });
        if let ProviderConfig::Anthropic { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Ok(key) = std::env::var("STRIDE_OPENAI_KEY") {
        let entry = config
            .providers
            .entry("openai".into())
            .or_insert(ProviderConfig::OpenAI {
                api_key: String::new(),
                model: None,
                base_url: None,
                org_id: None,
            });
        if let ProviderConfig::OpenAI { api_key, .. } = entry {
            *api_key = key;
        }
    }

    // Resolve env vars in all provider configs
    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("stride"))
}

/// Create a generator instance from its configuration.
pub fn build_generator(config: &ProviderConfig) -> Result<Arc<dyn FeedbackGenerator>> {
    let generator: Arc<dyn FeedbackGenerator> = match config {
        ProviderConfig::Anthropic {
            api_key,
            model,
            base_url,
        } => Arc::new(AnthropicGenerator::new(
            api_key,
            model.clone(),
            base_url.clone(),
        )?),
        ProviderConfig::OpenAI {
            api_key,
            model,
            base_url,
            org_id,
        } => Arc::new(OpenAiGenerator::new(
            api_key,
            model.clone(),
            base_url.clone(),
            org_id.clone(),
        )?),
    };
    Ok(generator)
}

/// Create the feedback generator named by the config.
///
/// With nothing configured this is an [`OfflineGenerator`], so the engine
/// runs on its fallback content.
pub fn create_generator(config: &StrideConfig) -> Result<Arc<dyn FeedbackGenerator>> {
    match &config.feedback_provider {
        Some(name) => {
            let provider = config
                .usable_provider(name)
                .with_context(|| format!("feedback provider '{name}' is not configured"))?;
            build_generator(provider)
        }
        None => match config.first_usable_provider() {
            Some((name, provider)) => {
                tracing::debug!("using '{name}' for feedback");
                build_generator(provider)
            }
            None => {
                tracing::info!("no provider configured, feedback runs offline");
                Ok(Arc::new(OfflineGenerator))
            }
        },
    }
}

/// Create the translator named by the config, reusing `generator` when no
/// dedicated translation provider is set.
pub fn create_translator(
    config: &StrideConfig,
    generator: Arc<dyn FeedbackGenerator>,
) -> Result<Arc<dyn Translator>> {
    if !config.engine.translate_feedback {
        return Ok(Arc::new(OfflineTranslator));
    }
    match &config.translator_provider {
        Some(name) => {
            let provider = config
                .usable_provider(name)
                .with_context(|| format!("translator provider '{name}' is not configured"))?;
            Ok(Arc::new(PromptTranslator::new(build_generator(provider)?)))
        }
        None if generator.name() == "offline" => Ok(Arc::new(OfflineTranslator)),
        None => Ok(Arc::new(PromptTranslator::new(generator))),
    }
}
