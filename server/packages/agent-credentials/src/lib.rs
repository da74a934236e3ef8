use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use pi_agent_universal_schema::{ModelConfig, ModelProvider};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Contents of `~/.ai-agent/config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<ModelConfig>,
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,
}

impl AgentConfigFile {
    fn provider_key(&self, provider: &ModelProvider) -> Option<String> {
        self.providers
            .get(provider.as_str())
            .and_then(|settings| settings.api_key.clone())
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct CredentialResolver {
    config_path: PathBuf,
    read_env: bool,
}

impl CredentialResolver {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            read_env: true,
        }
    }

    /// Resolver for `~/.ai-agent/config.json`.
    pub fn default_location() -> Self {
        Self::new(default_config_path())
    }

    pub fn without_env(mut self) -> Self {
        self.read_env = false;
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Reads the config file. Missing or unreadable files count as empty.
    pub fn load_config(&self) -> AgentConfigFile {
        let contents = match fs::read_to_string(&self.config_path) {
            Ok(contents) => contents,
            Err(_) => return AgentConfigFile::default(),
        };
        match serde_json::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(
                    path = %self.config_path.display(),
                    error = %err,
                    "ignoring unreadable agent config"
                );
                AgentConfigFile::default()
            }
        }
    }

    /// Resolve the model for one request, filling in the credential.
    pub fn resolve(&self, model_override: Option<&ModelConfig>) -> ModelConfig {
        let read_env = self.read_env;
        self.resolve_with(model_override, |name| {
            if read_env {
                std::env::var(name).ok()
            } else {
                None
            }
        })
    }

    fn resolve_with<F>(&self, model_override: Option<&ModelConfig>, env: F) -> ModelConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = self.load_config();
        let mut model = model_override
            .cloned()
            .or_else(|| config.default_model.clone())
            .unwrap_or_else(ModelConfig::mock);

        if model.api_key().is_none() {
            model.api_key = config
                .provider_key(&model.provider)
                .or_else(|| env_key(&model.provider, &env));
        }
        model
    }
}

fn env_key<F>(provider: &ModelProvider, env: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    env_var_names(provider)
        .iter()
        .filter_map(|name| env(name))
        .find(|value| !value.is_empty())
}

pub fn env_var_names(provider: &ModelProvider) -> &'static [&'static str] {
    match provider {
        ModelProvider::OpenAi => &["OPENAI_API_KEY"],
        ModelProvider::Anthropic => &["ANTHROPIC_API_KEY"],
        ModelProvider::Google => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        ModelProvider::Mock | ModelProvider::Other(_) => &[],
    }
}

pub fn default_config_path() -> PathBuf {
    default_home_dir().join(".ai-agent").join("config.json")
}

fn default_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}
