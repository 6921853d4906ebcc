use crate::error::{PrototypeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

pub const CONFIG_FILE: &str = "config.json";
pub const MODELS_FILE: &str = "models.json";
pub const PLACEHOLDER_API_KEY: &str = "YOUR_API_KEY_HERE";

/// Workspace `config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ai_options: AiOptions,
}

/// Request settings for the generation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiOptions {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_max_tokens() -> u32 { 100_000 }
fn default_temperature() -> f32 { 0.7 }
fn default_timeout() -> u64 { 300 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_backoff_ms() -> u64 { 1000 }
fn default_system_prompt() -> String {
    "You are a professional UI/UX Developer. Generate complete, standalone HTML prototypes with realistic data."
        .to_string()
}

impl Default for AiOptions {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout: default_timeout(),
            system_prompt: default_system_prompt(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl AppConfig {
    /// Reads `config.json` from the workspace, falling back to defaults.
    pub async fn load(workspace: &Path) -> Result<Self> {
        let path = workspace.join(CONFIG_FILE);
        if !path.exists() {
            info!("No {} in {}, using defaults", CONFIG_FILE, workspace.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(&path).await?;
        serde_json::from_str(&raw).map_err(|e| PrototypeError::Config {
            reason: format!("{}: {}", path.display(), e),
        })
    }
}

/// One OpenAI-compatible endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_model() -> String { "gpt-4".to_string() }

impl ModelProfile {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty() && self.api_key != PLACEHOLDER_API_KEY
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.model
        } else {
            &self.name
        }
    }
}

/// Workspace `models.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRegistry {
    #[serde(default)]
    pub models: Vec<ModelProfile>,
    #[serde(default)]
    pub selected_model_id: String,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self {
            models: vec![ModelProfile {
                id: "default".to_string(),
                name: "Default Model".to_string(),
                provider: String::new(),
                base_url: String::new(),
                api_key: PLACEHOLDER_API_KEY.to_string(),
                model: default_model(),
            }],
            selected_model_id: "default".to_string(),
        }
    }
}

impl ModelRegistry {
    pub fn path(workspace: &Path) -> PathBuf {
        workspace.join(MODELS_FILE)
    }

    /// Reads `models.json`, writing the placeholder registry when absent.
    pub async fn load_or_init(workspace: &Path) -> Result<Self> {
        let path = Self::path(workspace);
        if !path.exists() {
            let registry = Self::default();
            registry.save(workspace).await?;
            warn!(
                "Created {} with a placeholder entry; add an API key before generating",
                path.display()
            );
            return Ok(registry);
        }

        let raw = fs::read_to_string(&path).await?;
        let registry: Self = serde_json::from_str(&raw).map_err(|e| PrototypeError::Config {
            reason: format!("{}: {}", path.display(), e),
        })?;

        match registry.selected() {
            Some(model) if model.has_api_key() => {
                info!("Current model: {}", model.display_name())
            }
            Some(model) => warn!(
                "Model '{}' has no API key configured in {}",
                model.display_name(),
                path.display()
            ),
            None => warn!("No models configured in {}", path.display()),
        }

        Ok(registry)
    }

    pub async fn save(&self, workspace: &Path) -> Result<()> {
        fs::create_dir_all(workspace).await?;
        fs::write(Self::path(workspace), serde_json::to_string_pretty(self)?).await?;
        Ok(())
    }

    /// The selected profile, or the first one when the id is stale.
    pub fn selected(&self) -> Option<&ModelProfile> {
        self.models
            .iter()
            .find(|m| m.id == self.selected_model_id)
            .or_else(|| self.models.first())
    }

    pub fn select(&mut self, id: &str) -> Result<&ModelProfile> {
        let index = self
            .models
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| PrototypeError::Config {
                reason: format!("unknown model id '{}'", id),
            })?;
        self.selected_model_id = id.to_string();
        Ok(&self.models[index])
    }

    /// Adds a profile or replaces the one with the same id. Returns `true`
    /// when an existing profile was replaced.
    pub fn upsert(&mut self, profile: ModelProfile) -> Result<bool> {
        if profile.id.trim().is_empty() {
            return Err(PrototypeError::Config {
                reason: "model id must not be empty".to_string(),
            });
        }
        match self.models.iter_mut().find(|m| m.id == profile.id) {
            Some(existing) => {
                *existing = profile;
                Ok(true)
            }
            None => {
                self.models.push(profile);
                Ok(false)
            }
        }
    }

    /// Removes a profile. The last remaining profile cannot be removed;
    /// removing the selected one selects the first that is left.
    pub fn remove(&mut self, id: &str) -> Result<ModelProfile> {
        if self.models.len() <= 1 {
            return Err(PrototypeError::Config {
                reason: "at least one model must remain".to_string(),
            });
        }
        let index = self
            .models
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| PrototypeError::Config {
                reason: format!("unknown model id '{}'", id),
            })?;
        let removed = self.models.remove(index);
        if self.selected_model_id == id {
            self.selected_model_id = self.models[0].id.clone();
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig::load(temp.path()).await.unwrap();
        assert_eq!(config.ai_options, AiOptions::default());
        assert_eq!(config.ai_options.max_tokens, 100_000);
        assert_eq!(config.ai_options.timeout, 300);
    }

    #[tokio::test]
    async fn test_partial_config_fills_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILE),
            r#"{"server": {"port": 8080}, "ai_options": {"temperature": 0.2, "timeout": 60}}"#,
        )
        .unwrap();
        let config = AppConfig::load(temp.path()).await.unwrap();
        assert_eq!(config.ai_options.timeout, 60);
        assert!((config.ai_options.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.ai_options.max_retries, 3);
    }

    #[tokio::test]
    async fn test_invalid_config_is_reported() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE), "{ not json").unwrap();
        assert!(matches!(
            AppConfig::load(temp.path()).await,
            Err(PrototypeError::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_models_are_initialized_and_selected() {
        let temp = TempDir::new().unwrap();
        let mut registry = ModelRegistry::load_or_init(temp.path()).await.unwrap();
        assert!(ModelRegistry::path(temp.path()).exists());
        assert!(!registry.selected().unwrap().has_api_key());

        registry.models.push(ModelProfile {
            id: "fast".to_string(),
            name: String::new(),
            provider: "openai".to_string(),
            base_url: "https://api.example.com/v1".to_string(),
            api_key: "sk-test".to_string(),
            model: "gpt-4o-mini".to_string(),
        });
        assert_eq!(registry.select("fast").unwrap().display_name(), "gpt-4o-mini");
        assert!(registry.select("missing").is_err());
        registry.save(temp.path()).await.unwrap();

        let reloaded = ModelRegistry::load_or_init(temp.path()).await.unwrap();
        assert_eq!(reloaded.selected().unwrap().id, "fast");

        let stale = ModelRegistry {
            selected_model_id: "gone".to_string(),
            ..reloaded
        };
        assert_eq!(stale.selected().unwrap().id, "default");
    }

    fn profile(id: &str) -> ModelProfile {
        ModelProfile {
            id: id.to_string(),
            name: format!("{} model", id),
            provider: "openai".to_string(),
            base_url: "https://api.example.com/v1".to_string(),
            api_key: "sk-test".to_string(),
            model: "gpt-4o".to_string(),
        }
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let mut registry = ModelRegistry::default();
        assert!(!registry.upsert(profile("fast")).unwrap());
        assert_eq!(registry.models.len(), 2);

        let mut edited = profile("fast");
        edited.model = "gpt-4o-mini".to_string();
        assert!(registry.upsert(edited).unwrap());
        assert_eq!(registry.models.len(), 2);
        assert_eq!(registry.models[1].model, "gpt-4o-mini");

        assert!(registry.upsert(profile("  ")).is_err());
    }

    #[test]
    fn test_remove_keeps_one_and_reselects() {
        let mut registry = ModelRegistry::default();
        registry.upsert(profile("fast")).unwrap();
        registry.select("fast").unwrap();

        let removed = registry.remove("fast").unwrap();
        assert_eq!(removed.id, "fast");
        assert_eq!(registry.selected_model_id, "default");

        assert!(matches!(
            registry.remove("default"),
            Err(PrototypeError::Config { .. })
        ));
        registry.upsert(profile("other")).unwrap();
        assert!(registry.remove("missing").is_err());
        assert_eq!(registry.models.len(), 2);
    }
}
