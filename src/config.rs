use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Global config file structure: generator credentials + tunable defaults.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct GlobalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai: Option<AiConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,
}

/// AI configuration that may come from file and/or environment.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct AiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>, // "openai" or "azure"

    // OpenAI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_model: Option<String>,

    // Azure OpenAI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_deployment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_api_version: Option<String>,
}

/// File-level defaults for the knobs the command line can also set. Absent
/// values fall through to the built-in defaults.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct DefaultsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_timeout_secs: Option<u64>,
}

/// Provider resolved after merging env + file.
#[derive(Debug, Clone)]
pub enum EffectiveAiConfig {
    OpenAI {
        api_key: String,
        base_url: String,
        model: String,
    },
    Azure {
        api_key: String,
        endpoint: String,
        deployment: String,
        api_version: String,
    },
}

pub fn gcmd_config_dir() -> PathBuf {
    config_base().join("gcmd")
}

pub fn gcmd_cache_dir() -> PathBuf {
    cache_base().join("gcmd")
}

pub fn find_global_config_path() -> PathBuf {
    gcmd_config_dir().join("config.yaml")
}

fn config_base() -> PathBuf {
    #[cfg(test)]
    if let Some(base) = test_base_dir() {
        return base.join("config");
    }
    dirs::config_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn cache_base() -> PathBuf {
    #[cfg(test)]
    if let Some(base) = test_base_dir() {
        return base.join("cache");
    }
    dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn load_global_config(path: &Path) -> Result<GlobalConfig> {
    if !path.exists() {
        return Ok(GlobalConfig::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read global config file {}", path.display()))?;
    let cfg: GlobalConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse global config YAML {}", path.display()))?;
    Ok(cfg)
}

/// Merges file values with `GCMD_*` environment overrides. `Ok(None)` means
/// no generator was configured at all, which callers treat as running
/// without refinement; a half-configured provider is an error instead.
pub fn resolve_ai_config(global_ai: Option<AiConfig>) -> Result<Option<EffectiveAiConfig>> {
    resolve_from(global_ai.unwrap_or_default(), &env_lookup)
}

fn resolve_from(
    file_ai: AiConfig,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Option<EffectiveAiConfig>> {
    let provider = env("GCMD_PROVIDER").or(file_ai.provider);

    let openai_api_key = env("GCMD_OPENAI_API_KEY").or(file_ai.openai_api_key);
    let openai_base_url = env("GCMD_OPENAI_BASE_URL").or(file_ai.openai_base_url);
    let openai_model = env("GCMD_OPENAI_MODEL").or(file_ai.openai_model);

    let azure_api_key = env("GCMD_AZURE_API_KEY").or(file_ai.azure_api_key);
    let azure_endpoint = env("GCMD_AZURE_ENDPOINT").or(file_ai.azure_endpoint);
    let azure_deployment = env("GCMD_AZURE_DEPLOYMENT").or(file_ai.azure_deployment);
    let azure_api_version = env("GCMD_AZURE_API_VERSION").or(file_ai.azure_api_version);

    let provider = if let Some(p) = provider {
        p.to_lowercase()
    } else if openai_api_key.is_some() {
        "openai".to_string()
    } else if azure_api_key.is_some() {
        "azure".to_string()
    } else {
        return Ok(None);
    };

    match provider.as_str() {
        "openai" => {
            let api_key = openai_api_key.ok_or_else(|| {
                anyhow!("OpenAI selected but no OPENAI API key configured (GCMD_OPENAI_API_KEY)")
            })?;
            let base_url =
                openai_base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string());
            let model = openai_model.ok_or_else(|| {
                anyhow!("OpenAI selected but no model configured (GCMD_OPENAI_MODEL)")
            })?;
            Ok(Some(EffectiveAiConfig::OpenAI {
                api_key,
                base_url,
                model,
            }))
        }
        "azure" => {
            let api_key = azure_api_key.ok_or_else(|| {
                anyhow!("Azure selected but no AZURE API key configured (GCMD_AZURE_API_KEY)")
            })?;
            let endpoint = azure_endpoint.ok_or_else(|| {
                anyhow!("Azure selected but no endpoint configured (GCMD_AZURE_ENDPOINT)")
            })?;
            let deployment = azure_deployment.ok_or_else(|| {
                anyhow!("Azure selected but no deployment configured (GCMD_AZURE_DEPLOYMENT)")
            })?;
            let api_version = azure_api_version.ok_or_else(|| {
                anyhow!("Azure selected but no API version configured (GCMD_AZURE_API_VERSION)")
            })?;
            Ok(Some(EffectiveAiConfig::Azure {
                api_key,
                endpoint,
                deployment,
                api_version,
            }))
        }
        other => Err(anyhow!(
            "Unsupported provider '{}'. Use 'openai' or 'azure'.",
            other
        )),
    }
}

fn env_lookup(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(v) if !v.is_empty() => Some(v),
        _ => None,
    }
}

#[cfg(test)]
use std::sync::{Mutex, MutexGuard};

#[cfg(test)]
static TEST_BASE_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
#[cfg(test)]
static TEST_BASE_SERIAL: Mutex<()> = Mutex::new(());

#[cfg(test)]
fn test_base_dir() -> Option<PathBuf> {
    TEST_BASE_DIR
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

/// Routes the config and cache directories under `base` until the guard
/// drops. Holding the guard also serializes tests that touch these paths.
#[cfg(test)]
pub(crate) fn override_base_dirs_for_tests(base: &Path) -> DirOverrideGuard {
    let serial = TEST_BASE_SERIAL
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    let previous = TEST_BASE_DIR
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .replace(base.to_path_buf());
    DirOverrideGuard {
        _serial: serial,
        previous,
    }
}

#[cfg(test)]
pub(crate) struct DirOverrideGuard {
    _serial: MutexGuard<'static, ()>,
    previous: Option<PathBuf>,
}

#[cfg(test)]
impl Drop for DirOverrideGuard {
    fn drop(&mut self) {
        *TEST_BASE_DIR.lock().unwrap_or_else(|e| e.into_inner()) = self.previous.take();
    }
}
