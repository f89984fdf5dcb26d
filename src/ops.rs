use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;

/// Writes a starter config for `--init`. Never overwrites an existing file;
/// editing stays the user's job.
pub fn init_global_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(anyhow!(
            "Config file already exists at {}. Refusing to overwrite.",
            path.display()
        ));
    }

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
    }

    let template = r#"# gcmd configuration. Every key is optional; without an ai block the tool
# still generates commands from the indexed gcloud tree, it just cannot
# refine them when --validate finds a problem.

ai:
  provider: openai
  openai_api_key: changeme
  openai_model: gpt-4.1-mini
  # openai_base_url: https://api.openai.com/v1
  # azure_api_key: changeme
  # azure_endpoint: https://your-azure-openai-resource.openai.azure.com
  # azure_deployment: changeme
  # azure_api_version: 2024-02-15-preview

# defaults:
#   top_k: 1
#   min_score: 0.2
#   max_attempts: 3
#   help_timeout_secs: 10
"#;

    fs::write(path, template)
        .with_context(|| format!("Failed to write default config file to {}", path.display()))?;

    println!("Default configuration written to {}", path.display());
    println!(
        "Update the placeholder API credentials, or remove the ai block to run without refinement."
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_a_parseable_starter_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        init_global_config(&path).unwrap();

        let cfg = crate::config::load_global_config(&path).unwrap();
        let ai = cfg.ai.expect("starter config should carry an ai block");
        assert_eq!(ai.provider.as_deref(), Some("openai"));
        assert!(cfg.defaults.is_none());
    }

    #[test]
    fn refuses_to_overwrite_an_existing_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "ai: {}\n").unwrap();

        let err = init_global_config(&path).unwrap_err();
        assert!(err.to_string().contains("Refusing to overwrite"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "ai: {}\n");
    }
}
