/// `load_config` module: loads the optional YAML defaults file and resolves the
/// template path from flags, config and environment.
///
/// # Responsibilities
/// - Parse the user-supplied YAML file into [`CliConfig`], rejecting unknown keys
/// - Inject `EINDBEOORDELING_TEMPLATE` from the environment when the file does not name a template
/// - Apply the precedence flag > config file > environment > built-in default
///
/// # Errors
/// All errors in this module use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::Result;
use eindbeoordeling_core::metadata::Attempt;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Environment variable naming the template file.
pub const TEMPLATE_ENV: &str = "EINDBEOORDELING_TEMPLATE";

/// Template looked up in the working directory when nothing else names one.
pub const DEFAULT_TEMPLATE: &str = "BF KH1 AGZ PvB Eindbeoordeling.docx";

/// Run defaults read from `--config`. Every key is optional; flags win.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    #[serde(default)]
    pub template: Option<PathBuf>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub examiner: Option<String>,
    #[serde(default)]
    pub attempt: Option<Attempt>,
    #[serde(default)]
    pub sheet: Option<String>,
}

/// Loads a YAML config file and fills in the template from the environment
/// when the file leaves it out.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty file is a valid config with no defaults.
    let mut config: CliConfig = if config_content.trim().is_empty() {
        CliConfig::default()
    } else {
        match serde_yaml::from_str(&config_content) {
            Ok(conf) => {
                info!(config_path = ?path_ref, "Parsed config YAML successfully");
                conf
            }
            Err(e) => {
                error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
                return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
            }
        }
    };

    if config.template.is_none() {
        config.template = template_from_env();
    }

    Ok(config)
}

/// Template path from `EINDBEOORDELING_TEMPLATE`, if set and non-empty.
pub fn template_from_env() -> Option<PathBuf> {
    match std::env::var(TEMPLATE_ENV) {
        Ok(value) if !value.trim().is_empty() => {
            debug!(env = TEMPLATE_ENV, template = %value, "Template taken from environment");
            Some(PathBuf::from(value))
        }
        _ => None,
    }
}

/// Pick the template: flag, then config (which already carries the
/// environment fallback), then environment, then the default file name.
pub fn resolve_template(flag: Option<PathBuf>, config: Option<&CliConfig>) -> PathBuf {
    flag.or_else(|| config.and_then(|c| c.template.clone()))
        .or_else(template_from_env)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATE))
}
