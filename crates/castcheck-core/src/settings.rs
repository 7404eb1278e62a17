use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Providers the review engine knows how to reach.
pub const KNOWN_PROVIDERS: &[&str] = &[
    "openai",
    "anthropic",
    "google",
    "ollama",
    "groq",
    "mistral",
    "deepseek",
];

pub const DEFAULT_PROVIDER: &str = "google";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_RENDER_DPI: u32 = 300;
pub const MIN_RENDER_DPI: u32 = 150;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSettings {
    pub provider: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_MODEL_TIMEOUT_SECS,
        }
    }
}

impl AiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Ollama runs locally without a key; every hosted provider needs one.
pub fn ai_configured(settings: &AiSettings) -> Result<(), ConfigError> {
    if !KNOWN_PROVIDERS.contains(&settings.provider.as_str()) {
        return Err(ConfigError::UnknownProvider(settings.provider.clone()));
    }
    if settings.model.trim().is_empty() {
        return Err(ConfigError::MissingModel);
    }
    if settings.provider != "ollama" && settings.api_key.trim().is_empty() {
        return Err(ConfigError::MissingApiKey {
            provider: settings.provider.clone(),
        });
    }
    Ok(())
}

/// Pick the API key from, in order: an explicit value, a secret file.
/// Returns an empty string when neither is present; `ai_configured`
/// decides whether that is acceptable.
pub fn resolve_api_key(
    explicit: Option<&str>,
    key_file: Option<&Path>,
) -> Result<String, ConfigError> {
    if let Some(key) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    match key_file {
        Some(path) => fs::read_to_string(path)
            .map(|s| s.trim().to_string())
            .map_err(|source| ConfigError::ApiKeyFile {
                path: path.to_path_buf(),
                source,
            }),
        None => Ok(String::new()),
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub ai: AiSettings,
    pub rules_path: PathBuf,
    pub output_dir: PathBuf,
    pub render_dpi: u32,
    /// Directory holding the pdfium shared library. None binds the system copy.
    pub pdfium_dir: Option<PathBuf>,
}

impl Settings {
    pub fn new(ai: AiSettings, rules_path: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            ai,
            rules_path,
            output_dir,
            render_dpi: DEFAULT_RENDER_DPI,
            pdfium_dir: None,
        }
    }

    /// Fail fast on anything that would otherwise only surface at first use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ai_configured(&self.ai)?;
        if self.render_dpi < MIN_RENDER_DPI {
            return Err(ConfigError::RenderDpiTooLow(self.render_dpi));
        }
        self.prepare_output_dir()
    }

    pub fn prepare_output_dir(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| ConfigError::OutputDir {
            path: self.output_dir.clone(),
            source,
        })
    }
}
