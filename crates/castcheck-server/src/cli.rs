use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use castcheck_core::settings::{
    resolve_api_key, DEFAULT_MODEL, DEFAULT_MODEL_TIMEOUT_SECS, DEFAULT_PROVIDER,
    DEFAULT_RENDER_DPI,
};
use castcheck_core::{AiSettings, ConfigError, Settings};

use crate::{HttpOptions, DEFAULT_CORS_ORIGINS, DEFAULT_MAX_UPLOAD_BYTES};

/// Review casting drawings against design rules with a vision model.
#[derive(Parser, Debug, Clone)]
#[command(name = "castcheck", version, about, long_about = None)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "CASTCHECK_BIND", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// JSON array of design rules
    #[arg(long, env = "CASTCHECK_RULES", default_value = "rules/rules.json")]
    pub rules: PathBuf,

    /// Where reports and stored drawings are written
    #[arg(long, env = "CASTCHECK_OUTPUT_DIR", default_value = "output")]
    pub output_dir: PathBuf,

    #[arg(long, env = "CASTCHECK_PROVIDER", default_value = DEFAULT_PROVIDER)]
    pub provider: String,

    #[arg(long, env = "CASTCHECK_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Falls back to GEMINI_API_KEY
    #[arg(long, env = "CASTCHECK_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// File holding the API key, for secret mounts
    #[arg(long, env = "CASTCHECK_API_KEY_FILE")]
    pub api_key_file: Option<PathBuf>,

    #[arg(long, env = "CASTCHECK_MODEL_TIMEOUT_SECS", default_value_t = DEFAULT_MODEL_TIMEOUT_SECS)]
    pub model_timeout_secs: u64,

    #[arg(long, env = "CASTCHECK_RENDER_DPI", default_value_t = DEFAULT_RENDER_DPI)]
    pub render_dpi: u32,

    /// Directory containing the pdfium shared library
    #[arg(long, env = "CASTCHECK_PDFIUM_DIR")]
    pub pdfium_dir: Option<PathBuf>,

    #[arg(long, env = "CASTCHECK_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Comma-separated list of allowed browser origins
    #[arg(
        long,
        env = "CASTCHECK_CORS_ORIGINS",
        value_delimiter = ',',
        default_values = DEFAULT_CORS_ORIGINS
    )]
    pub cors_origins: Vec<String>,
}

impl Cli {
    /// Resolve and validate everything the service needs before binding.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        self.settings_with_fallback_key(std::env::var("GEMINI_API_KEY").ok())
    }

    fn settings_with_fallback_key(
        &self,
        fallback_key: Option<String>,
    ) -> Result<Settings, ConfigError> {
        let explicit = self.api_key.clone().or(fallback_key);
        let api_key = resolve_api_key(explicit.as_deref(), self.api_key_file.as_deref())?;

        let ai = AiSettings {
            provider: self.provider.trim().to_lowercase(),
            api_key,
            model: self.model.trim().to_string(),
            timeout_secs: self.model_timeout_secs,
        };
        let mut settings = Settings::new(ai, self.rules.clone(), self.output_dir.clone());
        settings.render_dpi = self.render_dpi;
        settings.pdfium_dir = self.pdfium_dir.clone();
        settings.validate()?;
        Ok(settings)
    }

    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            max_upload_bytes: self.max_upload_bytes,
            cors_origins: self.cors_origins.clone(),
        }
    }
}
