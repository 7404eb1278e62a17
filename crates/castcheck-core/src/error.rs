use std::path::PathBuf;

use thiserror::Error;

/// Startup-time configuration failures. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("rules source {path} could not be read: {source}")]
    RulesUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rules source {origin} is not valid JSON: {message}")]
    RulesMalformed { origin: String, message: String },

    #[error("rules source {origin} must be a JSON array")]
    RulesNotArray { origin: String },

    #[error("rule #{index} in {origin} is missing `{field}`")]
    RuleMissingField {
        origin: String,
        index: usize,
        field: &'static str,
    },

    #[error("rule id `{id}` appears more than once in {origin}")]
    DuplicateRuleId { origin: String, id: String },

    #[error("rules source {origin} contains no rules")]
    NoRules { origin: String },

    #[error("no API key configured for provider `{provider}`")]
    MissingApiKey { provider: String },

    #[error("API key file {path} could not be read: {source}")]
    ApiKeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown model provider `{0}`")]
    UnknownProvider(String),

    #[error("model name is empty")]
    MissingModel,

    #[error("output directory {path} is unusable: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("render DPI {0} is below the minimum of {min}", min = crate::settings::MIN_RENDER_DPI)]
    RenderDpiTooLow(u32),
}

/// Casting parameters that fail presence or shape checks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("missing required field `{0}`")]
    Missing(&'static str),

    #[error("volume must be a positive integer, got `{0}`")]
    InvalidVolume(String),
}
