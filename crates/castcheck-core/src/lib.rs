pub mod error;
pub mod guidance;
pub mod rules;
pub mod settings;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use error::{ConfigError, ContextError};
pub use rules::{Rule, RuleStore};
pub use settings::{AiSettings, Settings};

// --- Verdicts ---

/// Three-way outcome of evaluating one rule against a drawing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VerdictResult {
    Compliant,
    NonCompliant,
    NeedsReview,
}

impl VerdictResult {
    pub const ALL: [VerdictResult; 3] = [
        VerdictResult::Compliant,
        VerdictResult::NonCompliant,
        VerdictResult::NeedsReview,
    ];

    /// Name used in prompts and expected back from the model.
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictResult::Compliant => "Compliant",
            VerdictResult::NonCompliant => "NonCompliant",
            VerdictResult::NeedsReview => "NeedsReview",
        }
    }

    /// Label for the report's "Result (Yes/No)" column.
    pub fn report_label(&self) -> &'static str {
        match self {
            VerdictResult::Compliant => "Yes",
            VerdictResult::NonCompliant => "No",
            VerdictResult::NeedsReview => "Needs Review",
        }
    }

    /// Normalize a result string from model output. Returns None for values
    /// outside the known vocabulary so the caller can count the coercion.
    pub fn from_model(raw: &str) -> Option<Self> {
        let norm: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_lowercase();
        match norm.as_str() {
            "compliant" | "yes" | "pass" | "true" => Some(VerdictResult::Compliant),
            "noncompliant" | "no" | "fail" | "false" => Some(VerdictResult::NonCompliant),
            "needsreview" | "review" => Some(VerdictResult::NeedsReview),
            _ => None,
        }
    }
}

impl std::fmt::Display for VerdictResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Longest notes string kept from a model verdict.
pub const MAX_NOTES_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub rule_id: String,
    pub result: VerdictResult,
    pub notes: String,
}

impl Verdict {
    pub fn new(rule_id: impl Into<String>, result: VerdictResult, notes: impl Into<String>) -> Self {
        let notes: String = notes.into();
        let notes = if notes.chars().count() > MAX_NOTES_CHARS {
            notes.chars().take(MAX_NOTES_CHARS).collect()
        } else {
            notes
        };
        Self {
            rule_id: rule_id.into(),
            result,
            notes,
        }
    }
}

// --- Casting context ---

pub const DEFAULT_TOLERANCE: &str = "Standard";
pub const DEFAULT_SURFACE_FINISH: &str = "As-cast";

/// User-supplied manufacturing parameters accompanying a drawing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CastingContext {
    pub casting_type: String,
    pub material: String,
    pub volume: u64,
    pub process: String,
    pub tolerance: String,
    pub surface_finish: String,
}

/// Raw form values as they arrive from the upload endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CastingForm {
    pub casting_type: Option<String>,
    pub material: Option<String>,
    pub volume: Option<String>,
    pub process: Option<String>,
    pub tolerance: Option<String>,
    pub surface_finish: Option<String>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ContextError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ContextError::Missing(field)),
    }
}

fn or_default(value: Option<String>, default: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl CastingForm {
    /// Check presence and shape only. Domain correctness (is this a real
    /// alloy?) is left to the reviewer.
    pub fn validate(self) -> Result<CastingContext, ContextError> {
        let raw_volume = required(self.volume, "volume")?;
        let volume = match raw_volume.parse::<u64>() {
            Ok(v) if v > 0 => v,
            _ => return Err(ContextError::InvalidVolume(raw_volume)),
        };
        Ok(CastingContext {
            casting_type: required(self.casting_type, "casting_type")?,
            material: required(self.material, "material")?,
            volume,
            process: required(self.process, "process")?,
            tolerance: or_default(self.tolerance, DEFAULT_TOLERANCE),
            surface_finish: or_default(self.surface_finish, DEFAULT_SURFACE_FINISH),
        })
    }
}

// --- Analysis runs ---

/// One complete evaluation of a drawing against the full rule set.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRun {
    pub drawing_reference: String,
    pub casting_context: CastingContext,
    pub verdicts: Vec<Verdict>,
    pub generated_at: DateTime<Utc>,
    pub report_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> CastingForm {
        CastingForm {
            casting_type: Some("Housing Casting".into()),
            material: Some("Aluminum A356".into()),
            volume: Some("5000".into()),
            process: Some("Sand Casting".into()),
            tolerance: None,
            surface_finish: Some("  ".into()),
        }
    }

    #[test]
    fn validate_fills_optional_defaults() {
        let ctx = form().validate().unwrap();
        assert_eq!(ctx.volume, 5000);
        assert_eq!(ctx.tolerance, "Standard");
        assert_eq!(ctx.surface_finish, "As-cast");
    }

    #[test]
    fn validate_rejects_missing_material() {
        let mut f = form();
        f.material = Some(String::new());
        assert!(matches!(f.validate(), Err(ContextError::Missing("material"))));
    }

    #[test]
    fn validate_rejects_non_positive_volume() {
        for bad in ["0", "-3", "lots", "12.5"] {
            let mut f = form();
            f.volume = Some(bad.into());
            assert!(
                matches!(f.validate(), Err(ContextError::InvalidVolume(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn result_synonyms_normalize() {
        assert_eq!(VerdictResult::from_model("Yes"), Some(VerdictResult::Compliant));
        assert_eq!(VerdictResult::from_model(" pass "), Some(VerdictResult::Compliant));
        assert_eq!(VerdictResult::from_model("Non-Compliant"), Some(VerdictResult::NonCompliant));
        assert_eq!(VerdictResult::from_model("non_compliant"), Some(VerdictResult::NonCompliant));
        assert_eq!(VerdictResult::from_model("Needs Review"), Some(VerdictResult::NeedsReview));
        assert_eq!(VerdictResult::from_model("maybe"), None);
    }

    #[test]
    fn verdict_notes_are_capped() {
        let v = Verdict::new("R1", VerdictResult::Compliant, "x".repeat(800));
        assert_eq!(v.notes.chars().count(), MAX_NOTES_CHARS);
    }
}
