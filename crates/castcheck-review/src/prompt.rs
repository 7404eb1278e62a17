use castcheck_core::guidance::{format_volume, material_guidance, volume_guidance};
use castcheck_core::{CastingContext, Rule, VerdictResult};
use castcheck_ingest::RasterImage;

use crate::ReviewError;

/// Upper bounds imposed by the model provider. Exceeding either is an error;
/// rules are never dropped to fit.
#[derive(Debug, Clone, Copy)]
pub struct PromptLimits {
    pub max_prompt_chars: usize,
    pub max_image_bytes: usize,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self {
            max_prompt_chars: 200_000,
            // inline image ceiling for the hosted vision APIs
            max_image_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePart {
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// Everything sent to the model for one analysis run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPayload {
    pub system: String,
    pub user: String,
    pub image: ImagePart,
}

impl PromptPayload {
    pub fn text_chars(&self) -> usize {
        self.system.chars().count() + self.user.chars().count()
    }
}

/// Convert the rule set to a compact text listing for LLM consumption.
pub fn serialize_rules(rules: &[Rule]) -> String {
    let mut out = String::with_capacity(rules.len() * 128);
    out.push_str("RULES:\n");
    for rule in rules {
        out.push('[');
        out.push_str(&rule.id);
        out.push(']');
        match (&rule.category, &rule.severity) {
            (Some(c), Some(s)) => {
                out.push_str(" (");
                out.push_str(c);
                out.push_str(", severity ");
                out.push_str(s);
                out.push(')');
            }
            (Some(c), None) => {
                out.push_str(" (");
                out.push_str(c);
                out.push(')');
            }
            (None, Some(s)) => {
                out.push_str(" (severity ");
                out.push_str(s);
                out.push(')');
            }
            (None, None) => {}
        }
        out.push(' ');
        out.push_str(&rule.checklist_item);
        out.push('\n');
    }
    out
}

fn serialize_context(ctx: &CastingContext) -> String {
    format!(
        "CASTING SPECIFICATIONS:\n\
- Type: {}\n\
- Material: {}\n\
- Production Volume: {} parts\n\
- Process: {}\n\
- Tolerance: {}\n\
- Surface Finish: {}\n\n\
MATERIAL-SPECIFIC CONSIDERATIONS:\n{}\n\n\
VOLUME-SPECIFIC CONSIDERATIONS:\n{}\n",
        ctx.casting_type,
        ctx.material,
        format_volume(ctx.volume),
        ctx.process,
        ctx.tolerance,
        ctx.surface_finish,
        material_guidance(&ctx.material),
        volume_guidance(ctx.volume),
    )
}

pub fn system_prompt(rules: &[Rule]) -> String {
    let [compliant, non_compliant, needs_review] = VerdictResult::ALL.map(|r| r.as_str());
    format!(
        "You are a senior casting design engineer. You review a 2D casting drawing against a \
fixed checklist of {count} design rules, taking the casting specifications into account.\n\n\
Instructions:\n\
- Examine the attached drawing carefully\n\
- Evaluate every rule independently, based ONLY on geometry visible in the drawing\n\
- Consider the material properties and production volume in your assessment\n\
- Factor in the casting type and process requirements\n\n\
Output ONLY a JSON array with exactly one object per rule id, in rule order. \
Each item: {{\"rule_id\":\"<rule id>\",\"result\":\"{compliant}\"|\"{non_compliant}\"|\"{needs_review}\",\
\"notes\":\"<brief engineering justification>\"}}.\n\
- \"{compliant}\" = the drawing complies with the rule\n\
- \"{non_compliant}\" = the drawing violates the rule (explain the violation)\n\
- \"{needs_review}\" = compliance cannot be determined from the visible geometry\n\n\
Do not add markdown, commentary, or extra fields. Output ONLY the JSON array, nothing else.",
        count = rules.len(),
    )
}

pub fn user_message(rules: &[Rule], ctx: &CastingContext) -> String {
    let mut out = serialize_context(ctx);
    out.push('\n');
    out.push_str(&serialize_rules(rules));
    out.push_str("\nThe drawing is attached as an image. Respond with the JSON array only.");
    out
}

/// Assemble the model request. Pure: equal inputs give equal payloads.
pub fn build(
    rules: &[Rule],
    ctx: &CastingContext,
    image: &RasterImage,
    limits: &PromptLimits,
) -> Result<PromptPayload, ReviewError> {
    let payload = PromptPayload {
        system: system_prompt(rules),
        user: user_message(rules, ctx),
        image: ImagePart {
            mime: image.mime(),
            bytes: image.bytes.clone(),
        },
    };

    let chars = payload.text_chars();
    if chars > limits.max_prompt_chars {
        return Err(ReviewError::PromptTooLarge {
            what: "prompt text",
            size: chars,
            limit: limits.max_prompt_chars,
        });
    }
    if payload.image.bytes.len() > limits.max_image_bytes {
        return Err(ReviewError::PromptTooLarge {
            what: "drawing image",
            size: payload.image.bytes.len(),
            limit: limits.max_image_bytes,
        });
    }
    Ok(payload)
}
