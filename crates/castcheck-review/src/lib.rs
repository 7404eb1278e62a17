pub mod engine;
pub mod parse;
pub mod prompt;

use thiserror::Error;

use castcheck_core::{CastingContext, RuleStore, Verdict};
use castcheck_ingest::RasterImage;

pub use engine::{LlmModelClient, ModelClient, ModelError};
pub use parse::{ParseReport, ParseStats};
pub use prompt::{PromptLimits, PromptPayload};

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("{what} is too large for the model ({size} > {limit})")]
    PromptTooLarge {
        what: &'static str,
        size: usize,
        limit: usize,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("model response could not be parsed: {reason}")]
    UnparsableResponse { reason: String, raw_text: String },
}

/// Result of one model round trip.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub verdicts: Vec<Verdict>,
    pub stats: ParseStats,
    pub raw_response: String,
}

/// Evaluate every rule against the drawing with a single model call.
pub async fn review(
    client: &dyn ModelClient,
    rules: &RuleStore,
    ctx: &CastingContext,
    image: &RasterImage,
    limits: &PromptLimits,
) -> Result<ReviewOutcome, ReviewError> {
    let payload = prompt::build(rules.rules(), ctx, image, limits)?;

    tracing::info!(
        model = %client.describe(),
        rules = rules.len(),
        prompt_chars = payload.text_chars(),
        image_bytes = payload.image.bytes.len(),
        "sending drawing for review"
    );

    let raw = client.send(&payload).await?;
    tracing::debug!(raw = %raw, "raw model output");

    let ids = rules.ids();
    let report = parse::parse(&raw, &ids)?;
    tracing::info!(
        accepted = report.stats.accepted,
        dropped = report.stats.dropped(),
        coerced = report.stats.coerced,
        "parsed model verdicts"
    );

    Ok(ReviewOutcome {
        verdicts: report.verdicts,
        stats: report.stats,
        raw_response: raw,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use castcheck_core::VerdictResult;
    use castcheck_ingest::{DrawingFormat, DrawingKind};

    use super::*;

    struct Scripted {
        reply: Result<String, ModelError>,
        seen: Mutex<Vec<PromptPayload>>,
    }

    impl Scripted {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelClient for Scripted {
        fn describe(&self) -> String {
            "scripted".into()
        }

        async fn send(&self, payload: &PromptPayload) -> Result<String, ModelError> {
            self.seen.lock().unwrap().push(payload.clone());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(ModelError::Timeout(d)) => Err(ModelError::Timeout(*d)),
                Err(ModelError::Auth(m)) => Err(ModelError::Auth(m.clone())),
                Err(ModelError::Unavailable(m)) => Err(ModelError::Unavailable(m.clone())),
            }
        }
    }

    fn store() -> RuleStore {
        RuleStore::from_json_str(
            r#"[{"id":"R1","checklist_item":"a"},{"id":"R2","checklist_item":"b"}]"#,
            "test",
        )
        .unwrap()
    }

    fn ctx() -> CastingContext {
        CastingContext {
            casting_type: "Bracket".into(),
            material: "Steel".into(),
            volume: 100,
            process: "Sand Casting".into(),
            tolerance: "Standard".into(),
            surface_finish: "As-cast".into(),
        }
    }

    fn image() -> RasterImage {
        RasterImage {
            kind: DrawingKind::RasterImage,
            format: DrawingFormat::Png,
            bytes: vec![0x89, b'P', b'N', b'G'],
            width: 1,
            height: 1,
        }
    }

    #[tokio::test]
    async fn review_returns_parsed_verdicts_and_raw_text() {
        let reply = r#"Here you go:
[{"rule_id":"R1","result":"Compliant","notes":"ok"},
 {"rule_id":"R2","result":"fail","notes":"sharp corner"},
 {"rule_id":"R9","result":"Compliant","notes":"?"}]"#;
        let client = Scripted::replying(reply);
        let outcome = review(&client, &store(), &ctx(), &image(), &PromptLimits::default())
            .await
            .unwrap();

        assert_eq!(outcome.verdicts.len(), 2);
        assert_eq!(outcome.verdicts[1].result, VerdictResult::NonCompliant);
        assert_eq!(outcome.stats.unknown_rule, 1);
        assert_eq!(outcome.raw_response, reply);

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].user.contains("[R2] b"));
    }

    #[tokio::test]
    async fn model_errors_pass_through() {
        let client = Scripted {
            reply: Err(ModelError::Timeout(Duration::from_secs(120))),
            seen: Mutex::new(Vec::new()),
        };
        let err = review(&client, &store(), &ctx(), &image(), &PromptLimits::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Model(ModelError::Timeout(_))));
    }

    #[tokio::test]
    async fn oversized_prompt_never_reaches_the_model() {
        let client = Scripted::replying("[]");
        let limits = PromptLimits {
            max_image_bytes: 1,
            ..PromptLimits::default()
        };
        let err = review(&client, &store(), &ctx(), &image(), &limits)
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::PromptTooLarge { .. }));
        assert!(client.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn prose_only_reply_is_unparsable() {
        let client = Scripted::replying("I cannot evaluate this drawing.");
        let err = review(&client, &store(), &ctx(), &image(), &PromptLimits::default())
            .await
            .unwrap_err();
        match err {
            ReviewError::UnparsableResponse { raw_text, .. } => {
                assert_eq!(raw_text, "I cannot evaluate this drawing.")
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
