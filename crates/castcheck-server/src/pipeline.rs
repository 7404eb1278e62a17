use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use serde::Serialize;

use castcheck_core::{AnalysisRun, CastingContext, CastingForm};
use castcheck_ingest::DrawingFormat;
use castcheck_report::{aggregate, write_report, ReportRow, Summary};

use crate::{AnalyzeError, AppState};

/// The uploaded drawing as received from the multipart body.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub status: &'static str,
    pub drawing_filename: String,
    pub casting_context: CastingContext,
    pub summary: Summary,
    pub excel_filename: String,
    /// Stored copy of the uploaded drawing, downloadable next to the report.
    pub pdf_filename: String,
}

pub async fn run(
    state: &AppState,
    upload: Upload,
    form: CastingForm,
) -> Result<AnalyzeResponse, AnalyzeError> {
    let ctx = form.validate()?;
    if upload.bytes.is_empty() {
        return Err(AnalyzeError::BadRequest("drawing_file is empty".to_string()));
    }
    let drawing_filename = upload
        .file_name
        .clone()
        .unwrap_or_else(|| "drawing".to_string());
    tracing::info!(
        drawing = %drawing_filename,
        size = upload.bytes.len(),
        material = %ctx.material,
        volume = ctx.volume,
        "analysis started"
    );

    let ingestor = state.ingestor.clone();
    let Upload {
        file_name,
        content_type,
        bytes,
    } = upload;
    let (image, bytes) = tokio::task::spawn_blocking(move || {
        let image = ingestor.ingest(&bytes, content_type.as_deref(), file_name.as_deref());
        (image, bytes)
    })
    .await
    .map_err(|e| AnalyzeError::Internal(format!("ingest task failed: {e}")))?;
    let image = image?;

    let outcome = castcheck_review::review(
        state.model.as_ref(),
        &state.rules,
        &ctx,
        &image,
        &state.limits,
    )
    .await?;

    let (mut summary, rows) = aggregate(state.rules.rules(), &outcome.verdicts);
    summary.unmatched_verdicts += outcome.stats.dropped();

    let generated_at = Local::now();
    let output_dir = state.settings.output_dir.clone();
    let report_ctx = ctx.clone();
    let format = image.format;
    let (report_path, drawing_path) = tokio::task::spawn_blocking(move || {
        persist(&output_dir, &report_ctx, &rows, generated_at, format, &bytes)
    })
    .await
    .map_err(|e| AnalyzeError::Internal(format!("report task failed: {e}")))??;

    let excel_filename = file_name_of(&report_path);
    let pdf_filename = file_name_of(&drawing_path);
    summary.output_file = Some(excel_filename.clone());

    let run = AnalysisRun {
        drawing_reference: drawing_filename.clone(),
        casting_context: ctx,
        verdicts: outcome.verdicts,
        generated_at: generated_at.with_timezone(&Utc),
        report_path,
    };
    tracing::info!(
        drawing = %run.drawing_reference,
        verdicts = run.verdicts.len(),
        compliant = summary.results.compliant,
        non_compliant = summary.results.non_compliant,
        needs_review = summary.results.needs_review,
        unmatched = summary.unmatched_verdicts,
        report = %run.report_path.display(),
        "analysis finished"
    );

    Ok(AnalyzeResponse {
        status: "success",
        drawing_filename,
        casting_context: run.casting_context,
        summary,
        excel_filename,
        pdf_filename,
    })
}

/// Write the report, then keep the drawing under the report's name with the
/// drawing's own extension. A report whose drawing could not be stored is
/// removed again.
fn persist(
    dir: &Path,
    ctx: &CastingContext,
    rows: &[ReportRow],
    generated_at: chrono::DateTime<Local>,
    format: DrawingFormat,
    drawing: &[u8],
) -> Result<(PathBuf, PathBuf), AnalyzeError> {
    let report_path = write_report(dir, ctx, rows, generated_at)?;
    let drawing_path = report_path.with_extension(format.extension());
    if let Err(e) = std::fs::write(&drawing_path, drawing) {
        if let Err(cleanup) = std::fs::remove_file(&report_path) {
            tracing::warn!(
                path = %report_path.display(),
                error = %cleanup,
                "failed to remove report after drawing store failure"
            );
        }
        return Err(AnalyzeError::Store(e));
    }
    Ok((report_path, drawing_path))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use castcheck_core::{Rule, Verdict, VerdictResult};
    use castcheck_report::report_file_name;

    fn ctx() -> CastingContext {
        CastingContext {
            casting_type: "Valve Body".into(),
            material: "Bronze".into(),
            volume: 300,
            process: "Investment Casting".into(),
            tolerance: "Standard".into(),
            surface_finish: "As-cast".into(),
        }
    }

    fn rows() -> Vec<ReportRow> {
        let rules = vec![Rule {
            id: "R1".into(),
            checklist_item: "Feed heavy sections.".into(),
            category: None,
            severity: None,
        }];
        aggregate(&rules, &[Verdict::new("R1", VerdictResult::Compliant, "ok")]).1
    }

    #[test]
    fn drawing_is_stored_next_to_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let (report, drawing) =
            persist(dir.path(), &ctx(), &rows(), Local::now(), DrawingFormat::Pdf, b"%PDF-1.7")
                .unwrap();
        assert_eq!(report.with_extension("pdf"), drawing);
        assert_eq!(std::fs::read(drawing).unwrap(), b"%PDF-1.7");
    }

    #[test]
    fn failed_drawing_store_leaves_no_report_behind() {
        let dir = tempfile::tempdir().unwrap();
        let at = Local::now();
        let report_name = report_file_name(&ctx(), at);
        // a directory squatting on the drawing's name makes the write fail
        let blocker = dir.path().join(report_name.replace(".xlsx", ".png"));
        std::fs::create_dir(&blocker).unwrap();

        let err = persist(dir.path(), &ctx(), &rows(), at, DrawingFormat::Png, b"png").unwrap_err();
        assert!(matches!(err, AnalyzeError::Store(_)));
        assert!(!dir.path().join(&report_name).exists());
    }
}
