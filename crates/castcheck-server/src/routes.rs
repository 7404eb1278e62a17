use std::path::{Component, Path as FsPath};

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;

use castcheck_core::CastingForm;
use castcheck_report::REPORT_PREFIX;

use crate::pipeline::{self, AnalyzeResponse, Upload};
use crate::{AnalyzeError, AppState, FileError};

pub(crate) async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "message": "Casting Analysis API is running",
    }))
}

pub(crate) async fn analyze(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, AnalyzeError> {
    let mut upload: Option<Upload> = None;
    let mut form = CastingForm::default();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == "drawing_file" {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await?.to_vec();
            upload = Some(Upload {
                file_name,
                content_type,
                bytes,
            });
            continue;
        }
        let slot = match name.as_str() {
            "casting_type" => &mut form.casting_type,
            "material" => &mut form.material,
            "volume" => &mut form.volume,
            "process" => &mut form.process,
            "tolerance" => &mut form.tolerance,
            "surface_finish" => &mut form.surface_finish,
            other => {
                tracing::debug!(field = other, "ignoring unknown form field");
                continue;
            }
        };
        *slot = Some(field.text().await?);
    }

    let upload =
        upload.ok_or_else(|| AnalyzeError::BadRequest("missing drawing_file".to_string()))?;
    pipeline::run(&state, upload, form).await.map(Json)
}

#[derive(Debug, Serialize)]
struct LatestReport {
    filename: String,
    path: String,
}

pub(crate) async fn latest_report(State(state): State<AppState>) -> Result<Response, FileError> {
    let mut entries = match tokio::fs::read_dir(&state.settings.output_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(StatusCode::NO_CONTENT.into_response())
        }
        Err(e) => return Err(e.into()),
    };

    let mut newest: Option<(std::time::SystemTime, String)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(REPORT_PREFIX) || !name.ends_with(".xlsx") {
            continue;
        }
        let modified = entry.metadata().await?.modified()?;
        // names embed the timestamp, so they break mtime ties
        if newest
            .as_ref()
            .map_or(true, |(t, n)| (modified, &name) > (*t, n))
        {
            newest = Some((modified, name));
        }
    }

    Ok(match newest {
        Some((_, filename)) => Json(LatestReport {
            path: format!("/download/{filename}"),
            filename,
        })
        .into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// Accept only a single plain path component.
fn safe_file_name(name: &str) -> Result<&str, FileError> {
    let mut components = FsPath::new(name).components();
    let ok = !name.contains(['/', '\\', '\0'])
        && !name.contains("..")
        && matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none();
    if ok {
        Ok(name)
    } else {
        Err(FileError::InvalidName(name.to_string()))
    }
}

fn content_type_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

pub(crate) async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, FileError> {
    let name = safe_file_name(&filename)?;
    let path = state.settings.output_dir.join(name);
    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(FileError::NotFound(name.to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    if !file.metadata().await?.is_file() {
        return Err(FileError::NotFound(name.to_string()));
    }

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{name}\""))
        .map_err(|_| FileError::InvalidName(name.to_string()))?;
    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type_for(name))),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
