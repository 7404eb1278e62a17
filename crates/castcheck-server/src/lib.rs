pub mod cli;
pub mod error;
pub mod pipeline;
mod routes;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use castcheck_core::{RuleStore, Settings};
use castcheck_ingest::Ingestor;
use castcheck_review::{ModelClient, PromptLimits};

pub use error::{AnalyzeError, FileError};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
pub const DEFAULT_CORS_ORIGINS: [&str; 2] = ["http://localhost:5173", "http://localhost:5174"];

/// Request-surface knobs that do not affect analysis results.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub max_upload_bytes: usize,
    pub cors_origins: Vec<String>,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect(),
        }
    }
}

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub rules: Arc<RuleStore>,
    pub model: Arc<dyn ModelClient>,
    pub ingestor: Ingestor,
    pub limits: PromptLimits,
    pub http: HttpOptions,
}

impl AppState {
    pub fn new(settings: Settings, rules: RuleStore, model: Arc<dyn ModelClient>) -> Self {
        let ingestor =
            Ingestor::new(settings.render_dpi).with_pdfium_dir(settings.pdfium_dir.clone());
        Self {
            settings: Arc::new(settings),
            rules: Arc::new(rules),
            model,
            ingestor,
            limits: PromptLimits::default(),
            http: HttpOptions::default(),
        }
    }

    pub fn with_http(mut self, http: HttpOptions) -> Self {
        self.http = http;
        self
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.http.max_upload_bytes;
    let cors = cors_layer(&state.http.cors_origins);
    Router::new()
        .route("/analyze", post(routes::analyze))
        .route("/latest-report", get(routes::latest_report))
        .route("/download/:filename", get(routes::download))
        .route("/health", get(routes::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
