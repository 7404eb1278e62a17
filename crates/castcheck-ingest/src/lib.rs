use std::io::Cursor;
use std::path::PathBuf;

use image::{DynamicImage, ImageFormat, RgbaImage};
use pdfium_render::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported file type{}: upload a PDF, PNG, or JPG drawing", describe(.0))]
    UnsupportedFormat(Option<String>),

    #[error("drawing could not be read: {0}")]
    CorruptFile(String),

    #[error("PDF rasterizer unavailable: {0}")]
    RasterizerUnavailable(String),
}

fn describe(declared: &Option<String>) -> String {
    match declared {
        Some(d) if !d.is_empty() => format!(" `{d}`"),
        _ => String::new(),
    }
}

/// What the upload turned out to be. Resolved once, here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawingKind {
    DocumentPage,
    RasterImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawingFormat {
    Pdf,
    Png,
    Jpeg,
}

impl DrawingFormat {
    pub fn kind(&self) -> DrawingKind {
        match self {
            DrawingFormat::Pdf => DrawingKind::DocumentPage,
            DrawingFormat::Png | DrawingFormat::Jpeg => DrawingKind::RasterImage,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DrawingFormat::Pdf => "pdf",
            DrawingFormat::Png => "png",
            DrawingFormat::Jpeg => "jpg",
        }
    }

    fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_lowercase();
        match essence.as_str() {
            "application/pdf" | "application/x-pdf" => Some(DrawingFormat::Pdf),
            "image/png" => Some(DrawingFormat::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(DrawingFormat::Jpeg),
            _ => None,
        }
    }

    fn from_file_name(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.')?.1.to_lowercase();
        match ext.as_str() {
            "pdf" => Some(DrawingFormat::Pdf),
            "png" => Some(DrawingFormat::Png),
            "jpg" | "jpeg" => Some(DrawingFormat::Jpeg),
            _ => None,
        }
    }

    fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF-") {
            return Some(DrawingFormat::Pdf);
        }
        match image::guess_format(bytes) {
            Ok(ImageFormat::Png) => Some(DrawingFormat::Png),
            Ok(ImageFormat::Jpeg) => Some(DrawingFormat::Jpeg),
            _ => None,
        }
    }
}

/// Declared MIME type wins, then the file extension, then magic bytes.
pub fn classify(
    bytes: &[u8],
    declared_mime: Option<&str>,
    file_name: Option<&str>,
) -> Result<DrawingFormat, IngestError> {
    declared_mime
        .and_then(DrawingFormat::from_mime)
        .or_else(|| file_name.and_then(DrawingFormat::from_file_name))
        .or_else(|| DrawingFormat::sniff(bytes))
        .ok_or_else(|| IngestError::UnsupportedFormat(declared_mime.map(str::to_string)))
}

/// Image payload handed to the prompt builder.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pub kind: DrawingKind,
    pub format: DrawingFormat,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RasterImage {
    pub fn mime(&self) -> &'static str {
        match self.format {
            DrawingFormat::Jpeg => "image/jpeg",
            // rendered documents are always PNG
            DrawingFormat::Png | DrawingFormat::Pdf => "image/png",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ingestor {
    dpi: u32,
    pdfium_dir: Option<PathBuf>,
}

impl Ingestor {
    pub fn new(dpi: u32) -> Self {
        Self {
            dpi,
            pdfium_dir: None,
        }
    }

    pub fn with_pdfium_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.pdfium_dir = dir;
        self
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    /// Blocking: rasterization is CPU-bound, run it off the async runtime.
    pub fn ingest(
        &self,
        bytes: &[u8],
        declared_mime: Option<&str>,
        file_name: Option<&str>,
    ) -> Result<RasterImage, IngestError> {
        let format = classify(bytes, declared_mime, file_name)?;
        tracing::debug!(?format, size = bytes.len(), "ingesting drawing");
        match format {
            DrawingFormat::Pdf => self.rasterize_first_page(bytes),
            DrawingFormat::Png | DrawingFormat::Jpeg => decode_image(bytes, format),
        }
    }

    fn bind_pdfium(&self) -> Result<Pdfium, IngestError> {
        let bindings = match &self.pdfium_dir {
            Some(dir) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| IngestError::RasterizerUnavailable(e.to_string()))?;
        Ok(Pdfium::new(bindings))
    }

    fn rasterize_first_page(&self, bytes: &[u8]) -> Result<RasterImage, IngestError> {
        let pdfium = self.bind_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| IngestError::CorruptFile(format!("unreadable PDF: {e}")))?;
        let pages = document.pages();
        if pages.len() == 0 {
            return Err(IngestError::CorruptFile("PDF has no pages".to_string()));
        }
        let page = pages
            .get(0)
            .map_err(|e| IngestError::CorruptFile(format!("first page unreadable: {e}")))?;

        // PDF user space is 72 points per inch.
        let config = PdfRenderConfig::new().scale_page_by_factor(self.dpi as f32 / 72.0);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| IngestError::CorruptFile(format!("page render failed: {e}")))?;
        let width = bitmap.width() as u32;
        let height = bitmap.height() as u32;
        let rgba = RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes()).ok_or_else(|| {
            IngestError::CorruptFile("rendered page has an unexpected pixel layout".to_string())
        })?;

        // Flatten alpha; drawings are reviewed on a white page.
        let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(rgb)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| IngestError::CorruptFile(format!("page encode failed: {e}")))?;

        tracing::info!(width, height, dpi = self.dpi, "rasterized first PDF page");
        Ok(RasterImage {
            kind: DrawingKind::DocumentPage,
            format: DrawingFormat::Pdf,
            bytes: png,
            width,
            height,
        })
    }
}

fn decode_image(bytes: &[u8], format: DrawingFormat) -> Result<RasterImage, IngestError> {
    let image_format = match format {
        DrawingFormat::Png => ImageFormat::Png,
        _ => ImageFormat::Jpeg,
    };
    let decoded = image::load_from_memory_with_format(bytes, image_format)
        .map_err(|e| IngestError::CorruptFile(e.to_string()))?;
    Ok(RasterImage {
        kind: DrawingKind::RasterImage,
        format,
        bytes: bytes.to_vec(),
        width: decoded.width(),
        height: decoded.height(),
    })
}
