//! Caller input parsing: attachment names, whitelisted PDF options and page payloads.
//!
//! Caller options are overlaid on fixed defaults into [`PdfOptions`]. The output
//! destination is not part of that set; it is attached per task by the coordinator.

use std::fmt;

use serde::Deserialize;

use super::error::RequestError;

pub const DEFAULT_FILENAME: &str = "document";
const PDF_SUFFIX: &str = ".pdf";
const MIN_SCALE: f64 = 0.1;
const MAX_SCALE: f64 = 2.0;

/// Attachment stem; the `.pdf` suffix is appended exactly once by [`Filename::attachment_name`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filename(String);

impl Filename {
    pub fn stem(&self) -> &str {
        &self.0
    }

    pub fn attachment_name(&self) -> String {
        format!("{}{PDF_SUFFIX}", self.0)
    }
}

impl Default for Filename {
    fn default() -> Self {
        Self(DEFAULT_FILENAME.to_string())
    }
}

impl fmt::Display for Filename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip one optional trailing `.pdf`; absent or empty input yields the default name.
pub fn parse_filename(raw: Option<&str>) -> Filename {
    let Some(raw) = raw.filter(|value| !value.is_empty()) else {
        return Filename::default();
    };

    match raw.strip_suffix(PDF_SUFFIX) {
        Some(stem) if !stem.is_empty() => Filename(stem.to_string()),
        _ => Filename(raw.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaperFormat {
    Letter,
    Legal,
    Tabloid,
    Ledger,
    A0,
    A1,
    A2,
    A3,
    #[default]
    A4,
    A5,
    A6,
}

impl PaperFormat {
    pub fn parse(value: &str) -> Option<Self> {
        let format = match value.to_ascii_lowercase().as_str() {
            "letter" => Self::Letter,
            "legal" => Self::Legal,
            "tabloid" => Self::Tabloid,
            "ledger" => Self::Ledger,
            "a0" => Self::A0,
            "a1" => Self::A1,
            "a2" => Self::A2,
            "a3" => Self::A3,
            "a4" => Self::A4,
            "a5" => Self::A5,
            "a6" => Self::A6,
            _ => return None,
        };
        Some(format)
    }

    /// Portrait width and height in inches.
    pub fn dimensions(self) -> PaperSize {
        let (width, height) = match self {
            Self::Letter => (8.5, 11.0),
            Self::Legal => (8.5, 14.0),
            Self::Tabloid => (11.0, 17.0),
            Self::Ledger => (17.0, 11.0),
            Self::A0 => (33.1, 46.8),
            Self::A1 => (23.4, 33.1),
            Self::A2 => (16.54, 23.4),
            Self::A3 => (11.7, 16.54),
            Self::A4 => (8.27, 11.7),
            Self::A5 => (5.83, 8.27),
            Self::A6 => (4.13, 5.83),
        };
        PaperSize { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaperSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Margins {
    pub top: Option<f64>,
    pub right: Option<f64>,
    pub bottom: Option<f64>,
    pub left: Option<f64>,
}

/// Whitelisted rendering options shared by every fragment of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfOptions {
    pub format: PaperFormat,
    pub landscape: bool,
    pub print_background: bool,
    pub scale: Option<f64>,
    pub margins: Margins,
    pub page_ranges: Option<String>,
    pub display_header_footer: bool,
    pub header_template: Option<String>,
    pub footer_template: Option<String>,
    pub prefer_css_page_size: bool,
    /// Explicit paper size; overrides `format` when present.
    pub paper_size: Option<PaperSize>,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            format: PaperFormat::A4,
            landscape: false,
            print_background: true,
            scale: None,
            margins: Margins::default(),
            page_ranges: None,
            display_header_footer: false,
            header_template: None,
            footer_template: None,
            prefer_css_page_size: false,
            paper_size: None,
        }
    }
}

impl PdfOptions {
    pub fn paper(&self) -> PaperSize {
        self.paper_size.unwrap_or_else(|| self.format.dimensions())
    }
}

/// Query string accepted by both render endpoints. Unknown keys are ignored.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRenderQuery {
    pub filename: Option<String>,
    pub format: Option<String>,
    pub landscape: Option<bool>,
    pub print_background: Option<bool>,
    pub scale: Option<f64>,
    pub margin_top: Option<f64>,
    pub margin_right: Option<f64>,
    pub margin_bottom: Option<f64>,
    pub margin_left: Option<f64>,
    pub page_ranges: Option<String>,
    pub display_header_footer: Option<bool>,
    pub header_template: Option<String>,
    pub footer_template: Option<String>,
    #[serde(rename = "preferCSSPageSize", alias = "preferCssPageSize")]
    pub prefer_css_page_size: Option<bool>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

/// Resolve the attachment name and the effective options for a request.
pub fn parse(query: RawRenderQuery) -> Result<(Filename, PdfOptions), RequestError> {
    let filename = parse_filename(query.filename.as_deref());
    let mut options = PdfOptions::default();

    if let Some(format) = query.format.as_deref() {
        options.format = PaperFormat::parse(format).ok_or_else(|| {
            RequestError::invalid_option("format", format!("unknown format `{format}`"))
        })?;
    }
    if let Some(landscape) = query.landscape {
        options.landscape = landscape;
    }
    if let Some(print_background) = query.print_background {
        options.print_background = print_background;
    }
    if let Some(scale) = query.scale {
        if !(MIN_SCALE..=MAX_SCALE).contains(&scale) {
            return Err(RequestError::invalid_option(
                "scale",
                format!("must be between {MIN_SCALE} and {MAX_SCALE}"),
            ));
        }
        options.scale = Some(scale);
    }

    options.margins = Margins {
        top: non_negative("marginTop", query.margin_top)?,
        right: non_negative("marginRight", query.margin_right)?,
        bottom: non_negative("marginBottom", query.margin_bottom)?,
        left: non_negative("marginLeft", query.margin_left)?,
    };

    options.page_ranges = query.page_ranges.filter(|ranges| !ranges.trim().is_empty());
    if let Some(display) = query.display_header_footer {
        options.display_header_footer = display;
    }
    options.header_template = query.header_template;
    options.footer_template = query.footer_template;
    if let Some(prefer) = query.prefer_css_page_size {
        options.prefer_css_page_size = prefer;
    }

    options.paper_size = match (query.width, query.height) {
        (None, None) => None,
        (Some(width), Some(height)) if width > 0.0 && height > 0.0 => {
            Some(PaperSize { width, height })
        }
        (Some(_), Some(_)) => {
            return Err(RequestError::invalid_option(
                "width/height",
                "must be greater than zero",
            ));
        }
        _ => {
            return Err(RequestError::invalid_option(
                "width/height",
                "width and height must be supplied together",
            ));
        }
    };

    Ok((filename, options))
}

fn non_negative(key: &'static str, value: Option<f64>) -> Result<Option<f64>, RequestError> {
    match value {
        Some(inches) if !inches.is_finite() || inches < 0.0 => {
            Err(RequestError::invalid_option(key, "must be a non-negative number of inches"))
        }
        other => Ok(other),
    }
}

#[derive(Debug, Deserialize)]
struct PagesPayload {
    pages: Vec<String>,
}

/// Decode the `/multiple` body into its ordered fragments.
pub fn parse_pages(body: &[u8], max_pages: usize) -> Result<Vec<String>, RequestError> {
    let payload: PagesPayload =
        serde_json::from_slice(body).map_err(|err| RequestError::body(err.to_string()))?;

    if payload.pages.is_empty() {
        return Err(RequestError::body("`pages` must contain at least one entry"));
    }
    if payload.pages.len() > max_pages {
        return Err(RequestError::TooManyPages {
            submitted: payload.pages.len(),
            limit: max_pages,
        });
    }

    Ok(payload.pages)
}

/// Decode the single-document body as UTF-8 HTML.
pub fn parse_html(body: &[u8]) -> Result<String, RequestError> {
    String::from_utf8(body.to_vec()).map_err(|err| RequestError::body(err.to_string()))
}

/// A parsed render request; immutable once built.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    filename: Filename,
    options: PdfOptions,
    fragments: Vec<String>,
}

impl RenderRequest {
    pub fn new(
        filename: Filename,
        options: PdfOptions,
        fragments: Vec<String>,
    ) -> Result<Self, RequestError> {
        if fragments.is_empty() {
            return Err(RequestError::body("at least one HTML fragment is required"));
        }
        Ok(Self {
            filename,
            options,
            fragments,
        })
    }

    pub fn filename(&self) -> &Filename {
        &self.filename
    }

    pub fn options(&self) -> &PdfOptions {
        &self.options
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }
}
