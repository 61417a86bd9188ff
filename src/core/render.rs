//! Renderer dispatch.
//!
//! [RendererDispatch] holds an ordered list of [Decoder]s. For a file it reads a sample,
//! classifies it (unless the request carries a kind hint), hands at most the chosen decoder's
//! byte budget to the first decoder that accepts the kind, and returns a [RenderResult].
//!
//! Ceilings in [RenderLimits] bound every result no matter what the backend reports: text by
//! bytes, images by bytes and pixel size, tables by bytes and rows.

use crate::core::address::PathAddress;
use crate::core::backend::{Backend, DirectoryEntry, DirectoryListing};
use crate::core::classify::{RenderKind, classify, detect_language, looks_like_text, mime_guess};
use crate::core::error::{BrowseError, ErrorKind};

use std::io::Cursor;
use std::ops::Range;
use std::sync::Arc;

/// Byte and row ceilings applied while rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderLimits {
    /// Bytes read up front for classification.
    pub sample_bytes: u64,
    pub text_bytes: u64,
    pub image_bytes: u64,
    /// Decoded images are scaled down to fit this side length.
    pub image_max_side: u32,
    /// Source images with more pixels than this are refused before decoding.
    pub image_max_pixels: u64,
    pub table_bytes: u64,
    pub table_rows: usize,
    /// Files larger than this are never decoded as images.
    pub max_file_size: u64,
}

impl Default for RenderLimits {
    fn default() -> Self {
        Self {
            sample_bytes: 8 * 1024,
            text_bytes: 1024 * 1024,
            image_bytes: 20 * 1024 * 1024,
            image_max_side: 1024,
            image_max_pixels: 40_000_000,
            table_bytes: 4 * 1024 * 1024,
            table_rows: 1000,
            max_file_size: 20 * 1024 * 1024,
        }
    }
}

/// What to render. A plain value; the engine resolves the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub address: PathAddress,
    pub byte_range: Option<Range<u64>>,
    pub kind_hint: Option<RenderKind>,
}

impl RenderRequest {
    pub fn new(address: PathAddress) -> Self {
        Self {
            address,
            byte_range: None,
            kind_hint: None,
        }
    }

    pub fn with_range(mut self, range: Range<u64>) -> Self {
        self.byte_range = Some(range);
        self
    }

    pub fn with_hint(mut self, kind: RenderKind) -> Self {
        self.kind_hint = Some(kind);
        self
    }
}

#[derive(Debug, Clone)]
pub enum RenderResult {
    Text {
        content: String,
        language: Option<String>,
        truncated: bool,
    },
    Image {
        /// RGBA8, row-major.
        pixels: Vec<u8>,
        width: u32,
        height: u32,
    },
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
        truncated: bool,
    },
    Directory {
        listing: Arc<DirectoryListing>,
    },
    Binary {
        size: Option<u64>,
        mime_guess: String,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl RenderResult {
    pub fn from_error(e: &BrowseError) -> Self {
        RenderResult::Error {
            kind: e.kind(),
            message: e.message().to_string(),
        }
    }

    pub fn kind(&self) -> Option<RenderKind> {
        match self {
            RenderResult::Text { .. } => Some(RenderKind::Text),
            RenderResult::Image { .. } => Some(RenderKind::Image),
            RenderResult::Table { .. } => Some(RenderKind::Table),
            RenderResult::Directory { .. } => Some(RenderKind::Directory),
            RenderResult::Binary { .. } => Some(RenderKind::Binary),
            RenderResult::Error { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            RenderResult::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(
            self,
            RenderResult::Text { truncated: true, .. } | RenderResult::Table { truncated: true, .. }
        )
    }
}

/// Failure of a decoder on the bytes it was given.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct DecodeError(pub String);

impl From<DecodeError> for BrowseError {
    fn from(e: DecodeError) -> Self {
        BrowseError::unsupported(e.0)
    }
}

/// The bytes handed to a decoder.
///
/// `bytes` covers `range` of the object, which may be only a prefix of it; `total_size` is
/// the object size when the backend knows it.
#[derive(Debug, Clone, Copy)]
pub struct DecodeInput<'a> {
    pub address: &'a PathAddress,
    pub bytes: &'a [u8],
    pub range: (u64, u64),
    pub total_size: Option<u64>,
    /// `true` when the source continues past `bytes`.
    pub cut: bool,
}

/// A renderer for one family of formats.
///
/// Decoders must not assume the whole object is present and must honour the ceilings in
/// [RenderLimits].
pub trait Decoder: Send + Sync {
    fn name(&self) -> &'static str;

    fn accepts(&self, kind: RenderKind, address: &PathAddress) -> bool;

    /// Most bytes this decoder wants to see.
    fn byte_budget(&self, limits: &RenderLimits) -> u64;

    fn decode(&self, input: DecodeInput<'_>, limits: &RenderLimits)
    -> Result<RenderResult, DecodeError>;
}

pub struct RendererDispatch {
    decoders: Vec<Box<dyn Decoder>>,
    limits: RenderLimits,
}

impl RendererDispatch {
    /// Dispatch with the built-in text, image and table decoders.
    pub fn new(limits: RenderLimits) -> Self {
        let mut dispatch = Self::empty(limits);
        dispatch.register(Box::new(TableDecoder));
        dispatch.register(Box::new(ImageDecoder));
        dispatch.register(Box::new(TextDecoder));
        dispatch
    }

    pub fn empty(limits: RenderLimits) -> Self {
        Self {
            decoders: Vec::new(),
            limits,
        }
    }

    /// Appends a decoder; earlier registrations win.
    pub fn register(&mut self, decoder: Box<dyn Decoder>) {
        self.decoders.push(decoder);
    }

    #[inline]
    pub fn limits(&self) -> &RenderLimits {
        &self.limits
    }

    pub fn decoder_for(&self, kind: RenderKind, address: &PathAddress) -> Option<&dyn Decoder> {
        self.decoders
            .iter()
            .find(|d| d.accepts(kind, address))
            .map(|d| &**d)
    }

    /// Renders a file whose metadata is `entry`.
    ///
    /// Decode failures and formats without a decoder come back as
    /// `Error { kind: UnsupportedFormat }`.
    pub fn render(
        &self,
        backend: &dyn Backend,
        request: &RenderRequest,
        entry: &DirectoryEntry,
    ) -> RenderResult {
        self.render_inner(backend, request, entry).0
    }

    /// Like [RendererDispatch::render], but unsupported content becomes `Binary`.
    pub fn render_or_fallback(
        &self,
        backend: &dyn Backend,
        request: &RenderRequest,
        entry: &DirectoryEntry,
    ) -> RenderResult {
        let (result, sample) = self.render_inner(backend, request, entry);
        match result {
            RenderResult::Error {
                kind: ErrorKind::UnsupportedFormat,
                message,
            } => {
                tracing::debug!(address = %request.address, reason = %message, "binary fallback");
                RenderResult::Binary {
                    size: entry.size(),
                    mime_guess: mime_guess(&request.address, &sample),
                }
            }
            other => other,
        }
    }

    fn render_inner(
        &self,
        backend: &dyn Backend,
        request: &RenderRequest,
        entry: &DirectoryEntry,
    ) -> (RenderResult, Vec<u8>) {
        let addr = &request.address;
        let (start, end) = match &request.byte_range {
            Some(r) => (r.start, r.end.max(r.start)),
            None => (0, u64::MAX),
        };
        let available = end - start;

        let sample_len = self.limits.sample_bytes.min(available);
        let sample = match backend.open_range(addr, start, sample_len) {
            Ok(bytes) => bytes,
            Err(e) => return (RenderResult::from_error(&e), Vec::new()),
        };

        let kind = request
            .kind_hint
            .unwrap_or_else(|| classify(addr, false, &sample));

        if kind == RenderKind::Binary {
            let result = RenderResult::Binary {
                size: entry.size(),
                mime_guess: mime_guess(addr, &sample),
            };
            return (result, sample);
        }

        let Some(decoder) = self.decoder_for(kind, addr) else {
            let result = RenderResult::Error {
                kind: ErrorKind::UnsupportedFormat,
                message: format!("no {} decoder for {}", kind, addr),
            };
            return (result, sample);
        };

        let wanted = decoder.byte_budget(&self.limits).min(available);
        let sample_hit_eof = (sample.len() as u64) < sample_len;
        let bytes = if sample_hit_eof || sample.len() as u64 >= wanted {
            let keep = (wanted as usize).min(sample.len());
            sample[..keep].to_vec()
        } else {
            match backend.open_range(addr, start, wanted) {
                Ok(bytes) => bytes,
                Err(e) => return (RenderResult::from_error(&e), sample),
            }
        };

        let read_end = start + bytes.len() as u64;
        let cut = match entry.size() {
            Some(size) => read_end < size.min(end),
            // unknown size: a full budget means there may be more
            None => bytes.len() as u64 == wanted && wanted < available,
        };

        let input = DecodeInput {
            address: addr,
            bytes: &bytes,
            range: (start, read_end),
            total_size: entry.size(),
            cut,
        };

        tracing::debug!(
            address = %addr,
            decoder = decoder.name(),
            bytes = bytes.len(),
            cut,
            "decoding"
        );
        let result = decoder
            .decode(input, &self.limits)
            .unwrap_or_else(|e| RenderResult::Error {
                kind: ErrorKind::UnsupportedFormat,
                message: e.to_string(),
            });
        (result, sample)
    }
}

/// Trims a trailing UTF-8 sequence cut off by the byte ceiling.
fn utf8_prefix(bytes: &[u8]) -> &[u8] {
    match std::str::from_utf8(bytes) {
        Err(e) if e.error_len().is_none() => &bytes[..e.valid_up_to()],
        _ => bytes,
    }
}

pub struct TextDecoder;

impl Decoder for TextDecoder {
    fn name(&self) -> &'static str {
        "text"
    }

    fn accepts(&self, kind: RenderKind, _address: &PathAddress) -> bool {
        kind == RenderKind::Text
    }

    fn byte_budget(&self, limits: &RenderLimits) -> u64 {
        limits.text_bytes
    }

    fn decode(
        &self,
        input: DecodeInput<'_>,
        _limits: &RenderLimits,
    ) -> Result<RenderResult, DecodeError> {
        if input.bytes.contains(&0) {
            return Err(DecodeError("content is not text".to_string()));
        }

        let bytes = if input.cut {
            utf8_prefix(input.bytes)
        } else {
            input.bytes
        };
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

        // whole JSON documents are shown pretty-printed
        if !input.cut
            && input.address.extension().as_deref() == Some("json")
            && let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes)
            && let Ok(pretty) = serde_json::to_string_pretty(&value)
        {
            return Ok(RenderResult::Text {
                content: pretty,
                language: Some("JSON".to_string()),
                truncated: false,
            });
        }

        Ok(RenderResult::Text {
            content: String::from_utf8_lossy(bytes).into_owned(),
            language: detect_language(input.address, bytes),
            truncated: input.cut,
        })
    }
}

/// Raster images through the `image` crate.
pub struct ImageDecoder;

/// Image-kind formats that need an external renderer.
const NON_RASTER: &[&str] = &["pdf", "eps", "ps", "pcx", "im", "msp", "sgi", "spi", "xv", "icns"];

impl Decoder for ImageDecoder {
    fn name(&self) -> &'static str {
        "image"
    }

    fn accepts(&self, kind: RenderKind, address: &PathAddress) -> bool {
        kind == RenderKind::Image
            && !address
                .extension()
                .is_some_and(|ext| NON_RASTER.contains(&ext.as_str()))
    }

    fn byte_budget(&self, limits: &RenderLimits) -> u64 {
        limits.image_bytes.min(limits.max_file_size)
    }

    fn decode(
        &self,
        input: DecodeInput<'_>,
        limits: &RenderLimits,
    ) -> Result<RenderResult, DecodeError> {
        if input.total_size.is_some_and(|size| size > limits.max_file_size) || input.cut {
            return Err(DecodeError(format!(
                "image exceeds the {} byte ceiling",
                limits.image_bytes.min(limits.max_file_size)
            )));
        }

        let reader = image::ImageReader::new(Cursor::new(input.bytes))
            .with_guessed_format()
            .map_err(|e| DecodeError(format!("cannot read image: {}", e)))?;
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| DecodeError(format!("cannot decode image: {}", e)))?;
        if u64::from(width) * u64::from(height) > limits.image_max_pixels {
            return Err(DecodeError(format!(
                "{}x{} image exceeds the {} pixel ceiling",
                width, height, limits.image_max_pixels
            )));
        }

        let mut reader = image::ImageReader::new(Cursor::new(input.bytes))
            .with_guessed_format()
            .map_err(|e| DecodeError(format!("cannot read image: {}", e)))?;
        let mut decode_limits = image::Limits::default();
        decode_limits.max_image_width = Some(width);
        decode_limits.max_image_height = Some(height);
        // RGBA16 worst case plus decoder scratch
        decode_limits.max_alloc = Some(limits.image_max_pixels.saturating_mul(8));
        reader.limits(decode_limits);
        let img = reader
            .decode()
            .map_err(|e| DecodeError(format!("cannot decode image: {}", e)))?;

        let side = limits.image_max_side.max(1);
        let img = if img.width() > side || img.height() > side {
            img.thumbnail(side, side)
        } else {
            img
        };

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(RenderResult::Image {
            pixels: rgba.into_raw(),
            width,
            height,
        })
    }
}

/// Delimited text tables (CSV, TSV).
pub struct TableDecoder;

impl TableDecoder {
    fn delimiter(address: &PathAddress) -> Option<u8> {
        address.suffixes().iter().rev().find_map(|s| match s.as_str() {
            "csv" => Some(b','),
            "tsv" => Some(b'\t'),
            _ => None,
        })
    }
}

impl Decoder for TableDecoder {
    fn name(&self) -> &'static str {
        "table"
    }

    fn accepts(&self, kind: RenderKind, address: &PathAddress) -> bool {
        kind == RenderKind::Table && Self::delimiter(address).is_some()
    }

    fn byte_budget(&self, limits: &RenderLimits) -> u64 {
        limits.table_bytes
    }

    fn decode(
        &self,
        input: DecodeInput<'_>,
        limits: &RenderLimits,
    ) -> Result<RenderResult, DecodeError> {
        let delimiter = Self::delimiter(input.address).unwrap_or(b',');

        // a cut source ends mid-record; drop the partial line
        let bytes = if input.cut {
            match input.bytes.iter().rposition(|b| *b == b'\n') {
                Some(pos) => &input.bytes[..=pos],
                None => &input.bytes[..0],
            }
        } else {
            input.bytes
        };

        if !bytes.is_empty() && !looks_like_text(&bytes[..bytes.len().min(4096)]) {
            return Err(DecodeError("table source is not delimited text".to_string()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .has_headers(true)
            .from_reader(bytes);

        let columns: Vec<String> = reader
            .byte_headers()
            .map_err(|e| DecodeError(format!("bad table header: {}", e)))?
            .iter()
            .map(|h| String::from_utf8_lossy(h).into_owned())
            .collect();

        let mut rows = Vec::with_capacity(limits.table_rows.min(1024));
        let mut more_rows = false;
        for record in reader.byte_records() {
            let record = record.map_err(|e| DecodeError(format!("bad table row: {}", e)))?;
            if rows.len() == limits.table_rows {
                more_rows = true;
                break;
            }
            rows.push(
                record
                    .iter()
                    .map(|f| String::from_utf8_lossy(f).into_owned())
                    .collect(),
            );
        }

        Ok(RenderResult::Table {
            columns,
            rows,
            truncated: more_rows || input.cut,
        })
    }
}
