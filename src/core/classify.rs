//! Content classification.
//!
//! Maps an address plus a sample of its first bytes onto a [RenderKind]. The decision is a
//! pure function of the lowercased name suffixes and the sample; nothing beyond the sample
//! is ever read. Rules apply in order:
//!
//! 1. exact extension match, longest compound suffix first (`tar.gz` before `gz`)
//! 2. inner suffixes (`data.csv.bak` is treated like `data.csv`)
//! 3. magic number sniffing, for unknown names and names mapped to [Rule::Probe]
//! 4. text heuristic on the sample
//! 5. binary

use crate::core::address::PathAddress;

use once_cell::sync::Lazy;
use phf::phf_map;
use syntect::parsing::SyntaxSet;

use std::fmt;

/// How a file is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderKind {
    Text,
    Image,
    Table,
    Directory,
    Binary,
}

impl fmt::Display for RenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderKind::Text => "text",
            RenderKind::Image => "image",
            RenderKind::Table => "table",
            RenderKind::Directory => "directory",
            RenderKind::Binary => "binary",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    Kind(RenderKind),
    /// The extension is ambiguous; decide from the bytes.
    Probe,
}

use RenderKind::{Binary, Image, Table, Text};

#[rustfmt::skip]
static EXTENSION_RULES: phf::Map<&'static str, Rule> = phf_map! {
    // images, including the documents rendered through an image decoder
    "bmp" => Rule::Kind(Image), "dib" => Rule::Kind(Image), "eps" => Rule::Kind(Image),
    "ps" => Rule::Kind(Image), "gif" => Rule::Kind(Image), "icns" => Rule::Kind(Image),
    "ico" => Rule::Kind(Image), "cur" => Rule::Kind(Image), "im" => Rule::Kind(Image),
    "im.gz" => Rule::Kind(Image), "im.bz2" => Rule::Kind(Image), "jpg" => Rule::Kind(Image),
    "jpe" => Rule::Kind(Image), "jpeg" => Rule::Kind(Image), "jfif" => Rule::Kind(Image),
    "msp" => Rule::Kind(Image), "pcx" => Rule::Kind(Image), "png" => Rule::Kind(Image),
    "ppm" => Rule::Kind(Image), "pbm" => Rule::Kind(Image), "pgm" => Rule::Kind(Image),
    "sgi" => Rule::Kind(Image), "rgb" => Rule::Kind(Image), "bw" => Rule::Kind(Image),
    "spi" => Rule::Kind(Image), "tif" => Rule::Kind(Image), "tiff" => Rule::Kind(Image),
    "webp" => Rule::Kind(Image), "xbm" => Rule::Kind(Image), "xv" => Rule::Kind(Image),
    "pdf" => Rule::Kind(Image),

    // structured data
    "csv" => Rule::Kind(Table), "tsv" => Rule::Kind(Table), "parquet" => Rule::Kind(Table),
    "feather" => Rule::Kind(Table), "fea" => Rule::Kind(Table), "arrow" => Rule::Kind(Table),

    // archives and executables
    "zip" => Rule::Kind(Binary), "tar" => Rule::Kind(Binary), "gz" => Rule::Kind(Binary),
    "tgz" => Rule::Kind(Binary), "tar.gz" => Rule::Kind(Binary), "bz2" => Rule::Kind(Binary),
    "tar.bz2" => Rule::Kind(Binary), "xz" => Rule::Kind(Binary), "tar.xz" => Rule::Kind(Binary),
    "zst" => Rule::Kind(Binary), "7z" => Rule::Kind(Binary), "rar" => Rule::Kind(Binary),
    "jar" => Rule::Kind(Binary), "whl" => Rule::Kind(Binary), "exe" => Rule::Kind(Binary),
    "dll" => Rule::Kind(Binary), "so" => Rule::Kind(Binary), "dylib" => Rule::Kind(Binary),
    "o" => Rule::Kind(Binary), "a" => Rule::Kind(Binary), "class" => Rule::Kind(Binary),
    "wasm" => Rule::Kind(Binary), "pyc" => Rule::Kind(Binary), "iso" => Rule::Kind(Binary),
    "dmg" => Rule::Kind(Binary), "sqlite" => Rule::Kind(Binary), "db" => Rule::Kind(Binary),
    "mp3" => Rule::Kind(Binary), "mp4" => Rule::Kind(Binary), "mkv" => Rule::Kind(Binary),
    "wav" => Rule::Kind(Binary), "ttf" => Rule::Kind(Binary), "woff" => Rule::Kind(Binary),

    // text
    "txt" => Rule::Kind(Text), "md" => Rule::Kind(Text), "markdown" => Rule::Kind(Text),
    "rst" => Rule::Kind(Text), "json" => Rule::Kind(Text), "jsonl" => Rule::Kind(Text),
    "toml" => Rule::Kind(Text), "yaml" => Rule::Kind(Text), "yml" => Rule::Kind(Text),
    "xml" => Rule::Kind(Text), "html" => Rule::Kind(Text), "css" => Rule::Kind(Text),
    "svg" => Rule::Kind(Text), "rs" => Rule::Kind(Text), "py" => Rule::Kind(Text),
    "js" => Rule::Kind(Text), "ts" => Rule::Kind(Text), "go" => Rule::Kind(Text),
    "c" => Rule::Kind(Text), "h" => Rule::Kind(Text), "cpp" => Rule::Kind(Text),
    "java" => Rule::Kind(Text), "sh" => Rule::Kind(Text), "log" => Rule::Kind(Text),
    "ini" => Rule::Kind(Text), "cfg" => Rule::Kind(Text), "lock" => Rule::Kind(Text),

    // ambiguous
    "dat" => Rule::Probe, "data" => Rule::Probe, "bin" => Rule::Probe, "raw" => Rule::Probe,
};

#[rustfmt::skip]
static MIME_BY_EXTENSION: phf::Map<&'static str, &'static str> = phf_map! {
    "png" => "image/png", "jpg" => "image/jpeg", "jpeg" => "image/jpeg", "gif" => "image/gif",
    "bmp" => "image/bmp", "webp" => "image/webp", "tif" => "image/tiff", "tiff" => "image/tiff",
    "ico" => "image/x-icon", "pdf" => "application/pdf", "ps" => "application/postscript",
    "eps" => "application/postscript", "csv" => "text/csv", "tsv" => "text/tab-separated-values",
    "parquet" => "application/vnd.apache.parquet", "feather" => "application/vnd.apache.arrow.file",
    "fea" => "application/vnd.apache.arrow.file", "arrow" => "application/vnd.apache.arrow.file",
    "zip" => "application/zip", "jar" => "application/java-archive", "tar" => "application/x-tar",
    "gz" => "application/gzip", "tgz" => "application/gzip", "bz2" => "application/x-bzip2",
    "xz" => "application/x-xz", "7z" => "application/x-7z-compressed",
    "rar" => "application/vnd.rar", "wasm" => "application/wasm", "json" => "application/json",
    "mp3" => "audio/mpeg", "mp4" => "video/mp4", "wav" => "audio/wav",
    "sqlite" => "application/vnd.sqlite3",
};

/// Shared syntect definitions, loaded on first use.
pub(crate) static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);

/// Classifies a file or directory.
///
/// Directories are never sampled; for them `sample` is ignored.
pub fn classify(address: &PathAddress, is_dir: bool, sample: &[u8]) -> RenderKind {
    if is_dir {
        return RenderKind::Directory;
    }

    match rule_for(address) {
        Some(Rule::Kind(kind)) => kind,
        Some(Rule::Probe) | None => sniff(sample).unwrap_or_else(|| {
            if looks_like_text(sample) {
                RenderKind::Text
            } else {
                RenderKind::Binary
            }
        }),
    }
}

fn rule_for(address: &PathAddress) -> Option<Rule> {
    let suffixes = address.suffixes();
    if suffixes.is_empty() {
        return None;
    }

    // longest compound suffix first
    for start in 0..suffixes.len() {
        let compound = suffixes[start..].join(".");
        if let Some(rule) = EXTENSION_RULES.get(compound.as_str()) {
            return Some(*rule);
        }
    }

    // inner suffixes, nearest to the end first
    suffixes[..suffixes.len() - 1]
        .iter()
        .rev()
        .find_map(|s| EXTENSION_RULES.get(s.as_str()).copied())
}

/// Magic numbers of the formats we care about.
fn sniff(sample: &[u8]) -> Option<RenderKind> {
    const SIGNATURES: &[(&[u8], RenderKind)] = &[
        (b"\x89PNG\r\n\x1a\n", Image),
        (b"\xFF\xD8\xFF", Image),
        (b"GIF87a", Image),
        (b"GIF89a", Image),
        (b"II*\x00", Image),
        (b"MM\x00*", Image),
        (b"%PDF-", Image),
        (b"PAR1", Table),
        (b"ARROW1", Table),
        (b"PK\x03\x04", Binary),
        (b"\x1F\x8B", Binary),
        (b"\x7FELF", Binary),
        (b"BZh", Binary),
        (b"\xFD7zXZ\x00", Binary),
        (b"7z\xBC\xAF\x27\x1C", Binary),
        (b"\xCF\xFA\xED\xFE", Binary),
        (b"\xFE\xED\xFA\xCE", Binary),
        (b"\x00asm", Binary),
        (b"SQLite format 3\x00", Binary),
    ];

    if let Some((_, kind)) = SIGNATURES.iter().find(|(magic, _)| sample.starts_with(magic)) {
        return Some(*kind);
    }

    // short or common prefixes need a second field to avoid catching plain text
    if sample.len() >= 12 && sample.starts_with(b"RIFF") && &sample[8..12] == b"WEBP" {
        return Some(Image);
    }
    if sample.len() >= 26 && sample.starts_with(b"BM") && sample[6..10] == [0, 0, 0, 0] {
        return Some(Image);
    }
    if sample.len() >= 6 && sample.starts_with(&[0, 0, 1, 0]) && sample[4] > 0 {
        return Some(Image);
    }
    if sample.len() >= 64 && sample.starts_with(b"MZ") {
        return Some(Binary);
    }
    None
}

/// No NUL bytes, valid UTF-8 (a multi-byte char cut by the sample end is fine),
/// and few control characters.
pub fn looks_like_text(sample: &[u8]) -> bool {
    if sample.contains(&0) {
        return false;
    }

    let text = match std::str::from_utf8(sample) {
        Ok(text) => text,
        Err(e) if e.error_len().is_none() => {
            // incomplete sequence at the very end of the sample
            match std::str::from_utf8(&sample[..e.valid_up_to()]) {
                Ok(text) => text,
                Err(_) => return false,
            }
        }
        Err(_) => return false,
    };

    let total = text.chars().count();
    if total == 0 {
        return true;
    }
    let control = text
        .chars()
        .filter(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t' | '\x0c' | '\x1b'))
        .count();
    control * 10 <= total
}

/// Syntax name for highlighting, from the extension or the first line (shebangs).
pub fn detect_language(address: &PathAddress, sample: &[u8]) -> Option<String> {
    let syntaxes = &*SYNTAX_SET;
    let by_name = address
        .extension()
        .and_then(|ext| syntaxes.find_syntax_by_extension(&ext))
        .or_else(|| {
            address
                .name()
                .and_then(|name| syntaxes.find_syntax_by_extension(name))
        });

    let syntax = by_name.or_else(|| {
        let first_line = sample.split(|b| *b == b'\n').next()?;
        let first_line = std::str::from_utf8(first_line).ok()?;
        syntaxes.find_syntax_by_first_line(first_line)
    })?;

    (syntax.name != "Plain Text").then(|| syntax.name.clone())
}

/// Best-effort MIME type for the binary fallback.
pub fn mime_guess(address: &PathAddress, sample: &[u8]) -> String {
    if let Some(mime) = address
        .extension()
        .and_then(|ext| MIME_BY_EXTENSION.get(ext.as_str()))
    {
        return (*mime).to_string();
    }

    let by_magic = match sample {
        [0x89, b'P', b'N', b'G', ..] => Some("image/png"),
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [b'G', b'I', b'F', b'8', ..] => Some("image/gif"),
        [b'%', b'P', b'D', b'F', ..] => Some("application/pdf"),
        [b'P', b'K', 3, 4, ..] => Some("application/zip"),
        [0x1F, 0x8B, ..] => Some("application/gzip"),
        [0x7F, b'E', b'L', b'F', ..] => Some("application/x-executable"),
        [b'P', b'A', b'R', b'1', ..] => Some("application/vnd.apache.parquet"),
        _ => None,
    };
    match by_magic {
        Some(mime) => mime.to_string(),
        None if looks_like_text(sample) => "text/plain".to_string(),
        None => "application/octet-stream".to_string(),
    }
}
