//! Static registry of the formats Pandoc may read and write.
//!
//! Lookups are case-insensitive and ignore Pandoc extension modifiers, so
//! `GFM+emoji` validates as `gfm`. Anything not in the tables is rejected.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Formats accepted as conversion input.
pub const INPUT_FORMATS: &[&str] = &[
    "commonmark",
    "creole",
    "csv",
    "docbook",
    "docx",
    "epub",
    "fb2",
    "gfm",
    "haddock",
    "html",
    "ipynb",
    "jats",
    "json",
    "latex",
    "man",
    "markdown",
    "markdown_mmd",
    "markdown_phpextra",
    "markdown_strict",
    "mediawiki",
    "muse",
    "native",
    "odt",
    "opml",
    "org",
    "rst",
    "rtf",
    "t2t",
    "textile",
    "tikiwiki",
    "twiki",
    "vimwiki",
];

/// Formats accepted as conversion output.
pub const OUTPUT_FORMATS: &[&str] = &[
    "asciidoc",
    "beamer",
    "commonmark",
    "context",
    "docbook",
    "docx",
    "dokuwiki",
    "epub",
    "fb2",
    "gfm",
    "haddock",
    "html",
    "html5",
    "icml",
    "ipynb",
    "jats",
    "json",
    "latex",
    "man",
    "markdown",
    "markdown_mmd",
    "markdown_phpextra",
    "markdown_strict",
    "mediawiki",
    "ms",
    "muse",
    "native",
    "odt",
    "opendocument",
    "opml",
    "org",
    "pdf",
    "plain",
    "pptx",
    "rst",
    "rtf",
    "texinfo",
    "textile",
    "slideous",
    "slidy",
    "dzslides",
    "revealjs",
    "s5",
    "zimwiki",
];

/// Formats whose output is a binary container rather than text.
const BINARY_FORMATS: &[&str] = &["pdf", "docx", "odt", "epub", "pptx"];

const CONTENT_TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("html5", "text/html"),
    ("latex", "application/x-latex"),
    ("pdf", "application/pdf"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("odt", "application/vnd.oasis.opendocument.text"),
    ("epub", "application/epub+zip"),
    (
        "pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    ("markdown", "text/markdown"),
    ("gfm", "text/markdown"),
    ("commonmark", "text/markdown"),
    ("plain", "text/plain"),
    ("rst", "text/x-rst"),
    ("asciidoc", "text/asciidoc"),
    ("json", "application/json"),
    ("native", "application/json"),
    ("org", "text/org"),
    ("rtf", "application/rtf"),
    ("man", "application/x-troff-man"),
    ("docbook", "application/xml"),
    ("jats", "application/xml"),
    ("opml", "application/xml"),
];

/// File extension used for temp files and download names, by format.
const FORMAT_EXTENSIONS: &[(&str, &str)] = &[
    ("markdown", "md"),
    ("markdown_mmd", "md"),
    ("markdown_phpextra", "md"),
    ("markdown_strict", "md"),
    ("gfm", "md"),
    ("commonmark", "md"),
    ("html5", "html"),
    ("latex", "tex"),
    ("beamer", "tex"),
    ("plain", "txt"),
    ("asciidoc", "adoc"),
    ("docbook", "xml"),
    ("jats", "xml"),
    ("opendocument", "xml"),
    ("mediawiki", "wiki"),
    ("dokuwiki", "wiki"),
    ("zimwiki", "wiki"),
    ("revealjs", "html"),
    ("slidy", "html"),
    ("slideous", "html"),
    ("dzslides", "html"),
    ("s5", "html"),
    ("texinfo", "texi"),
    ("context", "tex"),
    ("native", "hs"),
];

/// Input format implied by a file extension.
const EXTENSION_FORMATS: &[(&str, &str)] = &[
    ("md", "markdown"),
    ("markdown", "markdown"),
    ("html", "html"),
    ("htm", "html"),
    ("tex", "latex"),
    ("latex", "latex"),
    ("docx", "docx"),
    ("odt", "odt"),
    ("epub", "epub"),
    ("rst", "rst"),
    ("txt", "markdown"),
    ("json", "json"),
    ("xml", "docbook"),
    ("org", "org"),
    ("rtf", "rtf"),
    ("ipynb", "ipynb"),
    ("textile", "textile"),
    ("csv", "csv"),
    ("opml", "opml"),
    ("fb2", "fb2"),
];

/// Input and output format lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FormatLists {
    pub input: Vec<String>,
    pub output: Vec<String>,
}

/// Content metadata derived from a format identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatMetadata {
    pub content_type: &'static str,
    pub is_binary: bool,
    pub extension: &'static str,
}

/// Lower-case a format identifier and strip Pandoc extension modifiers.
///
/// `gfm+emoji-smart` becomes `gfm`. A leading `+` or `-` is kept so that it
/// fails lookup instead of resolving to an empty name.
pub fn base_name(format: &str) -> String {
    let format = format.trim().to_ascii_lowercase();
    match format.char_indices().find(|&(i, c)| i > 0 && (c == '+' || c == '-')) {
        Some((i, _)) => format[..i].to_string(),
        None => format,
    }
}

/// Canonical form passed to Pandoc: trimmed and lower-cased, modifiers kept.
pub fn normalize(format: &str) -> String {
    format.trim().to_ascii_lowercase()
}

pub fn is_supported_input(format: &str) -> bool {
    INPUT_FORMATS.contains(&base_name(format).as_str())
}

pub fn is_supported_output(format: &str) -> bool {
    OUTPUT_FORMATS.contains(&base_name(format).as_str())
}

pub fn list_formats() -> FormatLists {
    FormatLists {
        input: INPUT_FORMATS.iter().map(|f| f.to_string()).collect(),
        output: OUTPUT_FORMATS.iter().map(|f| f.to_string()).collect(),
    }
}

/// Content type, binary flag, and file extension for a format.
///
/// Unknown formats fall back to `application/octet-stream`, text, and an
/// extension equal to the format's base name.
pub fn metadata_for(format: &str) -> FormatMetadata {
    let base = base_name(format);
    let content_type = lookup(CONTENT_TYPES, &base).unwrap_or("application/octet-stream");
    let is_binary = BINARY_FORMATS.contains(&base.as_str());
    let extension = lookup(FORMAT_EXTENSIONS, &base)
        .or_else(|| known_name(&base))
        .unwrap_or("bin");
    FormatMetadata {
        content_type,
        is_binary,
        extension,
    }
}

/// Infer an input format from a file name's extension.
///
/// Returns `None` when the name has no extension or the extension is not in
/// the table.
pub fn format_from_filename(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    lookup(EXTENSION_FORMATS, &ext)
}

/// Best-effort input format detection from leading bytes.
///
/// Only formats with an unambiguous signature are recognized; plain text
/// (including Markdown) yields `None`.
pub fn sniff_format(content: &[u8]) -> Option<&'static str> {
    if content.starts_with(b"PK\x03\x04") {
        return sniff_zip(content);
    }

    let head = &content[..content.len().min(1024)];
    let head = String::from_utf8_lossy(head);
    let head = head.trim_start_matches('\u{feff}').trim_start();
    let lower = head.to_ascii_lowercase();

    if head.starts_with("{\\rtf") {
        Some("rtf")
    } else if lower.starts_with("<!doctype html") || lower.starts_with("<html") {
        Some("html")
    } else if head.starts_with('{') && head.contains("\"pandoc-api-version\"") {
        Some("json")
    } else if head.starts_with("\\documentclass") {
        Some("latex")
    } else if lower.starts_with("<?xml") && lower.contains("docbook") {
        Some("docbook")
    } else {
        None
    }
}

fn sniff_zip(content: &[u8]) -> Option<&'static str> {
    let window = &content[..content.len().min(64 * 1024)];
    if contains(window, b"mimetypeapplication/epub+zip") {
        Some("epub")
    } else if contains(window, b"mimetypeapplication/vnd.oasis.opendocument.text") {
        Some("odt")
    } else if contains(window, b"word/") {
        Some("docx")
    } else {
        None
    }
}

/// Every input format mapped to the output formats it can be converted to.
pub fn conversion_matrix() -> BTreeMap<String, Vec<String>> {
    let outputs: Vec<String> = OUTPUT_FORMATS.iter().map(|f| f.to_string()).collect();
    INPUT_FORMATS
        .iter()
        .map(|input| (input.to_string(), outputs.clone()))
        .collect()
}

/// Pandoc writer arguments for a target format.
///
/// PDF has no writer of its own; Pandoc picks the PDF pipeline from the
/// `.pdf` output path.
pub fn writer_args(target: &str) -> Vec<String> {
    if base_name(target) == "pdf" {
        Vec::new()
    } else {
        vec!["-t".to_string(), normalize(target)]
    }
}

fn lookup(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

fn known_name(base: &str) -> Option<&'static str> {
    INPUT_FORMATS
        .iter()
        .chain(OUTPUT_FORMATS.iter())
        .find(|f| **f == base)
        .copied()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
