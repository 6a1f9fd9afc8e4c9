//! Filename-based preview classification.
//!
//! Pure lookups over static tables: no I/O and no content sniffing.

use protocol::PreviewKind;

const IMAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
];

const VIDEO_EXTENSIONS: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/mp4"),
    ("webm", "video/webm"),
    ("ogg", "video/ogg"),
    ("ogv", "video/ogg"),
    ("mov", "video/quicktime"),
];

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "text", "md", "markdown", "rst", "adoc", "json", "jsonl", "yaml", "yml", "toml", "ini",
    "cfg", "conf", "env", "csv", "tsv", "xml", "html", "htm", "css", "scss", "py", "pyi", "js",
    "mjs", "cjs", "ts", "tsx", "jsx", "c", "h", "cc", "cpp", "cxx", "hpp", "hh", "go", "rs",
    "java", "kt", "kts", "scala", "rb", "php", "pl", "lua", "swift", "cs", "r", "sql", "sh",
    "bash", "zsh", "fish", "ps1", "bat", "cmake", "gradle", "proto", "graphql", "tex", "diff",
    "patch", "log", "lock",
];

/// Extensionless files commonly holding text.
const TEXT_FILE_NAMES: &[&str] = &[
    "makefile",
    "dockerfile",
    "readme",
    "license",
    "changelog",
    "gemfile",
    "rakefile",
    "procfile",
    ".gitignore",
    ".gitattributes",
    ".dockerignore",
    ".editorconfig",
    ".bashrc",
    ".profile",
];

/// MIME type for bytes served without interpretation.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Lowercased extension of a file name, if any.
fn extension(filename: &str) -> Option<String> {
    let name = filename.rsplit('/').next().unwrap_or(filename);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext.to_ascii_lowercase()),
        _ => None,
    }
}

/// Classify a file name into a preview strategy.
pub fn classify(filename: &str) -> PreviewKind {
    let Some(ext) = extension(filename) else {
        let name = filename.rsplit('/').next().unwrap_or(filename).to_ascii_lowercase();
        if TEXT_FILE_NAMES.contains(&name.as_str()) {
            return PreviewKind::Text;
        }
        return PreviewKind::Unsupported;
    };

    if IMAGE_EXTENSIONS.iter().any(|(e, _)| *e == ext) {
        PreviewKind::Image
    } else if VIDEO_EXTENSIONS.iter().any(|(e, _)| *e == ext) {
        PreviewKind::Video
    } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        PreviewKind::Text
    } else if ext == "ply" {
        PreviewKind::Mesh
    } else {
        PreviewKind::Unsupported
    }
}

/// MIME type used when serving the raw bytes of a file.
pub fn content_type(filename: &str) -> &'static str {
    let Some(ext) = extension(filename) else {
        return match classify(filename) {
            PreviewKind::Text => "text/plain; charset=utf-8",
            _ => OCTET_STREAM,
        };
    };

    if let Some((_, mime)) = IMAGE_EXTENSIONS
        .iter()
        .chain(VIDEO_EXTENSIONS)
        .find(|(e, _)| *e == ext)
    {
        return mime;
    }

    // Markup and scripts go out as plain text so browsers never execute them.
    match ext.as_str() {
        "json" => "application/json",
        _ if TEXT_EXTENSIONS.contains(&ext.as_str()) => "text/plain; charset=utf-8",
        _ => OCTET_STREAM,
    }
}
