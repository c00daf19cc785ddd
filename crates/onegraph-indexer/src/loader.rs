//! Raw corpus loading.
//!
//! Walks a raw directory, admits only the allowed extensions, decodes
//! each file through a fixed sequence of encodings and normalises line
//! endings. Traversal order is sorted by full path; this order is part of
//! the contract because chunk ids for colliding inputs depend on it.

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use onegraph_domain::constants::is_allowed_extension;
use onegraph_domain::error::Result;

/// One decoded source file.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Path relative to the raw root, `/`-separated.
    pub rel_path: String,
    /// Lowercase extension with leading dot, e.g. `.bsl`.
    pub extension: String,
    /// Decoded content with `\n` line endings.
    pub content: String,
}

/// Load every admissible file under `root`, sorted by full path.
///
/// A missing root yields an empty list with a warning; unreadable files
/// fail the load.
///
/// # Errors
///
/// Returns [`onegraph_domain::Error::Io`] when a file cannot be read.
pub fn load_documents(root: &Path) -> Result<Vec<LoadedDocument>> {
    let mut documents = Vec::new();
    if !root.exists() {
        warn!(event = "raw_dir_missing", path = %root.display());
        return Ok(documents);
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();
    paths.sort();

    for path in paths {
        let Some(extension) = normalized_extension(&path) else {
            continue;
        };
        if !is_allowed_extension(&extension) {
            continue;
        }
        let bytes = std::fs::read(&path)?;
        let content = decode_content(&bytes, &path);
        let rel_path = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        documents.push(LoadedDocument {
            path,
            rel_path,
            extension,
            content,
        });
    }
    Ok(documents)
}

/// Lowercase `.ext` of a path, when present.
fn normalized_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
}

/// Decode file bytes through the fixed encoding sequence.
///
/// utf-8, cp1251/windows-1251, utf-16, then latin-1 which accepts any
/// byte sequence; the lossy utf-8 fallback therefore only guards the
/// degenerate case. Line endings are normalised to `\n`.
fn decode_content(bytes: &[u8], path: &Path) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return normalize_newlines(text);
    }

    let (text, _, had_errors) = encoding_rs::WINDOWS_1251.decode(bytes);
    if !had_errors {
        return normalize_newlines(&text);
    }

    if let Some(text) = decode_utf16(bytes) {
        return normalize_newlines(&text);
    }

    warn!(
        event = "encoding_fallback",
        path = %path.display(),
        encoding = "latin-1",
    );
    // latin-1 maps every byte to the same code point; it cannot fail.
    let text: String = bytes.iter().map(|&b| char::from(b)).collect();
    normalize_newlines(&text)
}

/// Strict utf-16 decode honouring an optional BOM, little-endian default.
fn decode_utf16(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let encoding = match bytes {
        [0xFE, 0xFF, ..] => encoding_rs::UTF_16BE,
        _ => encoding_rs::UTF_16LE,
    };
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors { None } else { Some(text.into_owned()) }
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_sorted_and_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("Catalogs/Contacts")).unwrap();
        std::fs::write(root.join("Catalogs/Contacts/ObjectModule.bsl"), "a").unwrap();
        std::fs::write(root.join("readme.txt"), "b").unwrap();
        std::fs::write(root.join("image.png"), [0u8, 1, 2]).unwrap();

        let docs = load_documents(root).unwrap();
        let rels: Vec<&str> = docs.iter().map(|d| d.rel_path.as_str()).collect();
        assert_eq!(rels, ["Catalogs/Contacts/ObjectModule.bsl", "readme.txt"]);
        assert_eq!(docs[0].extension, ".bsl");
    }

    #[test]
    fn decodes_cp1251() {
        let dir = tempfile::tempdir().unwrap();
        // "Процедура" in cp1251
        let bytes: Vec<u8> = vec![0xCF, 0xF0, 0xEE, 0xF6, 0xE5, 0xE4, 0xF3, 0xF0, 0xE0];
        std::fs::write(dir.path().join("m.bsl"), &bytes).unwrap();
        let docs = load_documents(dir.path()).unwrap();
        assert_eq!(docs[0].content, "Процедура");
    }

    #[test]
    fn decodes_utf16le() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "Тест".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        std::fs::write(dir.path().join("m.txt"), &bytes).unwrap();
        let docs = load_documents(dir.path()).unwrap();
        // BOM is sniffed and removed by the decoder.
        assert_eq!(docs[0].content, "Тест");
    }

    #[test]
    fn normalises_line_endings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("m.txt"), "a\r\nb\rc\n").unwrap();
        let docs = load_documents(dir.path()).unwrap();
        assert_eq!(docs[0].content, "a\nb\nc\n");
    }

    #[test]
    fn missing_root_yields_empty() {
        let docs = load_documents(Path::new("/nonexistent/raw/dir")).unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn uppercase_extensions_are_admitted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("M.BSL"), "x").unwrap();
        let docs = load_documents(dir.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].extension, ".bsl");
    }
}
