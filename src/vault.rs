//! Read-only adapter over a directory of markdown notes.
//!
//! Each `*.md` file is one note: the id is the file stem, the title is the
//! first non-blank line with leading `#` markers stripped (falling back to
//! the id), and the content is the whole file.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::AppError;
use crate::ingest::NoteSource;

/// Load every `*.md` file directly under `dir`, sorted by id.
///
/// Subdirectories are not descended into. Files that are not valid UTF-8 are
/// skipped with a warning.
pub fn scan(dir: &Path) -> Result<Vec<NoteSource>, AppError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| AppError::Config(format!("vault: cannot read {}: {e}", dir.display())))?;

    let mut notes = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let bytes = fs::read(&path)?;
        let Ok(content) = String::from_utf8(bytes) else {
            warn!(path = %path.display(), "vault: skipping non-UTF-8 note");
            continue;
        };

        let title = title_from_content(&content).unwrap_or(id).to_string();
        debug!(id, title = %title, "vault: note loaded");
        notes.push(NoteSource {
            id: id.to_string(),
            title,
            content,
        });
    }

    notes.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(notes)
}

/// First non-blank line with any leading `#` heading markers removed.
pub fn title_from_content(content: &str) -> Option<&str> {
    content
        .lines()
        .map(|line| line.trim_start_matches('#').trim())
        .find(|line| !line.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn title_strips_heading_markers() {
        assert_eq!(title_from_content("# Apple\nbody"), Some("Apple"));
        assert_eq!(title_from_content("\n\n## Deep Title  \n"), Some("Deep Title"));
        assert_eq!(title_from_content("plain first line"), Some("plain first line"));
        assert_eq!(title_from_content("  \n#\n"), None);
    }

    #[test]
    fn scan_reads_markdown_only_and_sorts() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(temp.path().join("zeta.md"), "# Zeta\n").expect("write");
        fs::write(temp.path().join("alpha.md"), "").expect("write");
        fs::write(temp.path().join("notes.txt"), "ignored").expect("write");
        fs::create_dir(temp.path().join("sub.md")).expect("mkdir");

        let notes = scan(temp.path()).expect("scan");
        let ids: Vec<_> = notes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
        assert_eq!(notes[0].title, "alpha");
        assert_eq!(notes[1].title, "Zeta");
    }

    #[test]
    fn scan_missing_dir_is_config_error() {
        let temp = TempDir::new().expect("tempdir");
        let err = scan(&temp.path().join("absent")).expect_err("missing dir");
        assert!(matches!(err, AppError::Config(_)));
    }
}
