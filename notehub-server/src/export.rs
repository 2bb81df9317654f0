//! Zip export of a user's notes

use notehub_common::models::Note;
use notehub_common::{Error, Result};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use zip::{write::FileOptions, ZipWriter};

/// Archive file name for an export
pub const EXPORT_FILE_NAME: &str = "notehub_export.zip";

/// `<title>.md`, path separators replaced; repeated titles get the first
/// free ` (n)` suffix, so a numbered name never shadows a real title
fn entry_names<'a>(titles: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut issued: HashSet<String> = HashSet::new();
    titles
        .map(|title| {
            let base: String = title
                .trim()
                .chars()
                .map(|c| if matches!(c, '/' | '\\') { '-' } else { c })
                .collect();
            let base = if base.is_empty() {
                notehub_common::markdown::UNTITLED.to_string()
            } else {
                base
            };

            let mut name = format!("{}.md", base);
            let mut n = 1;
            while issued.contains(&name) {
                name = format!("{} ({}).md", base, n);
                n += 1;
            }
            issued.insert(name.clone());
            name
        })
        .collect()
}

/// Zip every note's markdown
pub fn export_archive(notes: &[Note]) -> Result<Vec<u8>> {
    let names = entry_names(notes.iter().map(|n| n.title.as_str()));
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for (note, name) in notes.iter().zip(names) {
        let options = FileOptions::<zip::write::ExtendedFileOptions>::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o644);
        zip.start_file(name, options)
            .map_err(|e| Error::Internal(format!("Failed to add note to export: {}", e)))?;
        zip.write_all(note.content.as_bytes())?;
    }

    let cursor = zip
        .finish()
        .map_err(|e| Error::Internal(format!("Failed to finish export: {}", e)))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_duplicate_titles_are_numbered() {
        let names = entry_names(["Plan", "Plan", "a/b", "", "Plan"].into_iter());
        assert_eq!(
            names,
            vec!["Plan.md", "Plan (1).md", "a-b.md", "Untitled.md", "Plan (2).md"]
        );

        // A real title that looks like a numbered one is skipped over
        let names = entry_names(["Plan", "Plan", "Plan (1)", "Plan"].into_iter());
        assert_eq!(
            names,
            vec!["Plan.md", "Plan (1).md", "Plan (1) (1).md", "Plan (2).md"]
        );
    }

    #[test]
    fn test_archive_holds_contents() {
        use chrono::Utc;
        use notehub_common::models::Permission;
        use uuid::Uuid;

        let note = |title: &str, content: &str| Note {
            id: Uuid::new_v4(),
            shortid: "shortid000".to_string(),
            alias: None,
            title: title.to_string(),
            content: content.to_string(),
            permission: Permission::Private,
            owner_id: None,
            last_change_user_id: None,
            viewcount: 0,
            tag_id_list: Vec::new(),
            authorship: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_change_at: None,
        };

        let bytes = export_archive(&[note("One", "# One\nfirst"), note("One", "second")]).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut text = String::new();
        archive
            .by_name("One (1).md")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "second");
    }
}
