use std::fs;

use camino::Utf8Path;
use tempfile::NamedTempFile;

use crate::error::HarvestError;

pub const MAX_FILENAME_CHARS: usize = 60;

const TEMP_PREFIX: &str = ".jacow-";
const TEMP_SUFFIX: &str = ".part";

const RESERVED: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*', '\r', '\n'];

/// Turns a display name into a single safe path component.
///
/// Names of the form `"<id> - <title>"` that run past `max_chars` keep the id
/// and lose the tail of the title, cut at a word boundary.
pub fn safe_filename(name: &str, max_chars: usize) -> String {
    let replaced: String = name
        .chars()
        .map(|ch| if RESERVED.contains(&ch) { '_' } else { ch })
        .collect();
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut cleaned = trim_edges(&collapsed).to_string();

    if cleaned.chars().count() > max_chars {
        cleaned = match cleaned.split_once(" - ") {
            Some((id, title)) => {
                let budget = max_chars as isize - id.chars().count() as isize - 3;
                if budget > 5 {
                    let cut = cut_at_word(title, budget as usize);
                    format!("{id} - {cut}")
                } else {
                    cut_at_word(id, max_chars)
                }
            }
            None => cut_at_word(&cleaned, max_chars),
        };
        cleaned = trim_edges(&cleaned).to_string();
    }

    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

fn trim_edges(value: &str) -> &str {
    value.trim_matches(|ch| matches!(ch, ' ' | '.' | '_'))
}

fn cut_at_word(value: &str, max_chars: usize) -> String {
    let head: String = value.chars().take(max_chars).collect();
    match head.rsplit_once(' ') {
        Some((before, _)) if !before.is_empty() => before.to_string(),
        _ => head,
    }
}

/// Temp file next to `dir`'s eventual contents, so the final rename never
/// crosses filesystems. The name never collides with a real export.
pub fn temp_file_in(dir: &Utf8Path) -> Result<NamedTempFile, HarvestError> {
    fs::create_dir_all(dir.as_std_path())
        .map_err(|err| HarvestError::Filesystem(format!("create {dir}: {err}")))?;
    tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir.as_std_path())
        .map_err(|err| HarvestError::Filesystem(format!("temp file in {dir}: {err}")))
}

/// Deletes temp files an interrupted run left in `dir`, and below it when
/// `recursive`. Returns how many were removed.
pub fn remove_stale_temp_files(dir: &Utf8Path, recursive: bool) -> Result<usize, HarvestError> {
    let entries = match fs::read_dir(dir.as_std_path()) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(HarvestError::Filesystem(format!("read {dir}: {err}"))),
    };
    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|err| HarvestError::Filesystem(format!("read {dir}: {err}")))?;
        let file_type = entry
            .file_type()
            .map_err(|err| HarvestError::Filesystem(format!("read {dir}: {err}")))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let path = dir.join(name);
        if file_type.is_dir() {
            if recursive {
                removed += remove_stale_temp_files(&path, true)?;
            }
        } else if name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX) {
            fs::remove_file(path.as_std_path())
                .map_err(|err| HarvestError::Filesystem(format!("remove {path}: {err}")))?;
            removed += 1;
        }
    }
    Ok(removed)
}

pub fn persist_temp(temp: NamedTempFile, dest: &Utf8Path) -> Result<(), HarvestError> {
    temp.persist(dest.as_std_path())
        .map_err(|err| HarvestError::Filesystem(format!("persist {dest}: {}", err.error)))?;
    Ok(())
}

pub fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), HarvestError> {
    let parent = path
        .parent()
        .ok_or_else(|| HarvestError::Filesystem(format!("invalid destination path {path}")))?;
    let temp = temp_file_in(parent)?;
    fs::write(temp.path(), content)
        .map_err(|err| HarvestError::Filesystem(format!("write {path}: {err}")))?;
    persist_temp(temp, path)
}
