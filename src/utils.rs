use anyhow::{Context, Result};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use url::Url;

/// Resolve `--output`: an existing directory (or a path ending in a
/// separator) receives a file named after the URL, anything else is the file.
pub fn resolve_destination(output: &Path, url: &str) -> Result<PathBuf> {
    let names_directory = output.is_dir() || output.to_string_lossy().ends_with(MAIN_SEPARATOR);
    if !names_directory {
        return Ok(output.to_path_buf());
    }

    let url = Url::parse(url).with_context(|| format!("invalid URL {:?}", url))?;
    Ok(output.join(file_name_for(&url)))
}

/// Last non-empty path segment with anything outside `[A-Za-z0-9._-]`
/// replaced, or a random `slicedl-<uuid>` name when the path has none.
fn file_name_for(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
                .collect::<String>()
        });

    match segment {
        Some(name) if name.chars().any(|c| c != '.') => name,
        _ => format!("slicedl-{}", uuid::Uuid::new_v4()),
    }
}
