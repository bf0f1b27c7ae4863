//! Tar packing for files copied into containers

use crate::error::{DbdockError, Result};
use chrono::Utc;

/// File name used when the URL has no usable last path segment
const DEFAULT_FILE_NAME: &str = "download";

/// Path inside the container, relative to `/`, that a download from `url`
/// lands at when `dest` is the target directory
pub(crate) fn download_path(dest: &str, url: &reqwest::Url) -> Result<String> {
    let file = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or(DEFAULT_FILE_NAME);

    let dir = dest.trim_matches('/');
    if dir.split('/').any(|part| part == "..") {
        return Err(DbdockError::InvalidArgument(format!(
            "destination '{}' must not contain '..'",
            dest
        )));
    }

    if dir.is_empty() {
        Ok(file.to_string())
    } else {
        Ok(format!("{}/{}", dir, file))
    }
}

/// Build an in-memory tar archive holding one regular file
pub(crate) fn single_file(path: &str, contents: &[u8]) -> Result<Vec<u8>> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(Utc::now().timestamp().max(0) as u64);

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, path, contents)?;
    Ok(builder.into_inner()?)
}
