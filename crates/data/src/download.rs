use crate::errors::{DataError, Result};
use log::{debug, info};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Return `path` if it already exists, otherwise download `url` content to `path`.
///
/// Parent directories are created as needed. The download is written to a sibling `.part`
/// file then renamed into place.
pub fn fetch_cached(path: impl AsRef<Path>, url: Option<&str>) -> Result<PathBuf> {
    let path = path.as_ref();
    if path.exists() {
        info!("Using cached dataset {}", path.display());
        return Ok(path.to_path_buf());
    }
    let url = url.ok_or_else(|| DataError::MissingSource(path.to_path_buf()))?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    info!("Downloading {url} to {}", path.display());
    let now = Instant::now();
    let response = reqwest::blocking::get(url)?.error_for_status()?;
    let bytes = response.bytes()?;

    let mut part = OsString::from(path.as_os_str());
    part.push(".part");
    let part = PathBuf::from(part);
    fs::write(&part, &bytes)?;
    fs::rename(&part, path)?;
    debug!(
        "Downloaded {} bytes in {} ms",
        bytes.len(),
        now.elapsed().as_millis()
    );
    Ok(path.to_path_buf())
}
