use std::path::{Path, PathBuf};
use anyhow::{anyhow, Result};
use directories::ProjectDirs;

/// Name of the config file looked up in the working directory.
pub const CONFIG_FILE: &str = "lockstep.toml";

/// Normalizes a manifest path to its canonical forward-slash form.
///
/// Backslashes become `/`, empty and `.` segments are dropped, and a leading
/// `/` is stripped. Returns `None` for paths that are empty after normalization
/// or that contain a `..` segment, since those cannot stay inside the root.
pub fn normalize_relative_path(raw: &str) -> Option<String> {
    let replaced = raw.replace('\\', "/");
    let mut segments = Vec::new();
    for segment in replaced.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        return None;
    }
    // drive-qualified paths ("C:/...") are absolute on Windows
    if segments[0].ends_with(':') {
        return None;
    }
    Some(segments.join("/"))
}

/// Joins a normalized relative path onto the root, one component at a time.
pub fn resolve_in_root(root: &Path, relative_path: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for segment in relative_path.split('/').filter(|s| !s.is_empty()) {
        path.push(segment);
    }
    path
}

/// Builds the download URL for a file: `base` followed by `relative_path`,
/// inserting a single `/` only when `base` does not already end with one.
pub fn join_url(base: &str, relative_path: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, relative_path)
    } else {
        format!("{}/{}", base, relative_path)
    }
}

/// Returns the platform data directory used for default install roots.
pub fn get_global_data_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("org", "lockstep", "lockstep")
        .ok_or_else(|| anyhow!("Could not get project directories"))?;
    Ok(proj_dirs.data_dir().to_path_buf())
}

/// Returns the path to `lockstep.toml` in the current working directory.
pub fn get_config_file() -> Result<PathBuf> {
    Ok(std::env::current_dir()?.join(CONFIG_FILE))
}
