//! Locating host executables.

use std::path::{Path, PathBuf};

/// Resolve an executable by name.
///
/// Absolute paths are accepted as-is when they point at a file; bare names
/// are looked up on `PATH` off the async runtime.
pub async fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.is_absolute() {
        return path.is_file().then(|| path.to_path_buf());
    }

    which_async(executable).await
}

async fn which_async(executable: &str) -> Option<PathBuf> {
    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(Result::ok)
}
