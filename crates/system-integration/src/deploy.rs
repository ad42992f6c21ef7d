use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::IntegrationError;

pub const FILTER_BINARY: &str = "LoginGuardsPwdFilter.dll";

/// Where a bundled filter binary lives relative to the installer executable.
pub fn bundled_binary_beside_current_exe() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    Some(exe.parent()?.join("native").join(FILTER_BINARY))
}

/// Picks the binary to deploy. An explicit path is used as given and must
/// exist; otherwise the bundled copy is used when present.
pub fn locate_binary(
    explicit: Option<&Path>,
    bundled: Option<&Path>,
) -> Result<Option<PathBuf>, IntegrationError> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(IntegrationError::BinaryNotFound(path.to_path_buf()));
        }
        return Ok(Some(path.to_path_buf()));
    }
    Ok(bundled.filter(|path| path.is_file()).map(Path::to_path_buf))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyResult {
    Copied,
    AlreadyCurrent,
}

/// Copies `source` to `target`, overwriting a stale copy. An identical copy
/// is left alone, which matters once LSA has the file loaded and locked.
pub fn deploy_binary(source: &Path, target: &Path) -> Result<CopyResult, IntegrationError> {
    let wanted = fs::read(source).map_err(|err| IntegrationError::io(source, err))?;
    match fs::read(target) {
        Ok(existing) if existing == wanted => return Ok(CopyResult::AlreadyCurrent),
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(IntegrationError::io(target, err)),
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|err| IntegrationError::io(parent, err))?;
    }
    fs::write(target, &wanted).map_err(|err| IntegrationError::io(target, err))?;
    info!(from = %source.display(), to = %target.display(), "deployed password filter binary");
    Ok(CopyResult::Copied)
}

#[derive(Debug, PartialEq, Eq)]
pub enum RemoveResult {
    Removed,
    Absent,
    /// Still held open, typically by LSA until the next reboot.
    Locked(String),
}

pub fn remove_binary(target: &Path) -> RemoveResult {
    match fs::remove_file(target) {
        Ok(()) => {
            info!(path = %target.display(), "removed password filter binary");
            RemoveResult::Removed
        }
        Err(err) if err.kind() == ErrorKind::NotFound => RemoveResult::Absent,
        Err(err) => {
            warn!(path = %target.display(), error = %err, "could not remove password filter binary");
            RemoveResult::Locked(err.to_string())
        }
    }
}
