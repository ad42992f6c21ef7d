use std::path::PathBuf;

use thiserror::Error;

use loginguards_core::CoreError;

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("administrator privileges required; run from an elevated prompt")]
    InsufficientPrivilege,
    #[error("this operation is only supported on Windows")]
    UnsupportedPlatform,
    #[error("service control: {0}")]
    Service(String),
    #[error("registry: {0}")]
    Registry(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("password filter binary not found at {}", .0.display())]
    BinaryNotFound(PathBuf),
    #[error("reboot: {0}")]
    Reboot(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl IntegrationError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
