use std::path::PathBuf;

use thiserror::Error;

use crate::config::ProtectionScheme;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("credential must not be empty")]
    EmptyCredential,
    #[error("no protection available for scheme {0}")]
    UnsupportedScheme(ProtectionScheme),
    #[error("protection failed: {0}")]
    Protection(String),
    #[error("user secret store: {0}")]
    UserStore(String),
    #[error("ipc error: {0}")]
    Ipc(String),
}

impl CoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
