use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use loginguards_core::{ConfigDocument, CoreError, CredentialStore, MachinePaths, PolicyConfiguration};
use policy_engine::PolicySnapshot;

pub type ConfigDigest = Option<[u8; 32]>;

/// Hash of the raw configuration bytes; `None` when the file is absent.
pub fn config_digest(path: &Path) -> Result<ConfigDigest, CoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(Sha256::digest(&bytes).into())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(CoreError::io(path, err)),
    }
}

/// Reads configuration and credential into a fresh snapshot.
///
/// An unreadable credential leaves the snapshot without one, which the
/// engine answers as `no_credential`.
pub fn load_snapshot(paths: &MachinePaths) -> Result<PolicySnapshot, CoreError> {
    let document = ConfigDocument::load(&paths.config_path)?;
    let config = PolicyConfiguration::from_document(&document);
    let credential = match CredentialStore::for_service(paths).load() {
        Ok(credential) => credential,
        Err(err) => {
            warn!(error = %err, "stored API credential is unusable");
            None
        }
    };
    if credential.is_none() {
        warn!("no API credential configured; decisions follow the fail mode");
    }
    Ok(PolicySnapshot { config, credential })
}

/// The snapshot to start serving with. A broken configuration falls back to
/// the defaults, which fail closed.
pub fn initial_snapshot(paths: &MachinePaths) -> (PolicySnapshot, ConfigDigest) {
    let digest = config_digest(&paths.config_path).unwrap_or_else(|err| {
        warn!(error = %err, "cannot read configuration");
        None
    });
    match load_snapshot(paths) {
        Ok(snapshot) => (snapshot, digest),
        Err(err) => {
            warn!(error = %err, "invalid configuration; serving with defaults");
            (PolicySnapshot::default(), digest)
        }
    }
}

/// Polls the configuration file and publishes a new snapshot whenever its
/// contents change. A file that fails to load keeps the previous snapshot.
pub async fn watch_config(
    paths: MachinePaths,
    snapshots: watch::Sender<Arc<PolicySnapshot>>,
    mut digest: ConfigDigest,
    shutdown: CancellationToken,
) {
    loop {
        let interval = snapshots.borrow().config.reload_interval;
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        let current = match config_digest(&paths.config_path) {
            Ok(current) => current,
            Err(err) => {
                warn!(error = %err, "cannot read configuration");
                continue;
            }
        };
        if current == digest {
            continue;
        }

        match load_snapshot(&paths) {
            Ok(snapshot) => {
                let previous = snapshots.borrow().config.pipe_endpoint.clone();
                if previous != snapshot.config.pipe_endpoint {
                    warn!(
                        configured = %snapshot.config.pipe_endpoint,
                        serving = %previous,
                        "pipe endpoint changed; restart the service to apply it"
                    );
                }
                info!(
                    fail_mode = %snapshot.config.fail_mode,
                    credential = snapshot.credential.is_some(),
                    "configuration reloaded"
                );
                snapshots.send_replace(Arc::new(snapshot));
                digest = current;
            }
            Err(err) => {
                debug!(error = %err, "configuration reload failed");
                warn!("configuration changed but could not be loaded; keeping the previous settings");
                digest = current;
            }
        }
    }
}
