use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, warn};

use crate::config::{ConfigDocument, EncryptedBlob, MachinePaths};
use crate::error::CoreError;
use crate::protection::{MachineKeyProtection, MachineProtection};
use crate::secret::SecretString;
use crate::user_store::{KeyringStore, NoUserStore, UserSecretStore};

/// Durable, at-rest-encrypted storage of the single API credential.
///
/// The canonical copy is the `apiKeyEnc` blob in the machine configuration
/// document. The user-scoped mirror is best effort.
pub struct CredentialStore {
    config_path: PathBuf,
    protections: Vec<Box<dyn MachineProtection>>,
    user_store: Box<dyn UserSecretStore>,
}

impl CredentialStore {
    /// `protections` are tried in order on save; on load the one matching the
    /// blob's scheme tag is used.
    pub fn new(
        config_path: PathBuf,
        protections: Vec<Box<dyn MachineProtection>>,
        user_store: Box<dyn UserSecretStore>,
    ) -> Self {
        Self {
            config_path,
            protections,
            user_store,
        }
    }

    /// The store used by the installer and the CLI: DPAPI first where available,
    /// then the machine key, with the OS keyring as the user mirror.
    pub fn for_machine(paths: &MachinePaths) -> Self {
        Self::new(
            paths.config_path.clone(),
            default_protections(paths),
            Box::new(KeyringStore::new()),
        )
    }

    /// Same protections without the user mirror; what the service uses.
    pub fn for_service(paths: &MachinePaths) -> Self {
        Self::new(
            paths.config_path.clone(),
            default_protections(paths),
            Box::new(NoUserStore),
        )
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn save(&self, credential: &SecretString) -> Result<(), CoreError> {
        if credential.is_blank() {
            return Err(CoreError::EmptyCredential);
        }
        let blob = self.protect(credential)?;
        ConfigDocument::update(&self.config_path, |document| {
            document.api_key_enc = Some(blob);
        })?;
        if let Err(err) = self.user_store.set(credential) {
            debug!(error = %err, "user-scoped credential mirror unavailable");
        }
        Ok(())
    }

    /// Prefers the machine blob; falls back to the user mirror only when no blob exists.
    pub fn load(&self) -> Result<Option<SecretString>, CoreError> {
        let document = ConfigDocument::load(&self.config_path)?;
        if let Some(blob) = document.api_key_enc {
            return self.unprotect(&blob).map(Some);
        }
        match self.user_store.get() {
            Ok(value) => Ok(value.filter(|secret| !secret.is_blank())),
            Err(err) => {
                debug!(error = %err, "user-scoped credential mirror unavailable");
                Ok(None)
            }
        }
    }

    pub fn delete(&self) -> Result<(), CoreError> {
        let document = ConfigDocument::load(&self.config_path)?;
        if document.api_key_enc.is_some() {
            ConfigDocument::update(&self.config_path, |document| {
                document.api_key_enc = None;
            })?;
        }
        if let Err(err) = self.user_store.delete() {
            debug!(error = %err, "user-scoped credential mirror unavailable");
        }
        Ok(())
    }

    fn protect(&self, credential: &SecretString) -> Result<EncryptedBlob, CoreError> {
        let mut last_error = None;
        for protection in &self.protections {
            match protection.protect(credential.expose_secret().as_bytes()) {
                Ok(ciphertext) => {
                    return Ok(EncryptedBlob {
                        scheme: protection.scheme(),
                        data: STANDARD.encode(ciphertext),
                    })
                }
                Err(err) => {
                    warn!(scheme = %protection.scheme(), error = %err, "credential protection failed, trying next scheme");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| CoreError::Protection("no protection scheme configured".to_string())))
    }

    fn unprotect(&self, blob: &EncryptedBlob) -> Result<SecretString, CoreError> {
        let protection = self
            .protections
            .iter()
            .find(|protection| protection.scheme() == blob.scheme)
            .ok_or(CoreError::UnsupportedScheme(blob.scheme))?;
        let ciphertext = STANDARD
            .decode(blob.data.trim())
            .map_err(|err| CoreError::Protection(format!("credential blob is not base64: {err}")))?;
        let plaintext = protection.unprotect(&ciphertext)?;
        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| CoreError::Protection("credential is not UTF-8".to_string()))?;
        Ok(SecretString::from(text))
    }
}

fn default_protections(paths: &MachinePaths) -> Vec<Box<dyn MachineProtection>> {
    #[allow(unused_mut)]
    let mut protections: Vec<Box<dyn MachineProtection>> = Vec::new();
    #[cfg(windows)]
    protections.push(Box::new(crate::protection::DpapiProtection));
    protections.push(Box::new(MachineKeyProtection::new(
        paths.machine_key_path.clone(),
    )));
    protections
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::ProtectionScheme;
    use tempfile::TempDir;

    #[derive(Default)]
    struct MemoryUserStore {
        value: Mutex<Option<String>>,
    }

    impl UserSecretStore for MemoryUserStore {
        fn set(&self, secret: &SecretString) -> Result<(), CoreError> {
            *self.value.lock().unwrap() = Some(secret.expose_secret().to_string());
            Ok(())
        }

        fn get(&self) -> Result<Option<SecretString>, CoreError> {
            Ok(self.value.lock().unwrap().clone().map(SecretString::new))
        }

        fn delete(&self) -> Result<(), CoreError> {
            *self.value.lock().unwrap() = None;
            Ok(())
        }
    }

    struct BrokenUserStore;

    impl UserSecretStore for BrokenUserStore {
        fn set(&self, _secret: &SecretString) -> Result<(), CoreError> {
            Err(CoreError::UserStore("no keyring daemon".to_string()))
        }

        fn get(&self) -> Result<Option<SecretString>, CoreError> {
            Err(CoreError::UserStore("no keyring daemon".to_string()))
        }

        fn delete(&self) -> Result<(), CoreError> {
            Err(CoreError::UserStore("no keyring daemon".to_string()))
        }
    }

    struct FailingProtection;

    impl MachineProtection for FailingProtection {
        fn scheme(&self) -> ProtectionScheme {
            ProtectionScheme::DpapiMachine
        }

        fn protect(&self, _plaintext: &[u8]) -> Result<Vec<u8>, CoreError> {
            Err(CoreError::Protection("DPAPI unavailable".to_string()))
        }

        fn unprotect(&self, _blob: &[u8]) -> Result<zeroize::Zeroizing<Vec<u8>>, CoreError> {
            Err(CoreError::Protection("DPAPI unavailable".to_string()))
        }
    }

    fn store_in(temp: &TempDir, user_store: Box<dyn UserSecretStore>) -> CredentialStore {
        let paths = MachinePaths::under(temp.path().to_path_buf());
        CredentialStore::new(
            paths.config_path.clone(),
            vec![Box::new(MachineKeyProtection::new(paths.machine_key_path))],
            user_store,
        )
    }

    #[test]
    fn test_save_then_load_from_another_store_instance() {
        let temp = TempDir::new().unwrap();
        let writer = store_in(&temp, Box::new(MemoryUserStore::default()));
        writer.save(&SecretString::from("lg_live_abc123")).unwrap();

        // A second instance with no user mirror stands in for the service account.
        let reader = store_in(&temp, Box::new(NoUserStore));
        let loaded = reader.load().unwrap().unwrap();
        assert_eq!(loaded.expose_secret(), "lg_live_abc123");
    }

    #[test]
    fn test_plaintext_never_written_to_config() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp, Box::new(NoUserStore));
        store.save(&SecretString::from("lg_live_abc123")).unwrap();

        let contents = std::fs::read_to_string(store.config_path()).unwrap();
        assert!(!contents.contains("lg_live_abc123"));
        let document = ConfigDocument::from_json_str(&contents).unwrap();
        assert_eq!(
            document.api_key_enc.unwrap().scheme,
            ProtectionScheme::MachineKey
        );
    }

    #[test]
    fn test_user_mirror_failure_does_not_fail_save() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp, Box::new(BrokenUserStore));
        store.save(&SecretString::from("key")).unwrap();
        assert_eq!(store.load().unwrap().unwrap().expose_secret(), "key");
        store.delete().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_falls_back_to_user_mirror_only_when_blob_absent() {
        let temp = TempDir::new().unwrap();
        let mirror = MemoryUserStore::default();
        *mirror.value.lock().unwrap() = Some("from-keyring".to_string());
        let store = store_in(&temp, Box::new(mirror));
        assert_eq!(store.load().unwrap().unwrap().expose_secret(), "from-keyring");

        store.save(&SecretString::from("from-blob")).unwrap();
        assert_eq!(store.load().unwrap().unwrap().expose_secret(), "from-blob");
    }

    #[test]
    fn test_delete_removes_both_copies_and_keeps_settings() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp, Box::new(MemoryUserStore::default()));
        ConfigDocument::update(store.config_path(), |doc| {
            doc.log_username = Some(true);
        })
        .unwrap();
        store.save(&SecretString::from("key")).unwrap();

        store.delete().unwrap();
        assert!(store.load().unwrap().is_none());
        let document = ConfigDocument::load(store.config_path()).unwrap();
        assert_eq!(document.log_username, Some(true));
        assert!(document.api_key_enc.is_none());

        // Deleting again tolerates both copies being absent.
        store.delete().unwrap();
    }

    #[test]
    fn test_falls_through_to_secondary_scheme() {
        let temp = TempDir::new().unwrap();
        let paths = MachinePaths::under(temp.path().to_path_buf());
        let store = CredentialStore::new(
            paths.config_path.clone(),
            vec![
                Box::new(FailingProtection),
                Box::new(MachineKeyProtection::new(paths.machine_key_path.clone())),
            ],
            Box::new(NoUserStore),
        );
        store.save(&SecretString::from("key")).unwrap();
        let document = ConfigDocument::load(&paths.config_path).unwrap();
        assert_eq!(
            document.api_key_enc.unwrap().scheme,
            ProtectionScheme::MachineKey
        );
        assert_eq!(store.load().unwrap().unwrap().expose_secret(), "key");
    }

    #[test]
    fn test_unknown_scheme_is_reported() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp, Box::new(NoUserStore));
        std::fs::write(
            store.config_path(),
            r#"{"apiKeyEnc": "SS:01000000d08c9ddf0115d1118c7a00c04fc297eb"}"#,
        )
        .unwrap();
        assert!(matches!(
            store.load(),
            Err(CoreError::UnsupportedScheme(ProtectionScheme::LegacySecureString))
        ));
    }

    #[test]
    fn test_blank_credential_rejected() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp, Box::new(NoUserStore));
        assert!(matches!(
            store.save(&SecretString::from("   ")),
            Err(CoreError::EmptyCredential)
        ));
        assert!(!store.config_path().exists());
    }
}
