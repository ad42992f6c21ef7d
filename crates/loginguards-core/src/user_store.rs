//! Optional user-scoped mirror of the credential in the OS keyring.
//!
//! The mirror is a convenience for interactive CLI use. The service never
//! depends on it being present, and every failure here is soft.

use keyring::Entry;

use crate::error::CoreError;
use crate::secret::SecretString;

const KEYRING_SERVICE: &str = "LoginGuards";
const KEYRING_USER: &str = "api-key";

pub trait UserSecretStore: Send + Sync {
    fn set(&self, secret: &SecretString) -> Result<(), CoreError>;
    fn get(&self) -> Result<Option<SecretString>, CoreError>;
    fn delete(&self) -> Result<(), CoreError>;
}

/// OS keyring entry (Windows Credential Manager, Keychain, Secret Service).
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
    user: String,
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_names(KEYRING_SERVICE, KEYRING_USER)
    }

    pub fn with_names(service: &str, user: &str) -> Self {
        Self {
            service: service.to_string(),
            user: user.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry, CoreError> {
        Entry::new(&self.service, &self.user)
            .map_err(|err| CoreError::UserStore(format!("open keyring entry: {err}")))
    }
}

impl UserSecretStore for KeyringStore {
    fn set(&self, secret: &SecretString) -> Result<(), CoreError> {
        self.entry()?
            .set_password(secret.expose_secret())
            .map_err(|err| CoreError::UserStore(format!("store credential: {err}")))
    }

    fn get(&self) -> Result<Option<SecretString>, CoreError> {
        match self.entry()?.get_password() {
            Ok(value) => Ok(Some(SecretString::new(value))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(CoreError::UserStore(format!("read credential: {err}"))),
        }
    }

    fn delete(&self) -> Result<(), CoreError> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(CoreError::UserStore(format!("delete credential: {err}"))),
        }
    }
}

/// Used where no user-scoped store exists (service account, tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoUserStore;

impl UserSecretStore for NoUserStore {
    fn set(&self, _secret: &SecretString) -> Result<(), CoreError> {
        Ok(())
    }

    fn get(&self) -> Result<Option<SecretString>, CoreError> {
        Ok(None)
    }

    fn delete(&self) -> Result<(), CoreError> {
        Ok(())
    }
}
