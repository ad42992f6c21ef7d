//! Machine-scoped protection of the stored credential.
//!
//! Two schemes exist. DPAPI with machine scope is the primary one on Windows.
//! The machine-key scheme (AES-256-GCM under a key file readable only by the
//! owner of the configuration directory) is used where DPAPI is unavailable.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use zeroize::Zeroizing;

use crate::config::ProtectionScheme;
use crate::error::CoreError;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

pub trait MachineProtection: Send + Sync {
    fn scheme(&self) -> ProtectionScheme;
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, CoreError>;
    fn unprotect(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, CoreError>;
}

/// AES-256-GCM keyed by a random per-machine key file.
///
/// Output layout is `nonce || ciphertext`. The key file is created on first
/// use.
#[derive(Debug, Clone)]
pub struct MachineKeyProtection {
    key_path: PathBuf,
}

impl MachineKeyProtection {
    pub fn new(key_path: PathBuf) -> Self {
        Self { key_path }
    }

    fn cipher(&self, create: bool) -> Result<Aes256Gcm, CoreError> {
        let key = match read_key(&self.key_path)? {
            Some(key) => key,
            None if create => write_new_key(&self.key_path)?,
            None => {
                return Err(CoreError::Protection(format!(
                    "machine key {} is missing",
                    self.key_path.display()
                )))
            }
        };
        Aes256Gcm::new_from_slice(&key).map_err(|err| CoreError::Protection(err.to_string()))
    }
}

impl MachineProtection for MachineKeyProtection {
    fn scheme(&self) -> ProtectionScheme {
        ProtectionScheme::MachineKey
    }

    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, CoreError> {
        let cipher = self.cipher(true)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|err| CoreError::Protection(format!("encrypt: {err}")))?;
        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(nonce.as_slice());
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    fn unprotect(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, CoreError> {
        if blob.len() <= NONCE_SIZE {
            return Err(CoreError::Protection("ciphertext is truncated".to_string()));
        }
        let cipher = self.cipher(false)?;
        let (nonce, ciphertext) = blob.split_at(NONCE_SIZE);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                CoreError::Protection("decryption failed (wrong machine key or corrupted data)".to_string())
            })?;
        Ok(Zeroizing::new(plaintext))
    }
}

fn read_key(path: &Path) -> Result<Option<Zeroizing<Vec<u8>>>, CoreError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => Zeroizing::new(text),
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(CoreError::io(path, err)),
    };
    let key = hex::decode(text.trim())
        .map_err(|err| CoreError::Protection(format!("machine key is not hex: {err}")))?;
    if key.len() != KEY_SIZE {
        return Err(CoreError::Protection(format!(
            "machine key has {} bytes, expected {KEY_SIZE}",
            key.len()
        )));
    }
    Ok(Some(Zeroizing::new(key)))
}

fn write_new_key(path: &Path) -> Result<Zeroizing<Vec<u8>>, CoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| CoreError::io(parent, err))?;
    }
    let key = Aes256Gcm::generate_key(OsRng);
    let encoded = Zeroizing::new(hex::encode(key.as_slice()));
    let mut file = key_file_options()
        .open(path)
        .map_err(|err| CoreError::io(path, err))?;
    file.write_all(encoded.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|err| CoreError::io(path, err))?;
    Ok(Zeroizing::new(key.to_vec()))
}

/// The key file is owner-only from the moment it exists.
#[cfg(unix)]
fn key_file_options() -> OpenOptions {
    use std::os::unix::fs::OpenOptionsExt;
    let mut options = OpenOptions::new();
    options.write(true).create_new(true).mode(0o600);
    options
}

// %PROGRAMDATA%\LoginGuards inherits an administrators/SYSTEM ACL from the installer.
#[cfg(not(unix))]
fn key_file_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    options
}

#[cfg(windows)]
pub use dpapi::DpapiProtection;

#[cfg(windows)]
mod dpapi {
    use std::ptr;

    use windows_sys::Win32::Foundation::LocalFree;
    use windows_sys::Win32::Security::Cryptography::{
        CryptProtectData, CryptUnprotectData, CRYPTPROTECT_LOCAL_MACHINE, CRYPTPROTECT_UI_FORBIDDEN,
        CRYPT_INTEGER_BLOB,
    };
    use zeroize::Zeroizing;

    use super::MachineProtection;
    use crate::config::ProtectionScheme;
    use crate::error::CoreError;

    /// `CryptProtectData` with `CRYPTPROTECT_LOCAL_MACHINE`, so any account on
    /// this host (the service runs as LocalSystem) can decrypt.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct DpapiProtection;

    impl MachineProtection for DpapiProtection {
        fn scheme(&self) -> ProtectionScheme {
            ProtectionScheme::DpapiMachine
        }

        fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, CoreError> {
            let output = call(plaintext, true)?;
            Ok(output.to_vec())
        }

        fn unprotect(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, CoreError> {
            call(blob, false)
        }
    }

    fn call(input: &[u8], protect: bool) -> Result<Zeroizing<Vec<u8>>, CoreError> {
        let data_in = CRYPT_INTEGER_BLOB {
            cbData: input.len() as u32,
            pbData: input.as_ptr() as *mut u8,
        };
        let mut data_out = CRYPT_INTEGER_BLOB {
            cbData: 0,
            pbData: ptr::null_mut(),
        };
        let flags = CRYPTPROTECT_LOCAL_MACHINE | CRYPTPROTECT_UI_FORBIDDEN;
        let ok = unsafe {
            if protect {
                CryptProtectData(
                    &data_in,
                    ptr::null(),
                    ptr::null(),
                    ptr::null(),
                    ptr::null(),
                    flags,
                    &mut data_out,
                )
            } else {
                CryptUnprotectData(
                    &data_in,
                    ptr::null_mut(),
                    ptr::null(),
                    ptr::null(),
                    ptr::null(),
                    flags,
                    &mut data_out,
                )
            }
        };
        if ok == 0 {
            let op = if protect { "CryptProtectData" } else { "CryptUnprotectData" };
            return Err(CoreError::Protection(format!(
                "{op} failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        let output = unsafe {
            let bytes = std::slice::from_raw_parts(data_out.pbData, data_out.cbData as usize);
            let copy = Zeroizing::new(bytes.to_vec());
            LocalFree(data_out.pbData as _);
            copy
        };
        Ok(output)
    }
}
