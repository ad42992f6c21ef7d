pub mod config;
pub mod error;
pub mod ipc;
pub mod protection;
pub mod secret;
pub mod store;
pub mod user_store;

pub use config::{ConfigDocument, EncryptedBlob, FailMode, MachinePaths, PolicyConfiguration, ProtectionScheme};
pub use error::CoreError;
pub use ipc::{DecisionRequest, DecisionResponse, MalformedRequest, Reason};
pub use secret::SecretString;
pub use store::CredentialStore;
