use anyhow::{Context, Result};

use loginguards_core::{ConfigDocument, CredentialStore, MachinePaths, PolicyConfiguration, SecretString};

pub mod check;
pub mod config;
pub mod configure;
pub mod diagnose;
pub mod install;

pub(crate) fn load_policy(paths: &MachinePaths) -> Result<PolicyConfiguration> {
    let document = ConfigDocument::load(&paths.config_path)
        .with_context(|| format!("load config {}", paths.config_path.display()))?;
    Ok(PolicyConfiguration::from_document(&document))
}

pub(crate) fn load_credential(paths: &MachinePaths) -> Result<Option<SecretString>> {
    CredentialStore::for_machine(paths)
        .load()
        .context("load stored API credential")
}
