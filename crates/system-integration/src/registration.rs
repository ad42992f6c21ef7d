//! Edits of the LSA security-package list.
//!
//! Names compare case-insensitively, like the registry does. Every other
//! entry and the existing order are preserved.

use tracing::info;

use crate::error::IntegrationError;
use crate::sysops::SystemOps;

pub const FILTER_NAME: &str = "LoginGuardsPwdFilter";

/// The list with `name` appended, or `None` if it is already present.
pub fn with_package(packages: &[String], name: &str) -> Option<Vec<String>> {
    if contains(packages, name) {
        return None;
    }
    let mut next: Vec<String> = packages
        .iter()
        .filter(|entry| !entry.is_empty())
        .cloned()
        .collect();
    next.push(name.to_string());
    Some(next)
}

/// The list without `name`, or `None` if it was not present.
pub fn without_package(packages: &[String], name: &str) -> Option<Vec<String>> {
    if !contains(packages, name) {
        return None;
    }
    Some(
        packages
            .iter()
            .filter(|entry| !entry.is_empty() && !entry.eq_ignore_ascii_case(name))
            .cloned()
            .collect(),
    )
}

pub fn contains(packages: &[String], name: &str) -> bool {
    packages.iter().any(|entry| entry.eq_ignore_ascii_case(name))
}

/// Returns whether the list changed.
pub fn register(system: &dyn SystemOps, name: &str) -> Result<bool, IntegrationError> {
    let current = system.notification_packages()?;
    match with_package(&current, name) {
        Some(next) => {
            system.set_notification_packages(&next)?;
            info!(package = name, "registered LSA notification package");
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Returns whether the list changed.
pub fn unregister(system: &dyn SystemOps, name: &str) -> Result<bool, IntegrationError> {
    let current = system.notification_packages()?;
    match without_package(&current, name) {
        Some(next) => {
            system.set_notification_packages(&next)?;
            info!(package = name, "unregistered LSA notification package");
            Ok(true)
        }
        None => Ok(false),
    }
}
