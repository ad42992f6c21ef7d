//! Installs, registers and removes the decision service and the LSA
//! password filter.
//!
//! The host is reached only through [`SystemOps`] and [`ServiceControl`], so
//! the install/uninstall logic runs the same against the real machine and
//! against the in-memory host used in tests.

pub mod deploy;
pub mod error;
pub mod manager;
pub mod memory;
pub mod registration;
pub mod sysops;
#[cfg(windows)]
pub mod windows;

pub use error::IntegrationError;
pub use manager::{
    InstallOptions, InstallReport, IntegrationManager, IntegrationReport, Step, StepOutcome,
    StepReport, UninstallOptions, UninstallReport,
};
pub use sysops::{HostRole, ServiceControl, ServiceSpec, ServiceState, SystemOps};
