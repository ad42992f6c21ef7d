use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::IntegrationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostRole {
    DomainController,
    OtherHost,
}

impl fmt::Display for HostRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostRole::DomainController => f.write_str("domain controller"),
            HostRole::OtherHost => f.write_str("member/standalone host"),
        }
    }
}

/// Privileged host primitives the integration manager needs, and nothing more.
pub trait SystemOps {
    /// Whether the current process runs with administrative rights.
    fn is_elevated(&self) -> Result<bool, IntegrationError>;
    fn host_role(&self) -> Result<HostRole, IntegrationError>;
    /// The LSA `Notification Packages` list, in registry order.
    fn notification_packages(&self) -> Result<Vec<String>, IntegrationError>;
    fn set_notification_packages(&self, packages: &[String]) -> Result<(), IntegrationError>;
    /// Directory LSA loads notification packages from.
    fn system_dir(&self) -> PathBuf;
    fn reboot(&self) -> Result<(), IntegrationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    NotInstalled,
    Stopped,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub executable: PathBuf,
    pub arguments: Vec<String>,
}

impl ServiceSpec {
    pub const NAME: &'static str = "LoginGuardsPolicyEngine";

    pub fn for_daemon(executable: PathBuf) -> Self {
        Self {
            name: Self::NAME.to_string(),
            display_name: "LoginGuards Policy Engine".to_string(),
            description: "LoginGuards password policy decision engine".to_string(),
            executable,
            arguments: vec!["--service".to_string()],
        }
    }

    /// Starts the daemon with `--home <dir>`, replacing any earlier value.
    pub fn with_home(mut self, home: &Path) -> Self {
        if let Some(index) = self.arguments.iter().position(|arg| arg == "--home") {
            let end = (index + 2).min(self.arguments.len());
            self.arguments.drain(index..end);
        }
        self.arguments.push("--home".to_string());
        self.arguments.push(home.display().to_string());
        self
    }

    /// The daemon binary shipped next to the running executable.
    pub fn beside_current_exe() -> Result<Self, IntegrationError> {
        let current = std::env::current_exe()
            .map_err(|err| IntegrationError::io("current executable", err))?;
        let dir = current
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let file = format!("loginguards-daemon{}", std::env::consts::EXE_SUFFIX);
        Ok(Self::for_daemon(dir.join(file)))
    }
}

/// Lifecycle of the OS-managed decision service.
pub trait ServiceControl {
    fn status(&self) -> Result<ServiceState, IntegrationError>;
    fn install(&self, spec: &ServiceSpec) -> Result<(), IntegrationError>;
    fn start(&self) -> Result<(), IntegrationError>;
    /// Stops the service and waits for it to report stopped.
    fn stop(&self) -> Result<(), IntegrationError>;
    fn remove(&self) -> Result<(), IntegrationError>;
}
