//! In-process stand-ins for the host, used by dry runs and tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::IntegrationError;
use crate::sysops::{HostRole, ServiceControl, ServiceSpec, ServiceState, SystemOps};

#[derive(Debug)]
pub struct InMemorySystem {
    elevated: bool,
    role: HostRole,
    system_dir: PathBuf,
    packages: Mutex<Vec<String>>,
    package_writes: AtomicUsize,
    reboots: AtomicUsize,
}

impl InMemorySystem {
    pub fn new(role: HostRole, system_dir: PathBuf) -> Self {
        Self {
            elevated: true,
            role,
            system_dir,
            packages: Mutex::new(Vec::new()),
            package_writes: AtomicUsize::new(0),
            reboots: AtomicUsize::new(0),
        }
    }

    pub fn with_packages(self, packages: &[&str]) -> Self {
        if let Ok(mut current) = self.packages.lock() {
            *current = packages.iter().map(|name| name.to_string()).collect();
        }
        self
    }

    pub fn unelevated(mut self) -> Self {
        self.elevated = false;
        self
    }

    pub fn packages(&self) -> Vec<String> {
        self.packages
            .lock()
            .map(|packages| packages.clone())
            .unwrap_or_default()
    }

    pub fn package_writes(&self) -> usize {
        self.package_writes.load(Ordering::SeqCst)
    }

    pub fn reboots(&self) -> usize {
        self.reboots.load(Ordering::SeqCst)
    }
}

impl SystemOps for InMemorySystem {
    fn is_elevated(&self) -> Result<bool, IntegrationError> {
        Ok(self.elevated)
    }

    fn host_role(&self) -> Result<HostRole, IntegrationError> {
        Ok(self.role)
    }

    fn notification_packages(&self) -> Result<Vec<String>, IntegrationError> {
        self.packages
            .lock()
            .map(|packages| packages.clone())
            .map_err(|_| IntegrationError::Registry("package list poisoned".to_string()))
    }

    fn set_notification_packages(&self, packages: &[String]) -> Result<(), IntegrationError> {
        let mut current = self
            .packages
            .lock()
            .map_err(|_| IntegrationError::Registry("package list poisoned".to_string()))?;
        *current = packages.to_vec();
        self.package_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn system_dir(&self) -> PathBuf {
        self.system_dir.clone()
    }

    fn reboot(&self) -> Result<(), IntegrationError> {
        self.reboots.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
pub struct InMemoryServices {
    state: Mutex<ServiceState>,
    installed: Mutex<Option<ServiceSpec>>,
    starts: AtomicUsize,
}

impl Default for InMemoryServices {
    fn default() -> Self {
        Self::with_state(ServiceState::NotInstalled)
    }
}

impl InMemoryServices {
    pub fn with_state(state: ServiceState) -> Self {
        Self {
            state: Mutex::new(state),
            installed: Mutex::new(None),
            starts: AtomicUsize::new(0),
        }
    }

    pub fn installed_spec(&self) -> Option<ServiceSpec> {
        self.installed.lock().ok().and_then(|spec| spec.clone())
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    fn transition(
        &self,
        change: impl FnOnce(ServiceState) -> Result<ServiceState, IntegrationError>,
    ) -> Result<(), IntegrationError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| IntegrationError::Service("service state poisoned".to_string()))?;
        *state = change(*state)?;
        Ok(())
    }
}

impl ServiceControl for InMemoryServices {
    fn status(&self) -> Result<ServiceState, IntegrationError> {
        self.state
            .lock()
            .map(|state| *state)
            .map_err(|_| IntegrationError::Service("service state poisoned".to_string()))
    }

    fn install(&self, spec: &ServiceSpec) -> Result<(), IntegrationError> {
        self.transition(|state| match state {
            ServiceState::NotInstalled => Ok(ServiceState::Stopped),
            _ => Err(IntegrationError::Service(format!(
                "service {} already exists",
                spec.name
            ))),
        })?;
        if let Ok(mut installed) = self.installed.lock() {
            *installed = Some(spec.clone());
        }
        Ok(())
    }

    fn start(&self) -> Result<(), IntegrationError> {
        self.transition(|state| match state {
            ServiceState::NotInstalled => {
                Err(IntegrationError::Service("service is not installed".to_string()))
            }
            _ => Ok(ServiceState::Running),
        })?;
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), IntegrationError> {
        self.transition(|state| match state {
            ServiceState::NotInstalled => {
                Err(IntegrationError::Service("service is not installed".to_string()))
            }
            _ => Ok(ServiceState::Stopped),
        })
    }

    fn remove(&self) -> Result<(), IntegrationError> {
        self.transition(|_| Ok(ServiceState::NotInstalled))?;
        if let Ok(mut installed) = self.installed.lock() {
            *installed = None;
        }
        Ok(())
    }
}
