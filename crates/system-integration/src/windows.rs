use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use tracing::debug;
use windows_service::service::{
    Service, ServiceAccess, ServiceErrorControl, ServiceInfo, ServiceStartType,
    ServiceState as ScmState, ServiceType,
};
use windows_service::service_manager::{ServiceManager, ServiceManagerAccess};
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE};
use windows_sys::Win32::Security::{GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY};
use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};
use winreg::enums::{HKEY_LOCAL_MACHINE, KEY_READ, KEY_SET_VALUE};
use winreg::RegKey;

use crate::error::IntegrationError;
use crate::sysops::{HostRole, ServiceControl, ServiceSpec, ServiceState, SystemOps};

const LSA_KEY: &str = r"SYSTEM\CurrentControlSet\Control\Lsa";
const NOTIFICATION_PACKAGES: &str = "Notification Packages";
const PRODUCT_OPTIONS_KEY: &str = r"SYSTEM\CurrentControlSet\Control\ProductOptions";
const DOMAIN_CONTROLLER_PRODUCT: &str = "LanmanNT";

const ERROR_SERVICE_ALREADY_RUNNING: i32 = 1056;
const ERROR_SERVICE_DOES_NOT_EXIST: i32 = 1060;
const ERROR_SERVICE_NOT_ACTIVE: i32 = 1062;
const STOP_WAIT: Duration = Duration::from_secs(15);

fn registry_error(context: &str, err: std::io::Error) -> IntegrationError {
    IntegrationError::Registry(format!("{context}: {err}"))
}

pub struct WindowsSystem {
    system_dir: PathBuf,
}

impl WindowsSystem {
    pub fn new() -> Self {
        let root = std::env::var_os("SystemRoot").unwrap_or_else(|| OsString::from(r"C:\Windows"));
        Self {
            system_dir: PathBuf::from(root).join("System32"),
        }
    }
}

impl Default for WindowsSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemOps for WindowsSystem {
    fn is_elevated(&self) -> Result<bool, IntegrationError> {
        let mut token: HANDLE = 0;
        // SAFETY: the pseudo handle from GetCurrentProcess needs no cleanup; the
        // token handle is closed below on every path.
        let opened = unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token) };
        if opened == 0 {
            return Err(IntegrationError::Service(format!(
                "open process token: {}",
                std::io::Error::last_os_error()
            )));
        }
        let mut elevation = TOKEN_ELEVATION { TokenIsElevated: 0 };
        let mut returned = 0u32;
        let queried = unsafe {
            GetTokenInformation(
                token,
                TokenElevation,
                &mut elevation as *mut TOKEN_ELEVATION as *mut _,
                std::mem::size_of::<TOKEN_ELEVATION>() as u32,
                &mut returned,
            )
        };
        let query_error = std::io::Error::last_os_error();
        unsafe {
            CloseHandle(token);
        }
        if queried == 0 {
            return Err(IntegrationError::Service(format!(
                "query token elevation: {query_error}"
            )));
        }
        Ok(elevation.TokenIsElevated != 0)
    }

    fn host_role(&self) -> Result<HostRole, IntegrationError> {
        let key = RegKey::predef(HKEY_LOCAL_MACHINE)
            .open_subkey_with_flags(PRODUCT_OPTIONS_KEY, KEY_READ)
            .map_err(|err| registry_error("open ProductOptions", err))?;
        let product: String = key
            .get_value("ProductType")
            .map_err(|err| registry_error("read ProductType", err))?;
        if product.eq_ignore_ascii_case(DOMAIN_CONTROLLER_PRODUCT) {
            Ok(HostRole::DomainController)
        } else {
            Ok(HostRole::OtherHost)
        }
    }

    fn notification_packages(&self) -> Result<Vec<String>, IntegrationError> {
        let key = RegKey::predef(HKEY_LOCAL_MACHINE)
            .open_subkey_with_flags(LSA_KEY, KEY_READ)
            .map_err(|err| registry_error("open LSA key", err))?;
        match key.get_value::<Vec<String>, _>(NOTIFICATION_PACKAGES) {
            Ok(packages) => Ok(packages),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(registry_error("read Notification Packages", err)),
        }
    }

    fn set_notification_packages(&self, packages: &[String]) -> Result<(), IntegrationError> {
        let key = RegKey::predef(HKEY_LOCAL_MACHINE)
            .open_subkey_with_flags(LSA_KEY, KEY_SET_VALUE)
            .map_err(|err| registry_error("open LSA key for writing", err))?;
        key.set_value(NOTIFICATION_PACKAGES, &packages.to_vec())
            .map_err(|err| registry_error("write Notification Packages", err))
    }

    fn system_dir(&self) -> PathBuf {
        self.system_dir.clone()
    }

    fn reboot(&self) -> Result<(), IntegrationError> {
        let status = Command::new("shutdown.exe")
            .args(["/r", "/t", "0", "/c", "LoginGuards password filter update"])
            .status()
            .map_err(|err| IntegrationError::Reboot(err.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(IntegrationError::Reboot(format!("shutdown.exe exited with {status}")))
        }
    }
}

/// The decision service as seen by the Service Control Manager.
pub struct WindowsServices {
    name: String,
}

impl WindowsServices {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    fn manager(access: ServiceManagerAccess) -> Result<ServiceManager, IntegrationError> {
        ServiceManager::local_computer(None::<&str>, access).map_err(service_error)
    }

    fn open(&self, access: ServiceAccess) -> Result<Option<Service>, IntegrationError> {
        let manager = Self::manager(ServiceManagerAccess::CONNECT)?;
        match manager.open_service(&self.name, access) {
            Ok(service) => Ok(Some(service)),
            Err(err) if os_code(&err) == Some(ERROR_SERVICE_DOES_NOT_EXIST) => Ok(None),
            Err(err) => Err(service_error(err)),
        }
    }

    fn require(&self, access: ServiceAccess) -> Result<Service, IntegrationError> {
        self.open(access)?
            .ok_or_else(|| IntegrationError::Service(format!("service {} is not installed", self.name)))
    }
}

fn os_code(err: &windows_service::Error) -> Option<i32> {
    match err {
        windows_service::Error::Winapi(io) => io.raw_os_error(),
        _ => None,
    }
}

fn service_error(err: windows_service::Error) -> IntegrationError {
    IntegrationError::Service(err.to_string())
}

impl ServiceControl for WindowsServices {
    fn status(&self) -> Result<ServiceState, IntegrationError> {
        let Some(service) = self.open(ServiceAccess::QUERY_STATUS)? else {
            return Ok(ServiceState::NotInstalled);
        };
        let status = service.query_status().map_err(service_error)?;
        Ok(match status.current_state {
            ScmState::Running | ScmState::StartPending | ScmState::ContinuePending => {
                ServiceState::Running
            }
            _ => ServiceState::Stopped,
        })
    }

    fn install(&self, spec: &ServiceSpec) -> Result<(), IntegrationError> {
        let manager = Self::manager(ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE)?;
        let info = ServiceInfo {
            name: OsString::from(&spec.name),
            display_name: OsString::from(&spec.display_name),
            service_type: ServiceType::OWN_PROCESS,
            start_type: ServiceStartType::AutoStart,
            error_control: ServiceErrorControl::Normal,
            executable_path: spec.executable.clone(),
            launch_arguments: spec.arguments.iter().map(OsString::from).collect(),
            dependencies: Vec::new(),
            account_name: None,
            account_password: None,
        };
        let service = manager
            .create_service(&info, ServiceAccess::CHANGE_CONFIG)
            .map_err(service_error)?;
        service
            .set_description(&spec.description)
            .map_err(service_error)?;
        debug!(service = %spec.name, "created service");
        Ok(())
    }

    fn start(&self) -> Result<(), IntegrationError> {
        let service = self.require(ServiceAccess::START)?;
        match service.start::<&str>(&[]) {
            Ok(()) => Ok(()),
            Err(err) if os_code(&err) == Some(ERROR_SERVICE_ALREADY_RUNNING) => Ok(()),
            Err(err) => Err(service_error(err)),
        }
    }

    fn stop(&self) -> Result<(), IntegrationError> {
        let service = self.require(ServiceAccess::STOP | ServiceAccess::QUERY_STATUS)?;
        match service.stop() {
            Ok(_) => {}
            Err(err) if os_code(&err) == Some(ERROR_SERVICE_NOT_ACTIVE) => return Ok(()),
            Err(err) => return Err(service_error(err)),
        }
        let deadline = Instant::now() + STOP_WAIT;
        while Instant::now() < deadline {
            let status = service.query_status().map_err(service_error)?;
            if status.current_state == ScmState::Stopped {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(250));
        }
        Err(IntegrationError::Service(format!(
            "service {} did not stop within {}s",
            self.name,
            STOP_WAIT.as_secs()
        )))
    }

    fn remove(&self) -> Result<(), IntegrationError> {
        let Some(service) = self.open(ServiceAccess::DELETE)? else {
            return Ok(());
        };
        service.delete().map_err(service_error)
    }
}
