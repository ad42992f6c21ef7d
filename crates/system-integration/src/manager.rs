//! Install and uninstall orchestration.
//!
//! Nothing here keeps its own state: every step looks at the host first and
//! only acts when the host differs from the wanted outcome, so any prefix of
//! a previous run can be completed by running the same operation again.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use loginguards_core::{
    ConfigDocument, CoreError, CredentialStore, FailMode, MachinePaths, PolicyConfiguration,
};

use crate::deploy::{self, CopyResult, RemoveResult, FILTER_BINARY};
use crate::error::IntegrationError;
use crate::registration::{self, FILTER_NAME};
use crate::sysops::{HostRole, ServiceControl, ServiceSpec, ServiceState, SystemOps};

#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub fail_mode: FailMode,
    /// `None` keeps whatever endpoint is already configured.
    pub pipe_endpoint: Option<String>,
    pub log_username: bool,
    pub decision_timeout: Option<Duration>,
    pub binary_path: Option<PathBuf>,
    pub reboot: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UninstallOptions {
    pub reboot: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    PersistConfiguration,
    EnsureService,
    DeployFilter,
    RegisterFilter,
    RemoveService,
    DeleteCredential,
    UnregisterFilter,
    RemoveFilter,
    RemoveConfiguration,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Step::PersistConfiguration => "persist configuration",
            Step::EnsureService => "decision service",
            Step::DeployFilter => "deploy password filter",
            Step::RegisterFilter => "register password filter",
            Step::RemoveService => "remove decision service",
            Step::DeleteCredential => "delete API credential",
            Step::UnregisterFilter => "unregister password filter",
            Step::RemoveFilter => "remove password filter",
            Step::RemoveConfiguration => "remove configuration",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Changed,
    Unchanged,
    Skipped(String),
    Warning(String),
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Changed => f.write_str("changed"),
            StepOutcome::Unchanged => f.write_str("unchanged"),
            StepOutcome::Skipped(reason) => write!(f, "skipped ({reason})"),
            StepOutcome::Warning(message) => write!(f, "warning: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub step: Step,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrationReport {
    pub host_role: Option<HostRole>,
    pub steps: Vec<StepReport>,
    pub reboot_required: bool,
    pub reboot_requested: bool,
}

pub type InstallReport = IntegrationReport;
pub type UninstallReport = IntegrationReport;

impl IntegrationReport {
    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|report| report.step == step)
            .map(|report| &report.outcome)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &StepReport> {
        self.steps
            .iter()
            .filter(|report| matches!(report.outcome, StepOutcome::Warning(_)))
    }

    fn record(&mut self, step: Step, outcome: StepOutcome) {
        match &outcome {
            StepOutcome::Warning(message) => warn!(step = %step, "{message}"),
            outcome => info!(step = %step, outcome = %outcome, "integration step"),
        }
        self.steps.push(StepReport { step, outcome });
    }
}

fn changed(did_change: bool) -> StepOutcome {
    if did_change {
        StepOutcome::Changed
    } else {
        StepOutcome::Unchanged
    }
}

pub struct IntegrationManager<'a> {
    system: &'a dyn SystemOps,
    services: &'a dyn ServiceControl,
    paths: MachinePaths,
    credentials: CredentialStore,
    service_spec: ServiceSpec,
    bundled_binary: Option<PathBuf>,
}

impl<'a> IntegrationManager<'a> {
    pub fn new(
        system: &'a dyn SystemOps,
        services: &'a dyn ServiceControl,
        paths: MachinePaths,
        credentials: CredentialStore,
        service_spec: ServiceSpec,
    ) -> Self {
        Self {
            system,
            services,
            // The service reads the same machine directory this manager writes.
            service_spec: service_spec.with_home(&paths.root_dir),
            paths,
            credentials,
            bundled_binary: None,
        }
    }

    pub fn with_bundled_binary(mut self, path: Option<PathBuf>) -> Self {
        self.bundled_binary = path;
        self
    }

    fn filter_target(&self) -> PathBuf {
        self.system.system_dir().join(FILTER_BINARY)
    }

    fn require_admin(&self) -> Result<(), IntegrationError> {
        if self.system.is_elevated()? {
            Ok(())
        } else {
            Err(IntegrationError::InsufficientPrivilege)
        }
    }

    pub fn install(&self, options: &InstallOptions) -> Result<InstallReport, IntegrationError> {
        self.require_admin()?;
        let source = deploy::locate_binary(
            options.binary_path.as_deref(),
            self.bundled_binary.as_deref(),
        )?;
        let mut report = InstallReport::default();

        let config_path = &self.paths.config_path;
        let before = ConfigDocument::load(config_path)?;
        let previous = PolicyConfiguration::from_document(&before);
        let mut wanted = previous.clone();
        wanted.fail_mode = options.fail_mode;
        wanted.log_username = options.log_username;
        if let Some(endpoint) = options.pipe_endpoint.as_ref().filter(|value| !value.trim().is_empty()) {
            wanted.pipe_endpoint = endpoint.clone();
        }
        if let Some(timeout) = options.decision_timeout {
            wanted.decision_timeout = timeout;
        }
        let after = ConfigDocument::update(config_path, |document| wanted.apply_to(document))?;
        report.record(Step::PersistConfiguration, changed(after != before));

        // The service binds its endpoint once, at start.
        let endpoint_moved = previous.pipe_endpoint != wanted.pipe_endpoint;
        let service = self.ensure_service(endpoint_moved)?;
        report.record(Step::EnsureService, service);

        let role = self.system.host_role()?;
        report.host_role = Some(role);
        if role != HostRole::DomainController {
            let reason = format!("host is a {role}");
            report.record(Step::DeployFilter, StepOutcome::Skipped(reason.clone()));
            report.record(Step::RegisterFilter, StepOutcome::Skipped(reason));
            return Ok(report);
        }

        let target = self.filter_target();
        let binary_replaced = match source {
            Some(source) => {
                let copied = deploy::deploy_binary(&source, &target)? == CopyResult::Copied;
                report.record(Step::DeployFilter, changed(copied));
                copied
            }
            None => {
                report.record(
                    Step::DeployFilter,
                    StepOutcome::Warning(
                        "password filter binary not found; only the decision service is installed"
                            .to_string(),
                    ),
                );
                false
            }
        };

        let registered = if target.is_file() {
            let did_change = registration::register(self.system, FILTER_NAME)?;
            report.record(Step::RegisterFilter, changed(did_change));
            did_change
        } else {
            report.record(
                Step::RegisterFilter,
                StepOutcome::Skipped("no filter binary in the system directory".to_string()),
            );
            false
        };

        // A replaced binary is only picked up by LSA on the next boot.
        report.reboot_required = registered || (binary_replaced && target.is_file());
        self.maybe_reboot(&mut report, options.reboot)?;
        Ok(report)
    }

    pub fn uninstall(&self, options: &UninstallOptions) -> Result<UninstallReport, IntegrationError> {
        self.require_admin()?;
        let mut report = UninstallReport::default();

        let service = self.remove_service()?;
        report.record(Step::RemoveService, service);

        let credential = self.delete_credential();
        report.record(Step::DeleteCredential, credential);

        let role = self.system.host_role()?;
        report.host_role = Some(role);
        if role == HostRole::DomainController {
            let unregistered = registration::unregister(self.system, FILTER_NAME)?;
            report.record(Step::UnregisterFilter, changed(unregistered));
            report.reboot_required = unregistered;

            let outcome = match deploy::remove_binary(&self.filter_target()) {
                RemoveResult::Removed => StepOutcome::Changed,
                RemoveResult::Absent => StepOutcome::Unchanged,
                RemoveResult::Locked(err) => {
                    report.reboot_required = true;
                    StepOutcome::Warning(format!(
                        "filter binary still in use ({err}); re-run uninstall after a reboot"
                    ))
                }
            };
            report.record(Step::RemoveFilter, outcome);
        } else {
            let reason = format!("host is a {role}");
            report.record(Step::UnregisterFilter, StepOutcome::Skipped(reason.clone()));
            report.record(Step::RemoveFilter, StepOutcome::Skipped(reason));
        }

        let removed_config = remove_if_present(&self.paths.config_path)?;
        let removed_key = remove_if_present(&self.paths.machine_key_path)?;
        report.record(Step::RemoveConfiguration, changed(removed_config || removed_key));

        self.maybe_reboot(&mut report, options.reboot)?;
        Ok(report)
    }

    /// Never fails: the filter must still be unregistered when the stored
    /// configuration is unreadable.
    fn delete_credential(&self) -> StepOutcome {
        let config_path = &self.paths.config_path;
        let had_credential = match ConfigDocument::load(config_path) {
            Ok(document) => document.api_key_enc.is_some(),
            Err(CoreError::InvalidConfig(reason)) => {
                warn!(path = %config_path.display(), %reason, "discarding unreadable configuration");
                if let Err(err) = remove_if_present(config_path) {
                    return StepOutcome::Warning(format!("could not remove configuration: {err}"));
                }
                true
            }
            Err(err) => {
                return StepOutcome::Warning(format!("could not read stored credential: {err}"));
            }
        };
        match self.credentials.delete() {
            Ok(()) => changed(had_credential),
            Err(err) => StepOutcome::Warning(format!("could not delete stored credential: {err}")),
        }
    }

    fn ensure_service(&self, restart: bool) -> Result<StepOutcome, IntegrationError> {
        match self.services.status()? {
            ServiceState::NotInstalled => {
                self.services.install(&self.service_spec)?;
                self.services.start()?;
                Ok(StepOutcome::Changed)
            }
            ServiceState::Stopped => {
                self.services.start()?;
                Ok(StepOutcome::Changed)
            }
            ServiceState::Running if restart => {
                self.services.stop()?;
                self.services.start()?;
                Ok(StepOutcome::Changed)
            }
            ServiceState::Running => Ok(StepOutcome::Unchanged),
        }
    }

    fn remove_service(&self) -> Result<StepOutcome, IntegrationError> {
        match self.services.status()? {
            ServiceState::NotInstalled => Ok(StepOutcome::Unchanged),
            ServiceState::Running => {
                self.services.stop()?;
                self.services.remove()?;
                Ok(StepOutcome::Changed)
            }
            ServiceState::Stopped => {
                self.services.remove()?;
                Ok(StepOutcome::Changed)
            }
        }
    }

    fn maybe_reboot(&self, report: &mut IntegrationReport, requested: bool) -> Result<(), IntegrationError> {
        if report.reboot_required && requested {
            info!("rebooting to load password filter changes");
            self.system.reboot()?;
            report.reboot_requested = true;
        }
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> Result<bool, IntegrationError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(IntegrationError::io(path, err)),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use loginguards_core::protection::{MachineKeyProtection, MachineProtection};
    use loginguards_core::user_store::NoUserStore;
    use loginguards_core::SecretString;
    use tempfile::TempDir;

    use super::*;
    use crate::memory::{InMemoryServices, InMemorySystem};

    struct Host {
        _temp: TempDir,
        paths: MachinePaths,
        system_dir: PathBuf,
        source_binary: PathBuf,
    }

    impl Host {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let paths = MachinePaths::under(temp.path().join("machine"));
            let system_dir = temp.path().join("System32");
            fs::create_dir_all(&system_dir).unwrap();
            let source_binary = temp.path().join("native").join(FILTER_BINARY);
            fs::create_dir_all(source_binary.parent().unwrap()).unwrap();
            fs::write(&source_binary, b"filter-v1").unwrap();
            Self {
                _temp: temp,
                paths,
                system_dir,
                source_binary,
            }
        }

        fn credentials(&self) -> CredentialStore {
            let protections: Vec<Box<dyn MachineProtection>> = vec![Box::new(
                MachineKeyProtection::new(self.paths.machine_key_path.clone()),
            )];
            CredentialStore::new(
                self.paths.config_path.clone(),
                protections,
                Box::new(NoUserStore),
            )
        }

        fn manager<'a>(
            &self,
            system: &'a InMemorySystem,
            services: &'a InMemoryServices,
        ) -> IntegrationManager<'a> {
            IntegrationManager::new(
                system,
                services,
                self.paths.clone(),
                self.credentials(),
                ServiceSpec::for_daemon(PathBuf::from("loginguards-daemon.exe")),
            )
            .with_bundled_binary(Some(self.source_binary.clone()))
        }

        fn deployed(&self) -> PathBuf {
            self.system_dir.join(FILTER_BINARY)
        }
    }

    fn install_options() -> InstallOptions {
        InstallOptions {
            fail_mode: FailMode::FailOpen,
            log_username: true,
            decision_timeout: Some(Duration::from_millis(2000)),
            ..InstallOptions::default()
        }
    }

    #[test]
    fn test_install_on_member_host_leaves_lsa_untouched() {
        let host = Host::new();
        let system = InMemorySystem::new(HostRole::OtherHost, host.system_dir.clone())
            .with_packages(&["scecli"]);
        let services = InMemoryServices::default();

        let report = host.manager(&system, &services).install(&install_options()).unwrap();

        assert_eq!(services.status().unwrap(), ServiceState::Running);
        assert_eq!(system.packages(), vec!["scecli".to_string()]);
        assert_eq!(system.package_writes(), 0);
        assert!(!host.deployed().exists());
        assert!(!report.reboot_required);
        assert!(matches!(
            report.outcome(Step::DeployFilter),
            Some(StepOutcome::Skipped(_))
        ));

        let config = PolicyConfiguration::from_document(
            &ConfigDocument::load(&host.paths.config_path).unwrap(),
        );
        assert_eq!(config.fail_mode, FailMode::FailOpen);
        assert!(config.log_username);
        assert_eq!(config.decision_timeout, Duration::from_millis(2000));
    }

    #[test]
    fn test_install_on_domain_controller_deploys_and_registers() {
        let host = Host::new();
        let system = InMemorySystem::new(HostRole::DomainController, host.system_dir.clone())
            .with_packages(&["scecli", "rassfm"]);
        let services = InMemoryServices::default();

        let options = InstallOptions {
            reboot: true,
            ..install_options()
        };
        let report = host.manager(&system, &services).install(&options).unwrap();

        assert_eq!(fs::read(host.deployed()).unwrap(), b"filter-v1");
        assert_eq!(
            system.packages(),
            vec!["scecli".to_string(), "rassfm".to_string(), FILTER_NAME.to_string()]
        );
        assert_eq!(report.outcome(Step::RegisterFilter), Some(&StepOutcome::Changed));
        assert!(report.reboot_required);
        assert!(report.reboot_requested);
        assert_eq!(system.reboots(), 1);
    }

    #[test]
    fn test_second_install_is_a_noop() {
        let host = Host::new();
        let system = InMemorySystem::new(HostRole::DomainController, host.system_dir.clone());
        let services = InMemoryServices::default();
        let manager = host.manager(&system, &services);

        manager.install(&install_options()).unwrap();
        let writes = system.package_writes();
        let report = manager
            .install(&InstallOptions {
                reboot: true,
                ..install_options()
            })
            .unwrap();

        assert_eq!(system.package_writes(), writes);
        assert_eq!(system.packages(), vec![FILTER_NAME.to_string()]);
        assert!(report
            .steps
            .iter()
            .all(|step| step.outcome == StepOutcome::Unchanged));
        assert!(!report.reboot_required);
        assert_eq!(system.reboots(), 0);
        assert_eq!(services.starts(), 1);
    }

    #[test]
    fn test_install_then_uninstall_restores_host() {
        let host = Host::new();
        let system = InMemorySystem::new(HostRole::DomainController, host.system_dir.clone())
            .with_packages(&["scecli"]);
        let services = InMemoryServices::default();
        let manager = host.manager(&system, &services);

        manager.install(&install_options()).unwrap();
        host.credentials().save(&SecretString::from("lg_key")).unwrap();
        let report = manager.uninstall(&UninstallOptions::default()).unwrap();

        assert_eq!(services.status().unwrap(), ServiceState::NotInstalled);
        assert_eq!(system.packages(), vec!["scecli".to_string()]);
        assert!(!host.deployed().exists());
        assert!(!host.paths.config_path.exists());
        assert!(!host.paths.machine_key_path.exists());
        assert_eq!(report.outcome(Step::DeleteCredential), Some(&StepOutcome::Changed));
        assert!(report.reboot_required);
        assert!(!report.reboot_requested);
    }

    #[test]
    fn test_uninstall_twice_is_tolerant() {
        let host = Host::new();
        let system = InMemorySystem::new(HostRole::DomainController, host.system_dir.clone());
        let services = InMemoryServices::default();
        let manager = host.manager(&system, &services);

        manager.install(&install_options()).unwrap();
        manager.uninstall(&UninstallOptions::default()).unwrap();
        let report = manager
            .uninstall(&UninstallOptions { reboot: true })
            .unwrap();

        assert!(report
            .steps
            .iter()
            .all(|step| step.outcome == StepOutcome::Unchanged));
        assert_eq!(system.reboots(), 0);
    }

    #[test]
    fn test_rerun_completes_partial_install() {
        let host = Host::new();
        let system = InMemorySystem::new(HostRole::DomainController, host.system_dir.clone())
            .with_packages(&["scecli"]);
        let services = InMemoryServices::with_state(ServiceState::Stopped);
        // A previous run copied the binary and then died before registering.
        fs::copy(&host.source_binary, host.deployed()).unwrap();

        let report = host
            .manager(&system, &services)
            .install(&install_options())
            .unwrap();

        assert_eq!(report.outcome(Step::DeployFilter), Some(&StepOutcome::Unchanged));
        assert_eq!(report.outcome(Step::RegisterFilter), Some(&StepOutcome::Changed));
        assert_eq!(services.status().unwrap(), ServiceState::Running);
        assert_eq!(
            system.packages(),
            vec!["scecli".to_string(), FILTER_NAME.to_string()]
        );
    }

    #[test]
    fn test_missing_binary_warns_and_keeps_service() {
        let host = Host::new();
        fs::remove_file(&host.source_binary).unwrap();
        let system = InMemorySystem::new(HostRole::DomainController, host.system_dir.clone());
        let services = InMemoryServices::default();

        let report = host
            .manager(&system, &services)
            .install(&install_options())
            .unwrap();

        assert!(matches!(
            report.outcome(Step::DeployFilter),
            Some(StepOutcome::Warning(_))
        ));
        assert!(matches!(
            report.outcome(Step::RegisterFilter),
            Some(StepOutcome::Skipped(_))
        ));
        assert!(system.packages().is_empty());
        assert_eq!(services.status().unwrap(), ServiceState::Running);
        assert_eq!(report.warnings().count(), 1);
    }

    #[test]
    fn test_unelevated_install_aborts_before_mutation() {
        let host = Host::new();
        let system = InMemorySystem::new(HostRole::DomainController, host.system_dir.clone())
            .unelevated();
        let services = InMemoryServices::default();
        let manager = host.manager(&system, &services);

        let err = manager.install(&install_options()).unwrap_err();
        assert!(matches!(err, IntegrationError::InsufficientPrivilege));
        let err = manager.uninstall(&UninstallOptions::default()).unwrap_err();
        assert!(matches!(err, IntegrationError::InsufficientPrivilege));

        assert!(!host.paths.config_path.exists());
        assert_eq!(services.status().unwrap(), ServiceState::NotInstalled);
        assert!(!host.deployed().exists());
        assert_eq!(system.package_writes(), 0);
    }

    #[test]
    fn test_endpoint_change_restarts_running_service() {
        let host = Host::new();
        let system = InMemorySystem::new(HostRole::OtherHost, host.system_dir.clone());
        let services = InMemoryServices::default();
        let manager = host.manager(&system, &services);

        manager.install(&install_options()).unwrap();
        let report = manager
            .install(&InstallOptions {
                pipe_endpoint: Some("/tmp/loginguards-alt.sock".to_string()),
                ..install_options()
            })
            .unwrap();

        assert_eq!(report.outcome(Step::EnsureService), Some(&StepOutcome::Changed));
        assert_eq!(services.starts(), 2);
    }

    #[test]
    fn test_install_preserves_unknown_config_keys_and_credential() {
        let host = Host::new();
        fs::create_dir_all(&host.paths.root_dir).unwrap();
        fs::write(&host.paths.config_path, r#"{"customerTag":"acme"}"#).unwrap();
        host.credentials().save(&SecretString::from("lg_key")).unwrap();
        let system = InMemorySystem::new(HostRole::OtherHost, host.system_dir.clone());
        let services = InMemoryServices::default();

        host.manager(&system, &services)
            .install(&install_options())
            .unwrap();

        let document = ConfigDocument::load(&host.paths.config_path).unwrap();
        assert_eq!(document.extra.get("customerTag").unwrap(), "acme");
        assert_eq!(
            host.credentials().load().unwrap().unwrap().expose_secret(),
            "lg_key"
        );
    }

    #[test]
    fn test_uninstall_with_corrupt_config_still_unregisters_filter() {
        let host = Host::new();
        let system = InMemorySystem::new(HostRole::DomainController, host.system_dir.clone())
            .with_packages(&["scecli"]);
        let services = InMemoryServices::default();
        let manager = host.manager(&system, &services);

        manager.install(&install_options()).unwrap();
        fs::write(&host.paths.config_path, "{ not json").unwrap();

        let report = manager.uninstall(&UninstallOptions::default()).unwrap();
        assert_eq!(services.status().unwrap(), ServiceState::NotInstalled);
        assert_eq!(system.packages(), vec!["scecli".to_string()]);
        assert!(!host.deployed().exists());
        assert!(!host.paths.config_path.exists());
        assert_eq!(report.outcome(Step::UnregisterFilter), Some(&StepOutcome::Changed));
        assert_eq!(report.outcome(Step::RemoveFilter), Some(&StepOutcome::Changed));

        let rerun = manager.uninstall(&UninstallOptions::default()).unwrap();
        assert!(rerun
            .steps
            .iter()
            .all(|step| step.outcome == StepOutcome::Unchanged));
    }

    #[test]
    fn test_missing_explicit_binary_aborts_before_mutation() {
        let host = Host::new();
        let system = InMemorySystem::new(HostRole::DomainController, host.system_dir.clone())
            .with_packages(&["scecli"]);
        let services = InMemoryServices::default();
        let missing = host.system_dir.join("Typo.dll");

        let err = host
            .manager(&system, &services)
            .install(&InstallOptions {
                binary_path: Some(missing.clone()),
                ..install_options()
            })
            .unwrap_err();

        assert!(matches!(err, IntegrationError::BinaryNotFound(ref path) if path == &missing));
        assert!(!host.paths.config_path.exists());
        assert_eq!(services.status().unwrap(), ServiceState::NotInstalled);
        assert!(!host.deployed().exists());
        assert_eq!(system.packages(), vec!["scecli".to_string()]);
        assert_eq!(system.package_writes(), 0);
    }

    #[test]
    fn test_service_is_pointed_at_the_machine_directory() {
        let host = Host::new();
        let system = InMemorySystem::new(HostRole::OtherHost, host.system_dir.clone());
        let services = InMemoryServices::default();

        host.manager(&system, &services)
            .install(&install_options())
            .unwrap();

        let spec = services.installed_spec().unwrap();
        let home = host.paths.root_dir.display().to_string();
        assert_eq!(spec.arguments, vec!["--service".to_string(), "--home".to_string(), home]);
    }

    #[test]
    fn test_out_of_range_timeout_is_clamped_on_disk() {
        let host = Host::new();
        let system = InMemorySystem::new(HostRole::OtherHost, host.system_dir.clone());
        let services = InMemoryServices::default();

        host.manager(&system, &services)
            .install(&InstallOptions {
                decision_timeout: Some(Duration::from_secs(60)),
                ..install_options()
            })
            .unwrap();

        let document = ConfigDocument::load(&host.paths.config_path).unwrap();
        assert_eq!(document.decision_timeout_ms, Some(10_000));
    }
}
