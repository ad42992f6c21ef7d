use std::fmt::Write as _;

use anyhow::Result;

use loginguards_core::MachinePaths;
use system_integration::{InstallOptions, IntegrationReport, UninstallOptions};

pub fn install(paths: &MachinePaths, options: InstallOptions) -> Result<()> {
    let report = platform::install(paths, &options)?;
    print!("{}", render_report("Install", &report));
    Ok(())
}

pub fn uninstall(paths: &MachinePaths, options: UninstallOptions) -> Result<()> {
    let report = platform::uninstall(paths, &options)?;
    print!("{}", render_report("Uninstall", &report));
    Ok(())
}

pub(crate) fn render_report(title: &str, report: &IntegrationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{title} complete.");
    if let Some(role) = report.host_role {
        let _ = writeln!(out, "  host role: {role}");
    }
    for step in &report.steps {
        let _ = writeln!(out, "  {:<28} {}", step.step.to_string(), step.outcome);
    }
    if report.reboot_requested {
        let _ = writeln!(out, "Rebooting now.");
    } else if report.reboot_required {
        let _ = writeln!(
            out,
            "A reboot is required before the password filter change takes effect."
        );
    }
    out
}

#[cfg(windows)]
mod platform {
    use anyhow::Result;

    use loginguards_core::{CredentialStore, MachinePaths};
    use system_integration::deploy::bundled_binary_beside_current_exe;
    use system_integration::windows::{WindowsServices, WindowsSystem};
    use system_integration::{
        InstallOptions, IntegrationManager, IntegrationReport, ServiceSpec, UninstallOptions,
    };

    fn with_manager<T>(
        paths: &MachinePaths,
        run: impl FnOnce(&IntegrationManager<'_>) -> Result<T>,
    ) -> Result<T> {
        let system = WindowsSystem::new();
        let services = WindowsServices::new(ServiceSpec::NAME);
        let manager = IntegrationManager::new(
            &system,
            &services,
            paths.clone(),
            CredentialStore::for_machine(paths),
            ServiceSpec::beside_current_exe()?,
        )
        .with_bundled_binary(bundled_binary_beside_current_exe());
        run(&manager)
    }

    pub fn install(paths: &MachinePaths, options: &InstallOptions) -> Result<IntegrationReport> {
        with_manager(paths, |manager| Ok(manager.install(options)?))
    }

    pub fn uninstall(paths: &MachinePaths, options: &UninstallOptions) -> Result<IntegrationReport> {
        with_manager(paths, |manager| Ok(manager.uninstall(options)?))
    }
}

#[cfg(not(windows))]
mod platform {
    use anyhow::Result;

    use loginguards_core::MachinePaths;
    use system_integration::{InstallOptions, IntegrationError, IntegrationReport, UninstallOptions};

    pub fn install(_paths: &MachinePaths, _options: &InstallOptions) -> Result<IntegrationReport> {
        Err(IntegrationError::UnsupportedPlatform.into())
    }

    pub fn uninstall(_paths: &MachinePaths, _options: &UninstallOptions) -> Result<IntegrationReport> {
        Err(IntegrationError::UnsupportedPlatform.into())
    }
}
