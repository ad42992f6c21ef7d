//! `loginguards test`: walks the whole decision path once.

use anyhow::{bail, Result};

use breach_client::HttpBreachClient;
use loginguards_core::ipc::send_request;
use loginguards_core::MachinePaths;

use super::pipe_test::random_test_password;
use super::{load_credential, load_policy};

#[cfg(windows)]
fn service_status() -> String {
    use system_integration::windows::WindowsServices;
    use system_integration::{ServiceControl, ServiceSpec, ServiceState};

    match WindowsServices::new(ServiceSpec::NAME).status() {
        Ok(ServiceState::Running) => "running".to_string(),
        Ok(ServiceState::Stopped) => "stopped".to_string(),
        Ok(ServiceState::NotInstalled) => "not installed".to_string(),
        Err(err) => format!("unknown ({err})"),
    }
}

#[cfg(not(windows))]
fn service_status() -> String {
    "not managed on this platform".to_string()
}

pub async fn execute(paths: &MachinePaths) -> Result<()> {
    let config = load_policy(paths)?;
    let mut problems = 0;

    println!("service:        {}", service_status());

    let credential = match load_credential(paths) {
        Ok(credential) => credential,
        Err(err) => {
            println!("API credential: unreadable ({err:#})");
            problems += 1;
            None
        }
    };
    match &credential {
        Some(_) => println!("API credential: configured"),
        None => {
            println!("API credential: absent");
            problems += 1;
        }
    }

    let client = HttpBreachClient::new(&config.api_base_url)?;
    if client.ping(credential.as_ref()).await {
        println!("API:            reachable ({})", client.base_url());
    } else {
        println!("API:            unreachable ({})", client.base_url());
        problems += 1;
    }

    match send_request(&config.pipe_endpoint, &random_test_password(), None).await {
        Ok(response) => {
            println!(
                "decision:       allow={} reason={}",
                response.allow, response.reason
            );
            if response.reason != loginguards_core::Reason::Ok {
                problems += 1;
            }
        }
        Err(err) => {
            println!("decision:       failed ({err})");
            problems += 1;
        }
    }

    if problems > 0 {
        bail!("{problems} check(s) did not pass");
    }
    println!("All checks passed.");
    Ok(())
}
