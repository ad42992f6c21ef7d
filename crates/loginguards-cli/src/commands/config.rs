use anyhow::Result;

use loginguards_core::{ConfigDocument, MachinePaths};

use super::load_policy;

pub fn print_effective(paths: &MachinePaths) -> Result<()> {
    let config = load_policy(paths)?;
    // Presence only; the blob is never decrypted here.
    let credential = ConfigDocument::load(&paths.config_path)?
        .api_key_enc
        .map(|blob| format!("configured ({})", blob.scheme))
        .unwrap_or_else(|| "absent".to_string());

    println!("config file:      {}", paths.config_path.display());
    println!("fail mode:        {}", config.fail_mode);
    println!("pipe endpoint:    {}", config.pipe_endpoint);
    println!("decision timeout: {} ms", config.decision_timeout.as_millis());
    println!("log username:     {}", config.log_username);
    println!("API base URL:     {}", config.api_base_url);
    println!("reload interval:  {} s", config.reload_interval.as_secs());
    println!("API credential:   {credential}");
    Ok(())
}
