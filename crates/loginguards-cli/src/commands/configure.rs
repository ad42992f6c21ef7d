use std::io::{self, BufRead, IsTerminal};

use anyhow::{bail, Context, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::Password;
use zeroize::Zeroizing;

use breach_client::HttpBreachClient;
use loginguards_core::{CredentialStore, MachinePaths, SecretString};

use super::load_policy;

pub const API_KEY_ENV: &str = "LOGINGUARDS_API_KEY";

fn read_line(input: &mut impl BufRead) -> Result<SecretString> {
    let mut line = Zeroizing::new(String::new());
    input.read_line(&mut line).context("read API key")?;
    Ok(SecretString::from(line.trim()))
}

/// The key from stdin when asked, else from the environment, else a masked prompt.
fn obtain_key(from_stdin: bool) -> Result<SecretString> {
    let from_env = std::env::var(API_KEY_ENV).ok().map(Zeroizing::new);
    let interactive = io::stdin().is_terminal();
    select_key(
        from_stdin,
        from_env,
        interactive,
        &mut io::stdin().lock(),
        masked_prompt,
    )
}

fn select_key(
    from_stdin: bool,
    from_env: Option<Zeroizing<String>>,
    interactive: bool,
    input: &mut impl BufRead,
    prompt: impl FnOnce() -> Result<Zeroizing<String>>,
) -> Result<SecretString> {
    if from_stdin {
        return read_line(input);
    }
    if let Some(value) = from_env {
        return Ok(SecretString::from(value.trim()));
    }
    if !interactive {
        return read_line(input);
    }
    let typed = prompt()?;
    Ok(SecretString::from(typed.trim()))
}

fn masked_prompt() -> Result<Zeroizing<String>> {
    let typed = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("LoginGuards API key")
        .interact()
        .context("read API key")?;
    Ok(Zeroizing::new(typed))
}

pub async fn execute(paths: &MachinePaths, api_key_stdin: bool) -> Result<()> {
    let key = obtain_key(api_key_stdin)?;
    if key.is_blank() {
        bail!("no API key given");
    }
    CredentialStore::for_machine(paths)
        .save(&key)
        .context("store API key")?;
    println!("API key stored in {}", paths.config_path.display());

    let config = load_policy(paths)?;
    let client = HttpBreachClient::new(&config.api_base_url)?;
    if client.ping(Some(&key)).await {
        println!("API reachable at {}", client.base_url());
    } else {
        println!(
            "warning: could not reach {} (key saved anyway)",
            client.base_url()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_line_trims_newline_and_spaces() {
        let mut input = io::Cursor::new(b"  lg_key_123 \r\nignored\n".to_vec());
        assert_eq!(read_line(&mut input).unwrap().expose_secret(), "lg_key_123");
    }

    #[test]
    fn test_read_line_on_empty_input_is_blank() {
        let mut input = io::Cursor::new(Vec::new());
        assert!(read_line(&mut input).unwrap().is_blank());
    }

    #[test]
    fn test_terminal_input_goes_through_masked_prompt() {
        let mut input = io::Cursor::new(b"typed-in-clear\n".to_vec());
        let key = select_key(false, None, true, &mut input, || {
            Ok(Zeroizing::new(" lg_masked ".to_string()))
        })
        .unwrap();
        assert_eq!(key.expose_secret(), "lg_masked");
        assert_eq!(input.position(), 0);
    }

    #[test]
    fn test_stdin_flag_and_environment_skip_the_prompt() {
        let mut input = io::Cursor::new(b"lg_from_stdin\n".to_vec());
        let key = select_key(
            true,
            Some(Zeroizing::new("lg_from_env".to_string())),
            true,
            &mut input,
            || panic!("prompt must not run"),
        )
        .unwrap();
        assert_eq!(key.expose_secret(), "lg_from_stdin");

        let mut input = io::Cursor::new(Vec::new());
        let key = select_key(
            false,
            Some(Zeroizing::new("lg_from_env\n".to_string())),
            true,
            &mut input,
            || panic!("prompt must not run"),
        )
        .unwrap();
        assert_eq!(key.expose_secret(), "lg_from_env");

        let mut input = io::Cursor::new(b"lg_piped\n".to_vec());
        let key = select_key(false, None, false, &mut input, || panic!("prompt must not run"))
            .unwrap();
        assert_eq!(key.expose_secret(), "lg_piped");
    }
}
