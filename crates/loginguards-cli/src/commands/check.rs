use std::io::Write;

use anyhow::{anyhow, bail, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use zeroize::Zeroizing;

use breach_client::HttpBreachClient;
use loginguards_core::{MachinePaths, SecretString};
use policy_engine::BreachChecker;

use super::{load_credential, load_policy};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub checked: usize,
    pub compromised: usize,
    pub failed: usize,
}

/// Checks each non-empty line and writes one verdict per line to `out`.
/// Passwords are never written back; lines are identified by number.
pub async fn check_lines<R, W>(
    input: R,
    checker: &dyn BreachChecker,
    credential: &SecretString,
    timeout: std::time::Duration,
    out: &mut W,
) -> Result<CheckSummary>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut summary = CheckSummary::default();
    let mut lines = input.lines();
    let mut number = 0usize;
    while let Some(line) = lines.next_line().await? {
        number += 1;
        let line = Zeroizing::new(line);
        let password = line.trim_end_matches('\r');
        if password.is_empty() {
            continue;
        }
        summary.checked += 1;
        match checker
            .check(&SecretString::from(password), credential, timeout)
            .await
        {
            Ok(verdict) if verdict.compromised => {
                summary.compromised += 1;
                writeln!(out, "{number}: COMPROMISED")?;
            }
            Ok(_) => writeln!(out, "{number}: NOT COMPROMISED")?,
            Err(err) => {
                summary.failed += 1;
                writeln!(out, "{number}: ERROR ({err})")?;
            }
        }
    }
    Ok(summary)
}

pub async fn execute(paths: &MachinePaths, from_stdin: bool) -> Result<()> {
    let config = load_policy(paths)?;
    let credential = load_credential(paths)?
        .ok_or_else(|| anyhow!("no API key configured; run `loginguards configure` first"))?;
    let client = HttpBreachClient::new(&config.api_base_url)?;

    if !from_stdin {
        eprintln!("Enter one password per line; end with Ctrl-D (Ctrl-Z on Windows).");
    }
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let summary = check_lines(
        stdin,
        &client,
        &credential,
        config.decision_timeout.max(std::time::Duration::from_secs(5)),
        &mut stdout,
    )
    .await?;

    if summary.failed > 0 {
        bail!("{} of {} checks failed", summary.failed, summary.checked);
    }
    Ok(())
}
