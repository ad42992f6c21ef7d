use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use loginguards_core::{FailMode, MachinePaths};
use system_integration::{InstallOptions, UninstallOptions};

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "loginguards",
    version,
    about = "Blocks breached passwords at the domain controller"
)]
struct Cli {
    /// Machine data directory (defaults to LOGINGUARDS_HOME or %PROGRAMDATA%\LoginGuards).
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install the decision service and, on a domain controller, the password filter
    Install {
        #[arg(long, default_value_t = FailMode::FailClosed)]
        fail_mode: FailMode,
        #[arg(long)]
        pipe_endpoint: Option<String>,
        #[arg(long)]
        log_username: bool,
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
        /// Filter binary to deploy instead of the bundled one
        #[arg(long, value_name = "PATH")]
        binary: Option<PathBuf>,
        /// Reboot right away if the change needs one
        #[arg(long)]
        reboot: bool,
    },
    /// Remove everything `install` put in place
    Uninstall {
        #[arg(long)]
        reboot: bool,
    },
    /// Store the API key for the decision service
    Configure {
        /// Read the key from the first line of stdin
        #[arg(long)]
        api_key_stdin: bool,
    },
    /// Check passwords directly against the breach API
    Check {
        /// Read newline-separated passwords from stdin
        #[arg(long)]
        stdin: bool,
    },
    /// Ask the running decision service about one password
    PipeTest {
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        username: Option<String>,
    },
    /// End-to-end health check
    Test,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let paths = match cli.home {
        Some(home) => MachinePaths::under(home),
        None => MachinePaths::resolve()?,
    };

    match cli.command {
        Commands::Install {
            fail_mode,
            pipe_endpoint,
            log_username,
            timeout_ms,
            binary,
            reboot,
        } => commands::install::install(
            &paths,
            InstallOptions {
                fail_mode,
                pipe_endpoint,
                log_username,
                decision_timeout: timeout_ms.map(Duration::from_millis),
                binary_path: binary,
                reboot,
            },
        ),
        Commands::Uninstall { reboot } => {
            commands::install::uninstall(&paths, UninstallOptions { reboot })
        }
        Commands::Configure { api_key_stdin } => {
            commands::configure::execute(&paths, api_key_stdin).await
        }
        Commands::Check { stdin } => commands::check::execute(&paths, stdin).await,
        Commands::PipeTest { password, username } => {
            commands::pipe_test::execute(&paths, password, username).await
        }
        Commands::Test => commands::diagnose::execute(&paths).await,
        Commands::Config => commands::config::print_effective(&paths),
    }
}
