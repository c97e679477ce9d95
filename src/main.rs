use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;

#[derive(Parser)]
#[command(name = "atrium")]
#[command(version, about = "Client for the Atrium workspace platform")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Base URL of the Atrium server. Overrides ATRIUM_BASE_URL and atrium.toml
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store credentials
    Login {
        /// Email to sign in with (prompted when omitted)
        #[arg(long)]
        email: Option<String>,
    },
    /// Clear stored credentials
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List workspaces available for chat
    Workspaces,
    /// Open an interactive chat in a workspace
    Chat {
        /// Workspace id or name (picked interactively when omitted)
        workspace: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose)?;

    match &cli.command {
        Commands::Login { email } => cmd::cmd_login(&cli, email.clone()).await,
        Commands::Logout => cmd::cmd_logout(),
        Commands::Whoami => cmd::cmd_whoami(&cli).await,
        Commands::Workspaces => cmd::cmd_workspaces(&cli).await,
        Commands::Chat { workspace } => cmd::cmd_chat(&cli, workspace.clone()).await,
    }
}

/// Log to a daily file under the state directory; mirror to stderr when
/// verbose. The guard must live until exit so buffered lines flush.
fn init_logging(verbose: bool) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    use atrium::config::Config;
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_dir = Config::state_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let appender = tracing_appender::rolling::daily(&log_dir, "atrium.log");
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "atrium=debug" } else { "atrium=info" })
    });

    let stderr_layer = verbose.then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .with(stderr_layer)
        .init();

    Ok(guard)
}
