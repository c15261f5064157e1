mod console;

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use unbrick_core::artifacts;
use unbrick_core::profile::{Model, profile_for};
use unbrick_core::session::{RecoverySession, SessionConfig, SessionOutcome};
use unbrick_core::tools::{DeviceTools, HostTools, Platform};

use console::ConsoleOperator;

#[derive(Parser, Debug)]
#[command(author, version, about = "iPod Nano 6G/7G unbrick tool", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to a TOML session config; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the per-model firmware files
    #[arg(long)]
    firmware_dir: Option<PathBuf>,

    /// Directory holding the bundled external tools (Windows)
    #[arg(long, default_value = "misc")]
    tool_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the recovery flow for a model
    Recover {
        /// Target model: 6g or 7g
        model: Model,

        /// Probe window per stage, in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Skip the firmware download step
        #[arg(long)]
        no_fetch: bool,

        /// Run without admin/root privileges
        #[arg(long)]
        allow_unprivileged: bool,
    },
    /// Download and extract the firmware archives for a model
    Fetch {
        /// Target model: 6g or 7g
        model: Model,
    },
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)?,
        None => SessionConfig::default(),
    };
    if let Some(dir) = args.firmware_dir {
        config.firmware_dir = dir;
    }

    match args.command {
        Command::Fetch { model } => {
            let profile = profile_for(model);
            artifacts::fetch_for_profile(&config.firmware_dir, profile)?;
            artifacts::ensure_for_profile(&config.firmware_dir, profile)?;
            info!(model = %profile.display_name, "firmware ready");
            Ok(())
        }
        Command::Recover {
            model,
            timeout,
            no_fetch,
            allow_unprivileged,
        } => {
            if let Some(secs) = timeout {
                config.probe_timeout_secs = secs;
            }
            let profile = profile_for(model);
            let tools = HostTools::new(args.tool_dir);

            if !tools.is_elevated() {
                if !allow_unprivileged {
                    match tools.platform() {
                        Platform::Unix => {
                            bail!("raw disk access requires root; re-run with sudo")
                        }
                        Platform::Windows => bail!(
                            "raw disk access requires administrator rights; \
                             re-run from an elevated prompt"
                        ),
                    }
                }
                warn!("running without elevation; device access will likely fail");
            }

            if !no_fetch {
                if let Err(e) = artifacts::fetch_for_profile(&config.firmware_dir, profile) {
                    warn!(error = %e, "firmware fetch failed; continuing with local files");
                }
            }

            let mut session = RecoverySession::new(config, tools, ConsoleOperator);
            match session.run(profile) {
                SessionOutcome::Completed => {
                    info!("recovery finished");
                    Ok(())
                }
                SessionOutcome::Aborted => {
                    info!("recovery aborted by operator");
                    Ok(())
                }
                SessionOutcome::Failed(reason) => bail!("recovery failed: {reason}"),
            }
        }
    }
}
