use clap::{Parser, Subcommand};
use std::sync::Arc;

mod echo;

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Ferry CLI: Slack bot bridge", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: FERRY_CONFIG_PATH or ~/.ferry/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the bridge with the built-in echo rules (Socket Mode needs an app token).
    Gateway {
        /// Config file path (default: FERRY_CONFIG_PATH or ~/.ferry/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Events API port (default from config or 3000)
        #[arg(long)]
        events_port: Option<u16>,

        /// Interactive-message port (default from config or 4000)
        #[arg(long)]
        interactive_port: Option<u16>,
    },

    /// Verify the bot token against Slack (auth.test).
    Check {
        /// Config file path (default: FERRY_CONFIG_PATH or ~/.ferry/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("ferry {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway {
            config,
            events_port,
            interactive_port,
        }) => {
            if let Err(e) = run_gateway(config, events_port, interactive_port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Check { config }) => {
            if let Err(e) = run_check(config).await {
                log::error!("check failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(ferry::config::default_config_path);
    let dir = ferry::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    events_port: Option<u16>,
    interactive_port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = ferry::config::load_config(config_path)?;
    if let Some(p) = events_port {
        config.gateway.events_port = p;
    }
    if let Some(p) = interactive_port {
        config.gateway.interactive_port = p;
    }
    log::info!(
        "starting gateway with config {} (events port {}, interactive port {})",
        path.display(),
        config.gateway.events_port,
        config.gateway.interactive_port
    );
    ferry::gateway::run_gateway(config, Arc::new(echo::EchoRules)).await
}

async fn run_check(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let (config, _path) = ferry::config::load_config(config_path)?;
    let bot_id = ferry::gateway::verify_bot_token(&config).await?;
    println!("bot token ok; bot user id {}", bot_id);
    Ok(())
}
