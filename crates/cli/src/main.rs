use clap::{Parser, Subcommand};
use lib::api::{Backend, BackendClient};
use lib::config;
use std::path::PathBuf;

mod repl;

#[derive(Parser)]
#[command(name = "ochat")]
#[command(about = "Ollama Chat CLI", long_about = None)]
struct Cli {
    /// Config file path (default: OCHAT_CONFIG_PATH or ~/.ochat/config.json)
    #[arg(long, short, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Backend base URL (default: OCHAT_API_URL, config backend.baseUrl, or http://localhost:5000)
    #[arg(long, value_name = "URL", global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Ask the backend for its status once and print it.
    Status {
        /// Print the raw status snapshot as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show your IP as seen by the backend and which backend instance answered.
    Whoami,

    /// Chat with the backend (interactive, multiple threads). Type /help for commands.
    Chat,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("ochat {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Status { json }) => run_status(cli.config, cli.url, json).await,
        Some(Commands::Whoami) => run_whoami(cli.config, cli.url).await,
        Some(Commands::Chat) => run_chat(cli.config, cli.url).await,
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };
    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Load config and build a client; `--url` wins over env and config.
fn connect(
    config_path: Option<PathBuf>,
    url: Option<String>,
) -> anyhow::Result<(config::Config, BackendClient)> {
    let (config, path) = config::load_config(config_path)?;
    let base_url = url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| config::resolve_base_url(&config));
    log::debug!("using backend {} (config {})", base_url, path.display());
    let client = BackendClient::new(base_url).with_status_timeout(config::status_timeout(&config));
    Ok((config, client))
}

async fn run_status(
    config_path: Option<PathBuf>,
    url: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let (_, client) = connect(config_path, url)?;
    let report = lib::poller::poll_once(&client).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&report.snapshot)?);
        return Ok(());
    }
    println!("{}", repl::status_banner(&report.snapshot));
    if let Some(label) = report.backend_label() {
        println!("backend: {}", label);
    }
    if let Some(ref model) = report.snapshot.model {
        println!("model: {}", model);
    }
    Ok(())
}

async fn run_whoami(config_path: Option<PathBuf>, url: Option<String>) -> anyhow::Result<()> {
    let (_, client) = connect(config_path, url)?;
    println!("{}", lib::view::whoami_notice(&client.whoami().await));
    Ok(())
}

async fn run_chat(config_path: Option<PathBuf>, url: Option<String>) -> anyhow::Result<()> {
    let (config, client) = connect(config_path, url)?;
    println!("connecting to {} (type /help for commands)", client.base_url());
    let backend: std::sync::Arc<dyn Backend> = std::sync::Arc::new(client);
    repl::run(backend, config::poll_interval(&config)).await
}
