use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use feedbridge::api::{self, FeedQuery};
use feedbridge::{server, Config, Fetcher};

/// Get the default config file path (~/.config/feedbridge/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("feedbridge")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(
    name = "feedbridge",
    version,
    about = "Fetch an RSS/Atom feed and print its entries as JSON"
)]
struct Args {
    /// Config file (defaults to ~/.config/feedbridge/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert one feed and print the JSON body to stdout
    Fetch {
        /// Absolute URL of the feed
        url: String,
    },
    /// Serve the conversion endpoint over HTTP
    Serve {
        /// Listen address, overriding `listen_addr` from the config file
        #[arg(long, value_name = "ADDR")]
        listen: Option<SocketAddr>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only the JSON body
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let fetcher = Fetcher::from_config(&config).context("Failed to create HTTP client")?;

    match args.command {
        Command::Fetch { url } => {
            let response = api::handle(&fetcher, &FeedQuery::new(url)).await;
            println!("{}", response.body);
            if !response.is_success() {
                std::process::exit(1);
            }
        }
        Command::Serve { listen } => {
            let addr = match listen {
                Some(addr) => addr,
                None => config
                    .listen_addr
                    .parse()
                    .with_context(|| format!("Invalid listen_addr: {}", config.listen_addr))?,
            };
            server::run(addr, fetcher)
                .await
                .with_context(|| format!("Server on {} failed", addr))?;
        }
    }

    Ok(())
}
