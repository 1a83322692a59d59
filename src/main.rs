use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use log::{info, warn};

use imap_count::config::default_config_path;
use imap_count::{cache, client, plot, prompt};
use imap_count::{Config, ImapAccount, ImapSecurity, Summary, TimeTable};

/// Chart when your email arrives: fetches Date headers over IMAP and plots
/// daily, hourly, weekly and punchcard views of them
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Path to config file [default: ~/.config/imap-count/config.json]
    #[clap(short, long)]
    config: Option<String>,

    /// IMAP server address
    #[clap(long)]
    host: Option<String>,

    /// IMAP server port [default: 993 for SSL, 143 otherwise]
    #[clap(short, long)]
    port: Option<u16>,

    /// IMAP security (None, StartTLS, SSL)
    #[clap(long)]
    security: Option<ImapSecurity>,

    /// IMAP username
    #[clap(short, long)]
    user: Option<String>,

    /// Folder to scan, including every mailbox below it
    #[clap(short, long)]
    folder: Option<String>,

    /// Timestamp cache file
    #[clap(long)]
    cache: Option<String>,

    /// Directory the charts are written to
    #[clap(short, long)]
    output_dir: Option<String>,

    /// Fetch from the server even when a cache file exists
    #[clap(long)]
    refresh: bool,

    /// Remember server, username and folder in the config file
    #[clap(long)]
    save_config: bool,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(if args.debug { log::LevelFilter::Debug } else { log::LevelFilter::Info })
        .init();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config_path = shellexpand::tilde(&config_path).into_owned();
    let mut config = Config::load(&config_path).unwrap_or_else(|e| {
        warn!("Ignoring config at {}: {}", config_path, e);
        Config::default()
    });
    apply_args(&mut config, &args);

    let cache_path = config.cache_path();
    let times = if !args.refresh && cache::exists(&cache_path) {
        info!("Using cached timestamps from {}", cache_path.display());
        cache::load(&cache_path)
            .with_context(|| format!("Failed to load cache {}", cache_path.display()))?
    } else {
        let times = fetch_times(&mut config)?;
        if times.is_empty() {
            warn!("No timestamps fetched, cache not written");
        } else {
            cache::save(&cache_path, &times)
                .with_context(|| format!("Failed to write cache {}", cache_path.display()))?;
        }
        times
    };
    info!("{} messages", times.len());

    if args.save_config {
        config
            .save(&config_path)
            .with_context(|| format!("Failed to save config {}", config_path))?;
        info!("Saved settings to {}", config_path);
    }

    let summary = Summary::new(&times, &Local);
    plot::render_all(&summary, &Local, &config.output_path())?;

    Ok(())
}

fn apply_args(config: &mut Config, args: &Args) {
    if args.host.is_some() {
        config.host = args.host.clone();
    }
    if args.port.is_some() {
        config.port = args.port;
    }
    if let Some(security) = args.security {
        config.security = security;
    }
    if args.user.is_some() {
        config.username = args.user.clone();
    }
    if args.folder.is_some() {
        config.folder = args.folder.clone();
    }
    if let Some(cache) = &args.cache {
        config.cache_file = cache.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
}

/// Prompt for whatever the config and flags left open, then fetch and parse.
fn fetch_times(config: &mut Config) -> Result<TimeTable> {
    let host = prompt::ask_if_missing(config.host.clone(), "Server (e.g. imap.gmail.com)", None)?;
    if host.is_empty() {
        bail!("No server given");
    }
    let username = prompt::ask_if_missing(config.username.clone(), "Username", None)?;
    let password = prompt::ask_password("Password")?;
    let folder = prompt::ask_if_missing(config.folder.clone(), "Folder (recursive)", None)?;

    config.host = Some(host.clone());
    config.username = Some(username.clone());
    config.folder = Some(folder.clone());

    let account = ImapAccount {
        host,
        port: config.effective_port(),
        security: config.security,
        username,
    };
    let dates = client::fetch_dates(&account, &password, &folder);

    Ok(TimeTable::from_date_strings(&dates, &Local))
}
