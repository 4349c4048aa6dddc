use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use feedsift::config::Config;
use feedsift::feed::{Dispatcher, FormatRegistry, ParseContext, ParseOutcome};
use feedsift::fetch::build_client;
use feedsift::model::{Feed, FetchErrorKind, Item, Subscription};
use feedsift::storage::{Database, DatabaseError};
use feedsift::update::{UpdateQueue, UpdateRequest, Updater};
use feedsift::util::validate_source_url;

/// Largest local file accepted by `parse` (same bound as downloads)
const MAX_PARSE_FILE: u64 = 10 * 1024 * 1024;

/// Get the config directory path (~/.config/feedsift/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedsift"))
}

#[derive(Parser, Debug)]
#[command(
    name = "feedsift",
    version,
    about = "Detect, parse and deduplicate RSS, Atom, LD+JSON and HTML5 feeds"
)]
struct Args {
    /// Config file (default: ~/.config/feedsift/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a feed or web page and fetch it once
    Add {
        url: String,
    },
    /// Fetch subscriptions and merge new items
    Update {
        /// Only this subscription (manual refresh, re-arms auto-discovery)
        #[arg(long, conflicts_with = "all")]
        id: Option<i64>,
        /// Every subscription (the default)
        #[arg(long)]
        all: bool,
    },
    /// List subscriptions, or the items of one subscription
    List {
        #[arg(long, value_name = "ID")]
        items: Option<i64>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Run format detection on a local file and print the result as JSON
    Parse {
        file: PathBuf,
        /// Page URL used to resolve relative links
        #[arg(long)]
        url: Option<String>,
    },
}

#[derive(Serialize)]
struct ParseReport<'a> {
    success: bool,
    format: Option<&'static str>,
    redirect: Option<String>,
    error: FetchErrorKind,
    feed: &'a Feed,
    items: Vec<Item>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so `parse` output stays valid JSON
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // `parse` is a dry run and never touches the database
    if let Command::Parse { file, url } = &args.command {
        return parse_file(file, url.as_deref());
    }

    let db = open_database(&config, &config_dir).await?;
    let client = build_client(&config.user_agent).context("Failed to build HTTP client")?;
    let updater = Updater::new(&db, &client, config.fetch_options(), config.max_items_per_feed);

    match args.command {
        Command::Add { url } => {
            let url = validate_source_url(url.trim(), config.allow_private_hosts)
                .with_context(|| format!("Refusing to subscribe to '{url}'"))?;
            let id = db.add_subscription(url.as_str()).await?;
            println!("Subscribed [{id}] {url}");

            let mut queue = UpdateQueue::new();
            queue.schedule(UpdateRequest::new(id, url.as_str()).manual());
            for report in updater.run(&mut queue).await? {
                println!("{report}");
            }
        }
        Command::Update { id, all: _ } => {
            let mut queue = UpdateQueue::new();
            match id {
                Some(id) => {
                    let (sub, _) = db
                        .get_subscription(id)
                        .await?
                        .with_context(|| format!("No subscription with id {id}"))?;
                    queue.schedule(UpdateRequest::new(sub.id, sub.source).manual());
                }
                None => {
                    for (sub, _) in db.list_subscriptions().await? {
                        queue.schedule(UpdateRequest::new(sub.id, sub.source));
                    }
                }
            }
            if queue.is_empty() {
                println!("Nothing to update. Add a subscription with `feedsift add <URL>`.");
            }
            for report in updater.run(&mut queue).await? {
                println!("{report}");
            }
        }
        Command::List { items: Some(id), limit } => {
            for item in db.get_items_for_node(id, limit).await? {
                let when = item
                    .time
                    .and_then(|t| chrono::DateTime::from_timestamp(t, 0))
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".repeat(16));
                println!(
                    "{when}  {}  {}",
                    item.title.as_deref().unwrap_or("(untitled)"),
                    item.source.as_deref().unwrap_or("")
                );
            }
        }
        Command::List { items: None, .. } => {
            for (sub, feed) in db.list_subscriptions().await? {
                println!(
                    "[{}] {} ({}) {} error={}",
                    sub.id,
                    feed.title.as_deref().unwrap_or("(untitled)"),
                    feed.format.as_deref().unwrap_or("?"),
                    sub.source,
                    sub.error.as_str()
                );
            }
        }
        Command::Parse { .. } => {}
    }

    Ok(())
}

async fn open_database(config: &Config, config_dir: &Path) -> Result<Database> {
    let db_path = match &config.database_path {
        Some(path) => path.clone(),
        None => {
            if !config_dir.exists() {
                std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;
                // SEC-007: user-only access
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let perms = std::fs::Permissions::from_mode(0o700);
                    if let Err(e) = std::fs::set_permissions(config_dir, perms) {
                        tracing::warn!(
                            path = %config_dir.display(),
                            error = %e,
                            "Failed to set config directory permissions to 0700"
                        );
                    }
                }
            }
            config_dir.join("feeds.db")
        }
    };

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(db_path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of feedsift appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

fn parse_file(file: &Path, url: Option<&str>) -> Result<()> {
    // SEC-008: Canonicalize to resolve symlinks
    let canonical = file
        .canonicalize()
        .with_context(|| format!("Failed to resolve file: {}", file.display()))?;
    let metadata = std::fs::metadata(&canonical)?;
    if !metadata.is_file() {
        anyhow::bail!("Path must be a regular file");
    }
    if metadata.len() > MAX_PARSE_FILE {
        anyhow::bail!("File is {} bytes (max {} bytes)", metadata.len(), MAX_PARSE_FILE);
    }
    let data = std::fs::read(&canonical)
        .with_context(|| format!("Failed to read file: {}", canonical.display()))?;

    let source = match url {
        Some(url) => url.to_owned(),
        None => url::Url::from_file_path(&canonical)
            .map(|u| u.to_string())
            .map_err(|_| anyhow::anyhow!("Cannot express {} as a URL", canonical.display()))?,
    };

    let registry = FormatRegistry::standard();
    let mut queue = UpdateQueue::new();
    let mut sub = Subscription::new(0, source);
    let mut feed = Feed::new(0);

    let (outcome, items) = {
        let mut ctx = ParseContext::new(&mut sub, &mut feed, &data);
        let outcome = Dispatcher::new(&registry).parse(&mut ctx, &mut queue);
        (outcome, ctx.into_items())
    };

    let report = ParseReport {
        success: outcome.is_success(),
        format: outcome.handler().map(|h| h.type_id()),
        redirect: match &outcome {
            ParseOutcome::Redirected(target) => Some(target.clone()),
            _ => None,
        },
        error: sub.error,
        feed: &feed,
        items,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
