//! CleanBox command line interface.
//!
//! Manages email accounts, runs scans directly or through the job queue,
//! and rebuilds packages from stored events.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use cleanbox::db::account_repo::{self, NewAccount};
use cleanbox::db::{package_repo, scan_job_repo};
use cleanbox::extract::AssistantSettings;
use cleanbox::worker::{queue, ScanOptions};
use cleanbox::{
    load_config_or_default, AccountScanner, Aggregator, Config, Database, GmailClient,
    OpenAiAssistantClient, ScanQueue, TokenEncryptor,
};

#[derive(Parser)]
#[command(name = "cleanbox")]
#[command(about = "Extract promo codes and package tracking from Gmail", long_about = None)]
struct Cli {
    /// Path to config.json (defaults to ~/.cleanbox/config.json)
    #[arg(short, long, global = true, env = "CLEANBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage email accounts
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },
    /// Scan an account immediately, without the queue
    Scan { account_id: i64 },
    /// Queue a scan job for an account
    Enqueue { account_id: i64 },
    /// Queue scan jobs for every account with auto-scan enabled
    ScanAuto,
    /// Process queued scan jobs until interrupted
    Worker {
        /// Process due jobs once and exit
        #[arg(long)]
        once: bool,
    },
    /// Aggregate orphan package events into packages
    Aggregate { account_id: i64 },
    /// Delete an account's packages and aggregate from scratch
    Rebuild { account_id: i64 },
    /// List an account's packages
    Packages { account_id: i64 },
    /// List recent scan jobs
    Jobs {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Register a Gmail account with existing OAuth tokens
    Add {
        /// Mailbox address, for display only
        #[arg(long)]
        email: Option<String>,
        #[arg(long, env = "CLEANBOX_ACCESS_TOKEN", hide_env_values = true)]
        access_token: String,
        #[arg(long, env = "CLEANBOX_REFRESH_TOKEN", hide_env_values = true)]
        refresh_token: Option<String>,
        /// Seconds until the access token expires
        #[arg(long)]
        expires_in: Option<i64>,
        /// Move processed messages to the Gmail trash
        #[arg(long)]
        auto_delete: bool,
        /// Include the account in `scan-auto`
        #[arg(long)]
        auto_scan: bool,
    },
    /// List registered accounts
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    let config = load_config_or_default(cli.config.as_deref()).context("Failed to load config")?;
    let db_path = config
        .database
        .resolve_path()
        .context("Could not determine the database path")?;
    let db = Database::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    match cli.command {
        Commands::Account { command } => match command {
            AccountCommands::Add {
                email,
                access_token,
                refresh_token,
                expires_in,
                auto_delete,
                auto_scan,
            } => {
                let encryptor = TokenEncryptor::from_env()?;
                let account = NewAccount {
                    provider: "gmail".to_string(),
                    email,
                    access_token: encryptor.encrypt(&access_token)?,
                    refresh_token: encryptor.encrypt_optional(refresh_token.as_deref())?,
                    token_expiry: expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
                    auto_delete_emails: auto_delete,
                    auto_scan_enabled: auto_scan,
                };
                let id = account_repo::insert(&db, &account)?;
                println!("Added account {}", id);
            }
            AccountCommands::List => {
                for account in account_repo::list(&db)? {
                    println!(
                        "{:>4}  {:<32}  auto-scan={:<5}  auto-delete={:<5}  last-auto-scan={}",
                        account.id,
                        account.email.as_deref().unwrap_or("-"),
                        account.auto_scan_enabled,
                        account.auto_delete_emails,
                        account
                            .last_auto_scan_at
                            .map(|at| at.to_rfc3339())
                            .unwrap_or_else(|| "never".to_string()),
                    );
                }
            }
        },
        Commands::Scan { account_id } => {
            let scanner = build_scanner(&config, &db)?;
            let processed = scanner.scan(account_id).await?;
            println!("Processed {} messages", processed);
        }
        Commands::Enqueue { account_id } => {
            let job_id = queue::enqueue(&db, account_id)?;
            println!("Queued scan job {}", job_id);
        }
        Commands::ScanAuto => {
            let jobs = queue::enqueue_auto_scans(&db)?;
            println!("Queued {} scan jobs", jobs.len());
        }
        Commands::Worker { once } => {
            let scan_queue = build_queue(&config, &db)?;
            if once {
                while let Some(job_id) = scan_queue.process_next().await? {
                    info!(job_id, "Processed scan job");
                }
            } else {
                let shutdown = Arc::new(AtomicBool::new(false));
                let flag = Arc::clone(&shutdown);
                ctrlc::set_handler(move || {
                    warn!("Shutdown requested");
                    flag.store(true, Ordering::Relaxed);
                })
                .context("Failed to install signal handler")?;
                scan_queue.run(shutdown).await;
            }
        }
        Commands::Aggregate { account_id } => {
            let created = Aggregator::new(db.clone()).aggregate(account_id)?;
            println!("Created {} packages", created);
        }
        Commands::Rebuild { account_id } => {
            let created = Aggregator::new(db.clone()).rebuild(account_id)?;
            println!("Rebuilt {} packages", created);
        }
        Commands::Packages { account_id } => {
            for package in package_repo::list_by_account(&db, account_id)? {
                println!(
                    "{:<20}  {:<14}  {:<24}  {:<10}  {}",
                    package.order_number,
                    package.status,
                    package.tracking_number,
                    package.carrier.as_deref().unwrap_or("-"),
                    package
                        .item_name
                        .as_deref()
                        .or(package.brand.as_deref())
                        .unwrap_or("-"),
                );
            }
        }
        Commands::Jobs { limit } => {
            for job in scan_job_repo::list_recent(&db, limit)? {
                println!(
                    "{:>5}  account={:<4}  {:<11}  attempts={:<2}  scanned={:<5}  retry={:<25}  {}",
                    job.id,
                    job.email_account_id,
                    job.status,
                    job.attempts,
                    job.emails_scanned
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    job.retry_at
                        .map(|at| at.to_rfc3339())
                        .unwrap_or_else(|| "-".to_string()),
                    job.error.as_deref().unwrap_or(""),
                );
            }
        }
    }

    Ok(())
}

/// Installs the tracing subscriber and routes `log` records into it.
fn init_tracing(json: bool) -> Result<()> {
    LogTracer::init().context("Failed to bridge log records")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))?;
    } else {
        tracing::subscriber::set_global_default(registry.with(fmt::layer().with_target(true)))?;
    }
    Ok(())
}

fn build_scanner(config: &Config, db: &Database) -> Result<AccountScanner> {
    if config.openai.promo_assistant_id.is_none() && config.openai.package_assistant_id.is_none() {
        bail!("No OpenAI assistant configured (openai.promoAssistantId / openai.packageAssistantId)");
    }

    let client_secret = config.gmail.resolve_client_secret()?;
    let gmail = GmailClient::new(&config.gmail, client_secret)?;

    let api_key = config.openai.resolve_api_key()?;
    let extractor = OpenAiAssistantClient::new(AssistantSettings::from_config(&config.openai, api_key))?;

    let encryptor = TokenEncryptor::from_env()?;
    info!(
        categories = ?ScanOptions::from_config(&config.gmail).categories,
        "Scanner ready"
    );

    Ok(AccountScanner::new(
        db.clone(),
        Arc::new(gmail),
        Arc::new(extractor),
        Arc::new(encryptor),
        Aggregator::new(db.clone()),
        config,
    ))
}

fn build_queue(config: &Config, db: &Database) -> Result<ScanQueue> {
    let scanner = build_scanner(config, db)?;
    Ok(ScanQueue::new(db.clone(), Arc::new(scanner), &config.queue))
}
