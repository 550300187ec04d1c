use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use marketplace_uploader::commands::{self, ListingKind, LocalFile, UploadProgress, UploadResult, UploadTask};
use marketplace_uploader::config;
use marketplace_uploader::errors::AppError;
use marketplace_uploader::session::FileSessionStore;
use marketplace_uploader::uploader::MarketplaceClient;

#[derive(Parser, Debug)]
#[command(name = "marketplace-uploader", version, about = "Upload listing photos to the marketplace")]
struct Cli {
    /// Override the configured API base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the access token
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Upload photos to an existing listing
    Upload {
        #[arg(long, value_enum)]
        kind: Option<ListingKind>,
        #[arg(long)]
        listing_id: Option<i64>,
        /// Retry failed files up to this many extra rounds
        #[arg(long, default_value_t = 0)]
        retry_failed: u32,
        files: Vec<String>,
    },
    /// Delete a listing whose photo step was abandoned
    Delete {
        #[arg(long, value_enum)]
        kind: ListingKind,
        #[arg(long)]
        listing_id: i64,
    },
}

fn print_progress(progress: UploadProgress) {
    println!(
        "[{:>3.0}%] {} of {} - {}",
        progress.percentage(),
        progress.uploaded,
        progress.total,
        progress.current
    );
}

fn report(result: &UploadResult) {
    if result.is_complete() {
        println!("All {} images uploaded successfully!", result.succeeded_urls.len());
    } else {
        println!(
            "{} of {} images uploaded successfully. {} failed.",
            result.succeeded_urls.len(),
            result.total,
            result.failed_files.len()
        );
        for failed in &result.failed_files {
            println!("  failed: {} ({})", failed.name, failed.error);
        }
    }
    for url in &result.succeeded_urls {
        println!("{}", url);
    }
}

async fn run_upload(
    client: &MarketplaceClient,
    task: UploadTask,
    retry_rounds: u32,
) -> anyhow::Result<UploadResult> {
    let mut result = commands::upload_photos(client, &task, print_progress).await?;

    let mut round = 0;
    while result.is_partial() && round < retry_rounds {
        round += 1;
        log::info!("Retry round {} of {}", round, retry_rounds);
        result = match commands::retry_failed_photos(client, &task, result.clone(), print_progress).await {
            Ok(merged) => merged,
            Err(e) if e.is_precondition() => return Err(e.into()),
            Err(e) => {
                log::warn!("Retry round {} failed: {}", round, e);
                result
            }
        };
    }

    Ok(result)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging before the config loads so its warnings are shown.
    // Without RUST_LOG the configured level is applied once the config is read.
    let level_from_env = std::env::var_os("RUST_LOG").is_some();
    let base_level = if level_from_env {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Trace
    };
    env_logger::Builder::new()
        .filter_level(base_level)
        .parse_default_env()
        .init();
    if !level_from_env {
        log::set_max_level(log::LevelFilter::Info);
    }

    log::info!("Starting marketplace uploader");

    let mut app_config = config::load_config().context("loading configuration")?;
    if !level_from_env {
        log::set_max_level(app_config.log_level_filter());
    }

    if let Some(url) = cli.api_url {
        app_config.api_base_url = url;
    }

    let session = Arc::new(FileSessionStore::in_data_directory()?);
    let client = MarketplaceClient::new(&app_config, session)?;

    match cli.command {
        Command::Login { username, password } => {
            let session = commands::login(&client, &username, &password).await?;
            println!("Logged in as user {}", session.user_id);
            if !session.has_role("seller") {
                println!("This account has no seller role, so it cannot create listings");
            }
        }
        Command::Logout => {
            commands::logout(&client).await?;
            println!("Logged out");
        }
        Command::Delete { kind, listing_id } => {
            commands::delete_listing(&client, kind, listing_id).await?;
            println!("Deleted {} listing {}", kind, listing_id);
        }
        Command::Upload {
            kind,
            listing_id,
            retry_failed,
            files,
        } => {
            let kind = kind
                .or(app_config.last_listing_kind)
                .ok_or_else(|| AppError::validation("kind", "Pass --kind mobile|laptop|car"))?;
            let task = UploadTask {
                listing_id,
                kind,
                files: files.iter().map(|f| LocalFile::from_path(f)).collect(),
            };

            // Dropping the batch future on Ctrl-C abandons the remaining files.
            let result = tokio::select! {
                result = run_upload(&client, task, retry_failed) => result?,
                _ = tokio::signal::ctrl_c() => {
                    log::warn!("Upload interrupted");
                    anyhow::bail!("upload interrupted");
                }
            };

            report(&result);

            if app_config.last_listing_kind != Some(kind) {
                app_config.last_listing_kind = Some(kind);
                if let Err(e) = config::save_config(&app_config) {
                    log::warn!("Failed to remember listing kind: {}", e);
                }
            }
        }
    }

    Ok(())
}
