use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use futures_util::StreamExt;
use log::{warn, LevelFilter};

use vsix_downloader::config::Config;
use vsix_downloader::download::task::{TaskId, TaskState};
use vsix_downloader::logger::setup_logger;
use vsix_downloader::marketplace::SearchQuery;
use vsix_downloader::{Extension, Session};

use crate::cli::{CliArgs, Command};
use crate::progress_bar::{byte_unit, ProgressBar};

mod cli;
mod progress_bar;

const BAR_WIDTH: usize = 100;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let level = if args.verbose { LevelFilter::Debug } else { LevelFilter::Warn };
    setup_logger(level, args.log_file.as_deref())?;

    let config = load_config(&args.config)?;
    let session = Session::start(&config).context("Invalid marketplace configuration")?;

    match args.command {
        Command::Search { term, publisher, limit } => search(&session, &config, term, publisher, limit).await,
        Command::Download { identifiers, version, out } => {
            let out = out.unwrap_or_else(|| config.download.download_dir.clone());
            download(&session, &identifiers, version.as_deref(), &out).await
        }
    }
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::load_from_file(path)
    } else {
        Ok(Config::default())
    }
}

async fn search(session: &Session, config: &Config, term: String, publisher: bool, limit: Option<usize>) -> Result<()> {
    let mut query = SearchQuery::new(term)
        .page_size(config.marketplace.page_size())
        .max_results(limit.unwrap_or(config.marketplace.max_results));
    if publisher {
        query = query.by_publisher();
    }

    let extensions = session.search_query(&query).await?;
    if extensions.is_empty() {
        println!("No extensions found.");
        return Ok(());
    }

    for extension in extensions {
        println!(
            "{:<48} {:<16} {}",
            extension.identifier(),
            extension.version(),
            extension.display_name().unwrap_or_default()
        );
    }

    Ok(())
}

async fn find_extension(session: &Session, identifier: &str) -> Result<Extension> {
    if !identifier.contains('.') {
        return Err(anyhow!("Expected publisher.name, got {}", identifier));
    }
    let query = SearchQuery::new(identifier).by_identifier().page_size(10).max_results(10);

    session
        .search_query(&query)
        .await?
        .into_iter()
        .find(|extension| extension.identifier().eq_ignore_ascii_case(identifier))
        .ok_or_else(|| anyhow!("Extension {} not found", identifier))
}

async fn download(session: &Session, identifiers: &[String], version: Option<&str>, out: &Path) -> Result<()> {
    let mut events = Box::pin(session.progress_events());
    let mut extensions = Vec::new();
    let mut failed = 0;

    for identifier in identifiers {
        match find_extension(session, identifier).await {
            Ok(extension) => extensions.push(extension),
            Err(err) => {
                warn!("{:#}", err);
                failed += 1;
            }
        }
    }

    let (mut bars, rejected) = enqueue_all(session, &extensions, version, out);
    failed += rejected;

    while !bars.is_empty() {
        let event = tokio::select! {
            event = events.next() => match event {
                Some(event) => event,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                for id in bars.keys() {
                    session.cancel(*id);
                }
                continue;
            }
        };

        let Some(bar) = bars.get_mut(&event.task_id) else {
            continue;
        };

        match event.state {
            TaskState::Queued | TaskState::Running => bar.print(event.bytes_downloaded, event.bytes_total)?,
            TaskState::Completed => {
                let (size, unit) = byte_unit(event.bytes_downloaded);
                bar.finish(&format!("done, {:.2} {}", size, unit))?;
                bars.remove(&event.task_id);
            }
            TaskState::Failed => {
                bar.finish(&format!("failed: {}", event.error.unwrap_or_default()))?;
                bars.remove(&event.task_id);
                failed += 1;
            }
            TaskState::Cancelled => {
                bar.finish("cancelled")?;
                bars.remove(&event.task_id);
            }
        }
    }

    if failed > 0 {
        return Err(anyhow!("{} download(s) failed", failed));
    }

    Ok(())
}

/// Queue every extension; rejected requests are logged and counted
fn enqueue_all(session: &Session, extensions: &[Extension], version: Option<&str>, out: &Path) -> (HashMap<TaskId, ProgressBar>, usize) {
    let mut bars = HashMap::new();
    let mut rejected = 0;

    for extension in extensions {
        let version = version.unwrap_or(extension.version());
        let target = out.join(extension.file_name(version));

        match session.download(extension, version, &target) {
            Ok(id) => {
                bars.insert(id, ProgressBar::new(format!("{} {}", extension.identifier(), version), BAR_WIDTH));
            }
            Err(err) => {
                warn!("{}", err);
                rejected += 1;
            }
        }
    }

    (bars, rejected)
}
