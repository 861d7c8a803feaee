use std::sync::Arc;
use dashmap::DashMap;
use async_channel::unbounded;
use tokio::sync::Semaphore;

use crate::config::DownloadConfig;
use crate::download::resolver::DownloadUrlResolver;
use crate::download::task::ProgressSender;
use crate::download::transfer::TransferOptions;

pub mod downloader;
pub mod error;
pub mod resolver;
pub mod scheduler;
pub mod task;
pub mod transfer;

/// Wire up the two halves of the download manager. The scheduler must be
/// spawned for queued tasks to start.
pub fn build_downloader(config: &DownloadConfig, resolver: Arc<dyn DownloadUrlResolver>) -> (downloader::Downloader, scheduler::Scheduler) {
    let tasks = Arc::new(DashMap::new());
    let (pending_sender, pending_receiver) = unbounded();
    let events = ProgressSender::default();
    let semaphore = Arc::new(Semaphore::new(config.slots().get()));
    let options = TransferOptions {
        chunk_size: config.chunk_size(),
        progress_interval: config.progress_interval(),
    };

    let downloader = downloader::Downloader::new(tasks.clone(), pending_sender, events.clone());
    let scheduler = scheduler::Scheduler::new(
        tasks,
        semaphore,
        pending_receiver,
        resolver,
        events,
        options,
    );

    (downloader, scheduler)
}
