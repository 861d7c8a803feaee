use std::sync::Arc;
use tokio::sync::Semaphore;
use async_channel::Receiver;
use log::{info, error};
use reqwest::Client;

use crate::download::downloader::DownloaderTasks;
use crate::download::error::DownloadEndCause;
use crate::download::resolver::DownloadUrlResolver;
use crate::download::task::{DownloadTask, ProgressSender, TaskState};
use crate::download::transfer::{transfer, TransferOptions};

pub struct Scheduler {
    tasks: DownloaderTasks,
    semaphore: Arc<Semaphore>,
    pending_receiver: Receiver<Arc<DownloadTask>>,
    // Client 内部拥有一个连接池，所有传输共用
    client: Client,
    resolver: Arc<dyn DownloadUrlResolver>,
    events: ProgressSender,
    options: TransferOptions,
}

impl Scheduler {
    pub fn new(
        tasks: DownloaderTasks,
        semaphore: Arc<Semaphore>,
        pending_receiver: Receiver<Arc<DownloadTask>>,
        resolver: Arc<dyn DownloadUrlResolver>,
        events: ProgressSender,
        options: TransferOptions,
    ) -> Self {
        Self {
            tasks,
            semaphore,
            pending_receiver,
            client: Client::new(),
            resolver,
            events,
            options,
        }
    }

    /// Start tasks in the order they were queued, one per free slot. Returns
    /// once every `Downloader` handle is gone.
    pub async fn run(self) {
        loop {
            // Wait for a task to become available
            let task = match self.pending_receiver.recv().await {
                Ok(task) => task,
                Err(_) => break
            };

            // Skip tasks cancelled while queued without waiting for a slot;
            // a resubmission of the same id has its own, later entry
            if task.state() != TaskState::Queued || !self.is_current(&task) {
                continue;
            }

            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break
            };

            // The task may have been cancelled while waiting for the slot
            if !task.transition(TaskState::Running, None, &self.events) {
                drop(permit);
                continue;
            }

            let client = self.client.clone();
            let resolver = self.resolver.clone();
            let events = self.events.clone();
            let options = self.options;

            tokio::spawn(async move {
                let result = transfer(&task, &client, resolver.as_ref(), &options, &events).await;
                let target = task.target_path();

                match result {
                    Ok(DownloadEndCause::Finished) => {
                        task.transition(TaskState::Completed, None, &events);
                        info!("Download completed: {}", target.display());
                    }
                    Ok(DownloadEndCause::Cancelled) => {
                        task.transition(TaskState::Cancelled, None, &events);
                        info!("Download cancelled: {}", target.display());
                    }
                    Err(err) => {
                        error!("Download failed: {}: {}", target.display(), err);
                        task.transition(TaskState::Failed, Some(err.to_string()), &events);
                    }
                }

                // Release
                drop(permit);
            });
        }

        info!("Download scheduler stopped");
    }

    /// The table still holds this very task and not a newer one with its id
    fn is_current(&self, task: &Arc<DownloadTask>) -> bool {
        self.tasks
            .get(&task.id())
            .is_some_and(|current| Arc::ptr_eq(current.value(), task))
    }
}
