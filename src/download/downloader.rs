use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_channel::Sender;
use dashmap::DashMap;
use futures_util::Stream;
use log::{info, warn};
use parking_lot::Mutex;

use crate::download::error::EnqueueError;
use crate::download::task::{DownloadTask, DownloadTaskState, ProgressEvent, ProgressSender, TaskId, TaskState};
use crate::extension::Extension;

pub type DownloaderTasks = Arc<DashMap<TaskId, Arc<DownloadTask>>>;

/// Caller-facing half of the download manager: submits and cancels tasks,
/// hands out snapshots and event subscriptions. The scheduler owns the
/// transfers.
pub struct Downloader {
    tasks: DownloaderTasks,
    // 队列里放的是任务本身而不是 id：取消后重新提交的同一个 id 是新任务，
    // 排在队尾，旧的条目被调度器按状态跳过
    pending_sender: Sender<Arc<DownloadTask>>,
    events: ProgressSender,
    // 检查重复与插入必须是一个原子步骤
    enqueue_lock: Mutex<()>,
}

impl Downloader {
    pub fn new(tasks: DownloaderTasks, pending_sender: Sender<Arc<DownloadTask>>, events: ProgressSender) -> Self {
        Self {
            tasks,
            pending_sender,
            events,
            enqueue_lock: Mutex::new(()),
        }
    }

    /// Queue `version` of `extension` for download to `target_path`.
    ///
    /// Returns as soon as the task is queued. A second request for the same
    /// extension and version is rejected while the first is still queued or
    /// running; once it has ended, a new request starts over.
    pub fn enqueue(&self, extension: &Extension, version: &str, target_path: impl Into<PathBuf>) -> Result<TaskId, EnqueueError> {
        let target_path = target_path.into();
        check_target_writable(&target_path)?;

        let _guard = self.enqueue_lock.lock();
        let id = TaskId::derive(extension, version);

        if let Some(existing) = self.tasks.get(&id) {
            if !existing.state().is_terminal() {
                return Err(EnqueueError::RejectedDuplicate {
                    id,
                    identifier: extension.identifier(),
                    version: version.to_string(),
                });
            }
        }

        let path_taken = self.tasks
            .iter()
            .any(|entry| *entry.key() != id && !entry.state().is_terminal() && entry.is_at(&target_path));
        if path_taken {
            return Err(EnqueueError::TargetInUse(target_path));
        }

        let task = Arc::new(DownloadTask::new(extension.clone(), version.to_string(), target_path));
        self.tasks.insert(id, task.clone());
        task.announce(&self.events);

        if self.pending_sender.try_send(task).is_err() {
            self.tasks.remove(&id);
            return Err(EnqueueError::QueueClosed);
        }

        info!("Queued {} {} as task {}", extension.identifier(), version, id);

        Ok(id)
    }

    /// Cancel a queued or running task. Ended and unknown tasks are left
    /// alone.
    pub fn cancel(&self, id: TaskId) {
        let task = match self.tasks.get(&id) {
            Some(task) => task.clone(),
            None => {
                warn!("Cancel requested for unknown task {}", id);
                return;
            }
        };

        match task.state() {
            TaskState::Queued => {
                // 调度器取到它时会跳过
                if !task.transition(TaskState::Cancelled, None, &self.events) {
                    task.cancel_token().cancel();
                }
            }
            TaskState::Running => task.cancel_token().cancel(),
            _ => {}
        }
    }

    /// Events published from now on, for every task. Each call is an
    /// independent subscription that buffers until read; it ends once the
    /// download manager is gone.
    pub fn progress_events(&self) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        let receiver = self.events.subscribe();

        async_stream::stream! {
            while let Ok(event) = receiver.recv().await {
                yield event;
            }
        }
    }

    pub fn task(&self, id: TaskId) -> Option<DownloadTaskState> {
        self.tasks.get(&id).map(|task| task.snapshot())
    }

    pub fn tasks(&self) -> Vec<DownloadTaskState> {
        self.tasks.iter().map(|entry| entry.snapshot()).collect()
    }

    /// Number of transfers holding a slot
    pub fn active_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|entry| entry.state() == TaskState::Running)
            .count()
    }

    pub fn remove_finished_tasks(&self) {
        let _guard = self.enqueue_lock.lock();
        self.tasks.retain(|_, task| !task.state().is_terminal());
    }
}

fn check_target_writable(path: &Path) -> Result<(), EnqueueError> {
    let not_writable = |reason: String| EnqueueError::TargetNotWritable {
        path: path.to_path_buf(),
        reason,
    };

    if path.file_name().is_none() {
        return Err(not_writable("path has no file name".to_string()));
    }
    if path.is_dir() {
        return Err(not_writable("path is a directory".to_string()));
    }

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let metadata = fs::metadata(parent).map_err(|err| not_writable(err.to_string()))?;
    if !metadata.is_dir() {
        return Err(not_writable(format!("{} is not a directory", parent.display())));
    }
    if metadata.permissions().readonly() {
        return Err(not_writable(format!("{} is read-only", parent.display())));
    }

    Ok(())
}
