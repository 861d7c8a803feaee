//!
//! # 下载任务模块
//! 任务标识、状态机以及对外只读的快照与进度事件
//!

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_channel::Receiver;
use log::info;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::extension::Extension;

/// Deterministic id of one (extension, version) artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Marketplace identifiers are case-insensitive, so is the id
    pub fn derive(extension: &Extension, version: &str) -> Self {
        let key = format!("{}@{}", extension.identifier(), version).to_lowercase();
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
    }

    fn can_become(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Queued, TaskState::Running)
                | (TaskState::Queued, TaskState::Cancelled)
                | (TaskState::Running, TaskState::Completed)
                | (TaskState::Running, TaskState::Failed)
                | (TaskState::Running, TaskState::Cancelled)
        )
    }
}

/// Read-only copy of a task handed to callers
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct DownloadTaskState {
    pub id: TaskId,
    pub identifier: String,
    pub version: String,
    pub target_path: PathBuf,
    pub state: TaskState,
    pub bytes_downloaded: u64,
    pub bytes_total: Option<u64>,
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct ProgressEvent {
    pub task_id: TaskId,
    pub bytes_downloaded: u64,
    pub bytes_total: Option<u64>,
    pub state: TaskState,
    pub error: Option<String>,
}

impl From<&DownloadTaskState> for ProgressEvent {
    fn from(state: &DownloadTaskState) -> Self {
        Self {
            task_id: state.id,
            bytes_downloaded: state.bytes_downloaded,
            bytes_total: state.bytes_total,
            state: state.state,
            error: state.error.clone(),
        }
    }
}

/// Fans progress events out to subscribers. Every subscriber owns an
/// unbounded queue: a slow reader only falls behind, it never loses events.
#[derive(Clone, Default)]
pub struct ProgressSender {
    subscribers: Arc<Mutex<Vec<async_channel::Sender<ProgressEvent>>>>,
}

impl ProgressSender {
    /// Events sent from now on
    pub fn subscribe(&self) -> Receiver<ProgressEvent> {
        let (sender, receiver) = async_channel::unbounded();
        self.subscribers.lock().push(sender);
        receiver
    }

    pub fn send(&self, event: ProgressEvent) {
        // 接收端已丢弃的订阅者在这里清理
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.try_send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

pub struct DownloadTask {
    pub extension: Extension,
    pub version: String,
    // 每次修改状态都在锁内发送事件，保证单个任务的事件顺序
    state: Mutex<DownloadTaskState>,
    cancel_token: CancellationToken,
}

impl DownloadTask {
    pub fn new(extension: Extension, version: String, target_path: PathBuf) -> Self {
        let state = DownloadTaskState {
            id: TaskId::derive(&extension, &version),
            identifier: extension.identifier(),
            version: version.clone(),
            target_path,
            state: TaskState::Queued,
            bytes_downloaded: 0,
            bytes_total: None,
            error: None,
        };

        Self {
            extension,
            version,
            state: Mutex::new(state),
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.state.lock().id
    }

    pub fn target_path(&self) -> PathBuf {
        self.state.lock().target_path.clone()
    }

    pub fn is_at(&self, path: &Path) -> bool {
        self.state.lock().target_path == path
    }

    pub fn state(&self) -> TaskState {
        self.state.lock().state
    }

    pub fn snapshot(&self) -> DownloadTaskState {
        self.state.lock().clone()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Announce the freshly queued task
    pub fn announce(&self, events: &ProgressSender) {
        let guard = self.state.lock();
        events.send(ProgressEvent::from(&*guard));
    }

    /// Move along the state machine. Returns `false`, and changes nothing,
    /// for a transition the machine does not allow.
    pub fn transition(&self, next: TaskState, error: Option<String>, events: &ProgressSender) -> bool {
        let mut guard = self.state.lock();
        if !guard.state.can_become(next) {
            return false;
        }

        info!("Task {} ({} {}): {:?} -> {:?}", guard.id, guard.identifier, guard.version, guard.state, next);
        guard.state = next;
        guard.error = error;
        events.send(ProgressEvent::from(&*guard));

        true
    }

    /// Record transferred bytes; an event goes out only when `emit` is set
    pub fn record_progress(&self, downloaded: u64, total: Option<u64>, emit: bool, events: &ProgressSender) {
        let mut guard = self.state.lock();
        if guard.state != TaskState::Running {
            return;
        }

        guard.bytes_downloaded = guard.bytes_downloaded.max(downloaded);
        guard.bytes_total = total;
        if emit {
            events.send(ProgressEvent::from(&*guard));
        }
    }
}
