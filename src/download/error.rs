use std::path::PathBuf;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::io;
use crate::download::task::TaskId;
use crate::marketplace::MarketplaceError;

/// 下载中发生的错误
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Http request failed: {0}")]
    HttpRequestFailed(#[from] reqwest::Error),

    #[error("Server responded with HTTP {}", .0.as_u16())]
    HttpStatus(StatusCode),

    #[error("Download url unavailable: {0}")]
    Resolution(#[from] MarketplaceError),

    #[error("IOError: {0}")]
    IOError(#[from] io::Error),

    #[error("Transfer incomplete: expected {expected} bytes, received {received}")]
    Incomplete { expected: u64, received: u64 },
}

/// 添加任务被拒绝的原因
#[derive(Error, Debug)]
pub enum EnqueueError {
    #[error("{identifier} {version} is already being downloaded (task {id})")]
    RejectedDuplicate {
        id: TaskId,
        identifier: String,
        version: String,
    },

    #[error("Another download is already writing to {}", .0.display())]
    TargetInUse(PathBuf),

    #[error("Can not write to {}: {reason}", .path.display())]
    TargetNotWritable { path: PathBuf, reason: String },

    #[error("Download queue is closed")]
    QueueClosed,
}

/// 下载结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadEndCause {
    Finished,
    Cancelled,
}
