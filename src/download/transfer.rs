//!
//! # 传输模块
//! 把远端文件按固定大小的块写入目标路径旁的临时文件，成功后原子重命名
//!

use std::ffi::OsString;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::BytesMut;
use futures_util::StreamExt;
use headers::HeaderMapExt;
use log::{debug, warn};
use reqwest::{Client, Request};
use tokio::fs::File;
use tokio::io::{self, AsyncWriteExt};
use tokio::time::Instant;
use url::Url;

use crate::download::error::{DownloadEndCause, DownloadError};
use crate::download::resolver::DownloadUrlResolver;
use crate::download::task::{DownloadTask, ProgressSender};

type DownloadResult = Result<DownloadEndCause, DownloadError>;

const USER_AGENT: &str = concat!("vsix-downloader/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy)]
pub struct TransferOptions {
    pub chunk_size: NonZeroUsize,
    pub progress_interval: Duration,
}

/// `target.part` next to `target`
pub fn temp_path_for(target: &Path) -> PathBuf {
    let mut file_name = target.file_name().map(OsString::from).unwrap_or_default();
    file_name.push(".part");
    target.with_file_name(file_name)
}

fn create_http_request(url: Url) -> Request {
    let mut request = Request::new(reqwest::Method::GET, url);
    let header_map = request.headers_mut();

    header_map.insert(reqwest::header::ACCEPT, headers::HeaderValue::from_static("*/*"));
    header_map.insert(reqwest::header::USER_AGENT, headers::HeaderValue::from_static(USER_AGENT));
    header_map.typed_insert(headers::Connection::keep_alive());

    request
}

/// Run one task to its end. Only a `Finished` result leaves a file behind,
/// at the task's target path.
pub async fn transfer(
    task: &DownloadTask,
    client: &Client,
    resolver: &dyn DownloadUrlResolver,
    options: &TransferOptions,
    events: &ProgressSender,
) -> DownloadResult {
    let cancel_token = task.cancel_token();
    let url = tokio::select! {
        _ = cancel_token.cancelled() => return Ok(DownloadEndCause::Cancelled),
        url = resolver.resolve(&task.extension, &task.version) => url?,
    };

    let target_path = task.target_path();
    let temp_path = temp_path_for(&target_path);
    debug!("Task {} fetching {} into {}", task.id(), url, temp_path.display());

    let result = match fetch_to_file(task, client, url, &temp_path, options, events).await {
        Ok(DownloadEndCause::Finished) => tokio::fs::rename(&temp_path, &target_path)
            .await
            .map(|_| DownloadEndCause::Finished)
            .map_err(DownloadError::from),
        other => other,
    };

    if !matches!(result, Ok(DownloadEndCause::Finished)) {
        remove_temp_file(&temp_path).await;
    }

    result
}

async fn fetch_to_file(
    task: &DownloadTask,
    client: &Client,
    url: Url,
    temp_path: &Path,
    options: &TransferOptions,
    events: &ProgressSender,
) -> DownloadResult {
    let cancel_token = task.cancel_token();
    let response = tokio::select! {
        _ = cancel_token.cancelled() => return Ok(DownloadEndCause::Cancelled),
        response = client.execute(create_http_request(url)) => response?,
    };

    if !response.status().is_success() {
        return Err(DownloadError::HttpStatus(response.status()));
    }

    let bytes_total = response.content_length();
    task.record_progress(0, bytes_total, true, events);

    let mut file = File::create(temp_path).await?;
    let chunk_size = options.chunk_size.get();
    let mut buffer = BytesMut::with_capacity(chunk_size);
    let mut downloaded = 0u64;
    let mut last_emit = Instant::now();
    let mut stream = response.bytes_stream();

    loop {
        // 取消只在块边界上被观察到
        let item = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return Ok(DownloadEndCause::Cancelled),
            item = stream.next() => item,
        };

        let bytes = match item {
            Some(bytes) => bytes?,
            None => break,
        };
        buffer.extend_from_slice(&bytes);

        while buffer.len() >= chunk_size {
            let chunk = buffer.split_to(chunk_size);
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            let emit = last_emit.elapsed() >= options.progress_interval;
            if emit {
                last_emit = Instant::now();
            }
            task.record_progress(downloaded, bytes_total, emit, events);
        }
    }

    if !buffer.is_empty() {
        file.write_all(&buffer).await?;
        downloaded += buffer.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    check_complete(bytes_total, downloaded)?;
    task.record_progress(downloaded, bytes_total, true, events);

    Ok(DownloadEndCause::Finished)
}

/// A body that ends before its announced length is not a finished download.
/// hyper already fails short HTTP/1 bodies on its own; this covers a stream
/// that ends cleanly with fewer bytes.
fn check_complete(expected: Option<u64>, received: u64) -> Result<(), DownloadError> {
    match expected {
        Some(expected) if expected != received => Err(DownloadError::Incomplete { expected, received }),
        _ => Ok(()),
    }
}

async fn remove_temp_file(temp_path: &Path) {
    match tokio::fs::remove_file(temp_path).await {
        Ok(_) => debug!("Removed partial file {}", temp_path.display()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!("Failed to remove partial file {}: {}", temp_path.display(), err),
    }
}
