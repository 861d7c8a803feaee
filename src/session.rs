//!
//! # 会话模块
//! 展示层调用核心的唯一入口：搜索、下载、取消、订阅进度
//!

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::Stream;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::download::build_downloader;
use crate::download::downloader::Downloader;
use crate::download::error::EnqueueError;
use crate::download::task::{DownloadTaskState, ProgressEvent, TaskId};
use crate::extension::Extension;
use crate::marketplace::{MarketplaceClient, MarketplaceError, SearchQuery};

pub struct Session {
    client: Arc<MarketplaceClient>,
    downloader: Downloader,
    download_dir: PathBuf,
    page_size: usize,
    max_results: usize,
    scheduler_handle: JoinHandle<()>,
}

impl Session {
    /// Build the core from `config` and start the download scheduler on the
    /// current tokio runtime.
    pub fn start(config: &Config) -> Result<Self, MarketplaceError> {
        let client = Arc::new(MarketplaceClient::new(&config.marketplace)?);
        let (downloader, scheduler) = build_downloader(&config.download, client.clone());
        let scheduler_handle = tokio::spawn(async move {
            scheduler.run().await;
        });

        Ok(Self {
            client,
            downloader,
            download_dir: config.download.download_dir.clone(),
            page_size: config.marketplace.page_size(),
            max_results: config.marketplace.max_results,
            scheduler_handle,
        })
    }

    /// Free-text search with the configured page size and result limit
    pub async fn search(&self, term: &str) -> Result<Vec<Extension>, MarketplaceError> {
        let query = SearchQuery::new(term)
            .page_size(self.page_size)
            .max_results(self.max_results);

        self.client.search(&query).await
    }

    pub async fn search_query(&self, query: &SearchQuery) -> Result<Vec<Extension>, MarketplaceError> {
        self.client.search(query).await
    }

    pub fn download(&self, extension: &Extension, version: &str, destination: impl Into<PathBuf>) -> Result<TaskId, EnqueueError> {
        self.downloader.enqueue(extension, version, destination)
    }

    /// Latest version of `extension` to `<download_dir>/<name>-<version>.vsix`
    pub fn download_to_dir(&self, extension: &Extension) -> Result<TaskId, EnqueueError> {
        let version = extension.version();
        let destination = self.download_dir.join(extension.file_name(version));

        self.downloader.enqueue(extension, version, destination)
    }

    pub fn cancel(&self, id: TaskId) {
        self.downloader.cancel(id);
    }

    pub fn progress_events(&self) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        self.downloader.progress_events()
    }

    pub fn task(&self, id: TaskId) -> Option<DownloadTaskState> {
        self.downloader.task(id)
    }

    pub fn tasks(&self) -> Vec<DownloadTaskState> {
        self.downloader.tasks()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.scheduler_handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use futures_util::StreamExt;
    use serde_json::json;
    use tempfile::TempDir;
    use super::*;

    use crate::config::{DownloadConfig, MarketplaceConfig};
    use crate::download::task::TaskState;
    use crate::test_support::MockServer;

    async fn start(catalog: Vec<serde_json::Value>) -> (MockServer, Session, TempDir) {
        let server = MockServer::start(catalog).await;
        let dir = TempDir::new().unwrap();
        let config = Config {
            marketplace: MarketplaceConfig {
                api_url: server.base_url().to_string(),
                ..MarketplaceConfig::default()
            },
            download: DownloadConfig {
                download_dir: dir.path().to_path_buf(),
                ..DownloadConfig::default()
            },
        };
        let session = Session::start(&config).unwrap();

        (server, session, dir)
    }

    #[tokio::test]
    async fn should_search_then_download() {
        // no file asset: the url comes from the gallery package endpoint
        let (_server, session, dir) = start(vec![json!({
            "publisher": { "publisherName": "acme" },
            "extensionName": "widget",
            "versions": [{ "version": MockServer::PUBLISHED_VERSION, "files": [] }]
        })])
        .await;

        let extensions = session.search("widget").await.unwrap();
        assert_eq!(extensions.len(), 1);
        assert_eq!(extensions[0].download_url(), None);

        let mut events = Box::pin(session.progress_events());
        let id = session.download_to_dir(&extensions[0]).unwrap();
        let last = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let event = events.next().await.unwrap();
                if event.task_id == id && event.state.is_terminal() {
                    return event;
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(last.state, TaskState::Completed);
        let content = std::fs::read(dir.path().join("widget-0.9.0.vsix")).unwrap();
        assert_eq!(content, MockServer::file_content());
        assert_eq!(session.tasks().len(), 1);

        session.cancel(id);
        assert_eq!(session.task(id).unwrap().state, TaskState::Completed);
    }

    #[tokio::test]
    async fn should_report_empty_search() {
        let (_server, session, _dir) = start(Vec::new()).await;
        assert!(session.search("foo").await.unwrap().is_empty());
    }
}
