//!
//! # 市场客户端
//! 查询扩展市场、分页、把原始 JSON 归一化为 [`Extension`]
//!

use std::time::Duration;
use log::{debug, info};
use reqwest::{header, Client, StatusCode};
use url::Url;

use crate::config::MarketplaceConfig;
use crate::extension::Extension;
use crate::marketplace::payload::{parse_extension, QueryResponse, QueryResult};

pub mod error;
pub mod query;
mod payload;

pub use error::MarketplaceError;
pub use query::{SearchFilter, SearchQuery};

const QUERY_PATH: &str = "_apis/public/gallery/extensionquery";
const ACCEPT_API_VERSION: &str = "application/json;api-version=3.0-preview.1";

type Result<T> = std::result::Result<T, MarketplaceError>;

/// Client for the extension gallery API
#[derive(Clone)]
pub struct MarketplaceClient {
    // Client 内部带连接池，clone 复用
    client: Client,
    gallery_url: Url,
    timeout: Duration,
}

impl MarketplaceClient {
    pub fn new(config: &MarketplaceConfig) -> Result<Self> {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &MarketplaceConfig) -> Result<Self> {
        let gallery_url = Url::parse(&config.api_url)?;

        Ok(Self {
            client,
            gallery_url: with_trailing_slash(gallery_url),
            timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
        })
    }

    /// Run `query`, following pages until `max_results` are collected or
    /// the server runs out. No match is an empty `Vec`, not an error.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<Extension>> {
        let wanted = query.get_max_results();
        let page_size = query.get_page_size();
        let mut extensions = Vec::new();
        let mut page_number = query.first_page();
        // 服务端已经返回过的条目数（含被跳过的）
        let mut seen = ((page_number - 1) * page_size) as u64;

        while extensions.len() < wanted {
            let result = self.fetch_page(query, page_number).await?;
            let total_count = result.total_count();
            let received = result.extensions.len();
            seen += received as u64;

            extensions.extend(result.extensions.into_iter().filter_map(parse_extension));

            if received < page_size {
                break;
            }
            if total_count.is_some_and(|total| seen >= total) {
                break;
            }
            page_number += 1;
        }

        extensions.truncate(wanted);
        info!("Search '{}' returned {} extensions", query.term(), extensions.len());

        Ok(extensions)
    }

    async fn fetch_page(&self, query: &SearchQuery, page_number: usize) -> Result<QueryResult> {
        let url = self.gallery_url.join(QUERY_PATH)?;
        debug!("Query page {} of '{}' from {}", page_number, query.term(), url);

        let response = self.client
            .post(url)
            .header(header::ACCEPT, ACCEPT_API_VERSION)
            .timeout(self.timeout)
            .json(&query.payload(page_number))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MarketplaceError::Api {
                status: Some(status),
                message: if message.is_empty() {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                } else {
                    message
                },
            });
        }

        let body = response.bytes().await?;
        let response: QueryResponse = serde_json::from_slice(&body)
            .map_err(|err| MarketplaceError::malformed(format!("Malformed query response: {}", err)))?;

        match response.results {
            Some(results) => Ok(results.into_iter().next().unwrap_or_default()),
            None => Err(MarketplaceError::malformed("Query response has no results")),
        }
    }

    /// Direct URL of `version` of `extension`.
    ///
    /// The URL carried by the search result is used as is for its own
    /// version. Any other version goes through the gallery package endpoint,
    /// checked with a HEAD request first so an unpublished version fails here
    /// instead of midway through a transfer.
    pub async fn resolve_download_url(&self, extension: &Extension, version: &str) -> Result<Url> {
        let unresolvable = || MarketplaceError::Resolution {
            identifier: extension.identifier(),
            version: version.to_string(),
        };

        if version.trim().is_empty() {
            return Err(unresolvable());
        }

        if version == extension.version() {
            if let Some(url) = extension.download_url() {
                return Ok(Url::parse(url)?);
            }
        }

        let url = self.package_url(extension, version)?;
        let response = self.client
            .head(url.clone())
            .timeout(self.timeout)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(url),
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(unresolvable()),
            status => Err(MarketplaceError::Api {
                status: Some(status),
                message: format!("Failed to resolve {} {}", extension.identifier(), version),
            }),
        }
    }

    fn package_url(&self, extension: &Extension, version: &str) -> Result<Url> {
        let mut url = self.gallery_url.clone();
        url.path_segments_mut()
            .map_err(|_| MarketplaceError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend([
                "_apis", "public", "gallery", "publishers", extension.publisher(),
                "vsextensions", extension.name(), version, "vspackage",
            ]);

        Ok(url)
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
