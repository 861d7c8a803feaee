use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use url::Url;

use crate::extension::Extension;
use crate::marketplace::{MarketplaceClient, MarketplaceError};

/// Turns an (extension, version) pair into a fetchable url right before a
/// transfer starts.
pub trait DownloadUrlResolver: Send + Sync + 'static {
    fn resolve<'a>(&'a self, extension: &'a Extension, version: &'a str) -> BoxFuture<'a, Result<Url, MarketplaceError>>;
}

impl DownloadUrlResolver for MarketplaceClient {
    fn resolve<'a>(&'a self, extension: &'a Extension, version: &'a str) -> BoxFuture<'a, Result<Url, MarketplaceError>> {
        self.resolve_download_url(extension, version).boxed()
    }
}
