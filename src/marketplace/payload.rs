//!
//! # 响应模块
//! 市场 API 返回的原始 JSON 结构，字段全部可缺省，null 视同缺省，未知字段忽略
//!

use log::warn;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use crate::extension::Extension;

pub(crate) const VSIX_PACKAGE_ASSET: &str = "Microsoft.VisualStudio.Services.VSIXPackage";
const RESULT_COUNT_METADATA: &str = "ResultCount";
const TOTAL_COUNT_ITEM: &str = "TotalCount";

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct QueryResponse {
    pub results: Option<Vec<QueryResult>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct QueryResult {
    // 逐条解析，一条坏数据不影响整页
    #[serde(deserialize_with = "null_as_default")]
    pub extensions: Vec<Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub result_metadata: Vec<ResultMetadata>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ResultMetadata {
    pub metadata_type: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub metadata_items: Vec<MetadataItem>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct MetadataItem {
    pub name: Option<String>,
    pub count: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct RawExtension {
    pub publisher: Option<RawPublisher>,
    pub extension_name: Option<String>,
    pub display_name: Option<String>,
    pub short_description: Option<String>,
    pub last_updated: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub versions: Vec<RawVersion>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct RawPublisher {
    pub publisher_name: Option<String>,
    pub domain: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct RawVersion {
    pub version: Option<String>,
    pub asset_uri: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub files: Vec<RawFile>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct RawFile {
    pub asset_type: Option<String>,
    pub source: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Normalize one raw `extensions` entry; malformed entries are logged and
/// skipped
pub(crate) fn parse_extension(value: Value) -> Option<Extension> {
    match serde_json::from_value::<RawExtension>(value) {
        Ok(raw) => raw.into_extension(),
        Err(err) => {
            warn!("Skipping malformed marketplace entry: {}", err);
            None
        }
    }
}

impl QueryResult {
    /// `TotalCount` reported by the server, if any
    pub fn total_count(&self) -> Option<u64> {
        self.result_metadata
            .iter()
            .filter(|metadata| metadata.metadata_type.as_deref() == Some(RESULT_COUNT_METADATA))
            .flat_map(|metadata| metadata.metadata_items.iter())
            .find(|item| item.name.as_deref() == Some(TOTAL_COUNT_ITEM))
            .and_then(|item| item.count)
    }
}

impl RawVersion {
    fn download_url(&self) -> Option<String> {
        let direct = self.files
            .iter()
            .find(|file| file.asset_type.as_deref() == Some(VSIX_PACKAGE_ASSET))
            .and_then(|file| non_empty(file.source.as_deref()));

        direct.or_else(|| {
            non_empty(self.asset_uri.as_deref())
                .map(|uri| format!("{}/{}", uri.trim_end_matches('/'), VSIX_PACKAGE_ASSET))
        })
    }
}

impl RawExtension {
    /// Normalize into the model. Entries without a publisher, a name or a
    /// version can not be downloaded and yield `None`.
    pub fn into_extension(self) -> Option<Extension> {
        let publisher = self.publisher.unwrap_or_default();
        let publisher_name = non_empty(publisher.publisher_name.as_deref());
        let name = non_empty(self.extension_name.as_deref());
        let latest = self.versions.into_iter().next();
        let version = latest.as_ref().and_then(|latest| non_empty(latest.version.as_deref()));

        let (publisher_name, name, version, latest) = match (publisher_name, name, version, latest) {
            (Some(publisher_name), Some(name), Some(version), Some(latest)) => (publisher_name, name, version, latest),
            (publisher_name, name, _, _) => {
                warn!(
                    "Skipping marketplace entry without publisher, name or version: {}.{}",
                    publisher_name.unwrap_or_default(),
                    name.unwrap_or_default()
                );
                return None;
            }
        };

        let mut extension = Extension::new(publisher_name, name, version);
        if let Some(display_name) = non_empty(self.display_name.as_deref()) {
            extension = extension.with_display_name(display_name);
        }
        if let Some(description) = non_empty(self.short_description.as_deref()) {
            extension = extension.with_description(description);
        }
        if let Some(domain) = non_empty(publisher.domain.as_deref()) {
            extension = extension.with_domain(domain);
        }
        if let Some(last_updated) = non_empty(self.last_updated.as_deref()) {
            extension = extension.with_last_updated(last_updated);
        }
        if let Some(download_url) = latest.download_url() {
            extension = extension.with_download_url(download_url);
        }

        Some(extension)
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
