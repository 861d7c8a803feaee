//!
//! # 扩展模型
//! 市场搜索结果的归一化记录，构造后不可变
//!

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// One marketplace package at one version.
///
/// Built by the marketplace client from a raw search result. Every field is
/// private; a different version is a different `Extension`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    publisher: String,
    name: String,
    version: String,
    display_name: Option<String>,
    description: Option<String>,
    domain: Option<String>,
    last_updated: Option<String>,
    download_url: Option<String>,
}

impl Extension {
    pub fn new(publisher: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            publisher: publisher.into(),
            name: name.into(),
            version: version.into(),
            display_name: None,
            description: None,
            domain: None,
            last_updated: None,
            download_url: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_last_updated(mut self, last_updated: impl Into<String>) -> Self {
        self.last_updated = Some(last_updated.into());
        self
    }

    pub fn with_download_url(mut self, download_url: impl Into<String>) -> Self {
        self.download_url = Some(download_url.into());
        self
    }

    pub fn publisher(&self) -> &str {
        &self.publisher
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn last_updated(&self) -> Option<&str> {
        self.last_updated.as_deref()
    }

    pub fn download_url(&self) -> Option<&str> {
        self.download_url.as_deref()
    }

    /// `publisher.name`, the stable key of an extension across versions
    pub fn identifier(&self) -> String {
        format!("{}.{}", self.publisher, self.name)
    }

    /// Default artifact file name for `version`
    pub fn file_name(&self, version: &str) -> String {
        format!("{}-{}.vsix", self.name, version)
    }

    /// Markdown summary for a detail pane
    pub fn summary(&self) -> String {
        let last_updated = self
            .last_updated
            .as_deref()
            .and_then(parse_date)
            .map(|date| date.format("%B %d, %Y").to_string())
            .unwrap_or_else(|| "Not available".to_string());

        let lines = [
            format!("**{} (v{})**", self.display_name().unwrap_or(&self.name), self.version),
            String::new(),
            format!("**Publisher:** {}", self.publisher),
            format!("**Domain:** {}", self.domain().unwrap_or("Not specified")),
            format!("**Last Updated:** {}", last_updated),
            String::new(),
            "**Description:**".to_string(),
            self.description().unwrap_or("No description available.").to_string(),
        ];

        lines.join("\n")
    }
}

/// RFC 3339, or ISO 8601 without an offset
fn parse_date(value: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc3339(value)
        .map(|date| date.date_naive())
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").map(|date| date.date()))
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python() -> Extension {
        Extension::new("ms-python", "python", "2024.20.0")
            .with_display_name("Python")
            .with_domain("https://microsoft.com")
            .with_last_updated("2024-11-14T09:12:31.123Z")
            .with_description("Python language support")
    }

    #[test]
    fn should_join_identifier() {
        let extension = python();
        assert_eq!(extension.identifier(), "ms-python.python");
        assert_eq!(extension.file_name("2024.20.0"), "python-2024.20.0.vsix");
    }

    #[test]
    fn should_keep_absent_fields_absent() {
        let extension = Extension::new("acme", "widget", "0.1.0");
        assert_eq!(extension.display_name(), None);
        assert_eq!(extension.description(), None);
        assert_eq!(extension.download_url(), None);
    }

    #[test]
    fn should_format_summary() {
        let summary = python().summary();
        assert!(summary.starts_with("**Python (v2024.20.0)**"));
        assert!(summary.contains("**Last Updated:** November 14, 2024"));
        assert!(summary.ends_with("Python language support"));
    }

    #[test]
    fn should_fall_back_in_summary() {
        let summary = Extension::new("acme", "widget", "0.1.0")
            .with_last_updated("last tuesday")
            .summary();
        assert!(summary.starts_with("**widget (v0.1.0)**"));
        assert!(summary.contains("**Domain:** Not specified"));
        assert!(summary.contains("**Last Updated:** Not available"));
        assert!(summary.ends_with("No description available."));
    }

    #[test]
    fn should_accept_dates_without_offset() {
        for value in ["2024-11-14T09:12:31", "2024-11-14T09:12:31.5", "2024-11-14"] {
            let summary = Extension::new("acme", "widget", "0.1.0").with_last_updated(value).summary();
            assert!(summary.contains("**Last Updated:** November 14, 2024"), "{}", value);
        }
    }

    #[test]
    fn should_round_trip_json() {
        let extension = python().with_download_url("https://example.com/python.vsix");
        let json = serde_json::to_string(&extension).unwrap();
        let parsed: Extension = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, extension);
    }
}
