//!
//! # 查询模块
//! 搜索条件以及发送给市场 API 的请求体
//!

use serde::Serialize;

/// Upper bound on results requested in one page
pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_PAGE_SIZE: usize = 10;

const FILTER_TYPE_PUBLISHER: u32 = 4;
const FILTER_TYPE_EXTENSION_NAME: u32 = 7;
const FILTER_TYPE_SEARCH_TEXT: u32 = 10;

const FLAG_INCLUDE_FILES: u32 = 0x2;
const FLAG_INCLUDE_LATEST_VERSION_ONLY: u32 = 0x200;
/// Metadata flags sent with every query
pub const QUERY_FLAGS: u32 = FLAG_INCLUDE_FILES | FLAG_INCLUDE_LATEST_VERSION_ONLY;

/// What the search term is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchFilter {
    Text,
    Publisher,
    /// Exact `publisher.name`
    Identifier,
}

impl SearchFilter {
    fn filter_type(self) -> u32 {
        match self {
            SearchFilter::Text => FILTER_TYPE_SEARCH_TEXT,
            SearchFilter::Publisher => FILTER_TYPE_PUBLISHER,
            SearchFilter::Identifier => FILTER_TYPE_EXTENSION_NAME,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    term: String,
    filter: SearchFilter,
    page_number: usize,
    page_size: usize,
    max_results: usize,
}

impl SearchQuery {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            filter: SearchFilter::Text,
            page_number: 1,
            page_size: DEFAULT_PAGE_SIZE,
            max_results: DEFAULT_PAGE_SIZE,
        }
    }

    /// Match the term against publisher names instead of free text
    pub fn by_publisher(mut self) -> Self {
        self.filter = SearchFilter::Publisher;
        self
    }

    /// Look up one extension by its full `publisher.name` identifier
    pub fn by_identifier(mut self) -> Self {
        self.filter = SearchFilter::Identifier;
        self
    }

    /// First page to fetch, 1-based; 0 is treated as 1
    pub fn page_number(mut self, page_number: usize) -> Self {
        self.page_number = page_number.max(1);
        self
    }

    /// Clamped to `1..=MAX_PAGE_SIZE`
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Total number of results wanted, possibly spanning several pages
    pub fn max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn filter(&self) -> SearchFilter {
        self.filter
    }

    pub fn first_page(&self) -> usize {
        self.page_number
    }

    pub fn get_page_size(&self) -> usize {
        self.page_size
    }

    pub fn get_max_results(&self) -> usize {
        self.max_results
    }

    pub(crate) fn payload(&self, page_number: usize) -> QueryPayload {
        QueryPayload {
            filters: vec![QueryFilter {
                criteria: vec![QueryCriterion {
                    filter_type: self.filter.filter_type(),
                    value: self.term.clone(),
                }],
                page_number,
                page_size: self.page_size,
                sort_by: 0,
                sort_order: 0,
            }],
            asset_types: Vec::new(),
            flags: QUERY_FLAGS,
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryPayload {
    filters: Vec<QueryFilter>,
    asset_types: Vec<String>,
    flags: u32,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QueryFilter {
    criteria: Vec<QueryCriterion>,
    page_number: usize,
    page_size: usize,
    sort_by: u32,
    sort_order: u32,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QueryCriterion {
    filter_type: u32,
    value: String,
}
