use reqwest::StatusCode;
use thiserror::Error;

/// 市场查询中发生的错误
#[derive(Error, Debug)]
pub enum MarketplaceError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Marketplace API error{}: {message}", status_suffix(.status))]
    Api {
        status: Option<StatusCode>,
        message: String,
    },

    #[error("Invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Version {version} of {identifier} can not be resolved")]
    Resolution {
        identifier: String,
        version: String,
    },
}

impl MarketplaceError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Api { status: None, message: message.into() }
    }
}

fn status_suffix(status: &Option<StatusCode>) -> String {
    match status {
        Some(status) => format!(" (HTTP {})", status.as_u16()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_api_errors() {
        let err = MarketplaceError::Api {
            status: Some(StatusCode::BAD_GATEWAY),
            message: "upstream unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "Marketplace API error (HTTP 502): upstream unavailable");

        let err = MarketplaceError::malformed("missing results");
        assert_eq!(err.to_string(), "Marketplace API error: missing results");
    }

    #[test]
    fn should_display_resolution_errors() {
        let err = MarketplaceError::Resolution {
            identifier: "acme.widget".to_string(),
            version: "9.9.9".to_string(),
        };
        assert_eq!(err.to_string(), "Version 9.9.9 of acme.widget can not be resolved");
    }
}
