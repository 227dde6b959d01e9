//! Error types for feedmixer.

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use thiserror::Error;

/// Common error type for the aggregation core.
#[derive(Error, Debug)]
pub enum FeedmixerError {
    /// A referenced item or session does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// A feed could not be fetched or parsed from its upstream URL.
    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(String),

    /// A read or write against the item store or feed registry failed.
    #[error("persistence error: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, FeedmixerError>;

impl From<tokio_rusqlite::Error> for FeedmixerError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        FeedmixerError::Persistence(e.to_string())
    }
}

impl From<reqwest::Error> for FeedmixerError {
    fn from(e: reqwest::Error) -> Self {
        FeedmixerError::UpstreamFetch(e.to_string())
    }
}

impl actix_web::ResponseError for FeedmixerError {
    fn status_code(&self) -> StatusCode {
        match self {
            FeedmixerError::NotFound(_) => StatusCode::NOT_FOUND,
            FeedmixerError::UpstreamFetch(_) => StatusCode::BAD_GATEWAY,
            FeedmixerError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).body(self.to_string())
    }
}
