use crate::table::TableError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to parse JSON data from {url}")]
    JsonParse {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Weather provider failed: {0}")]
    Provider(String),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("Blocking file task failed")]
    TaskJoin(#[from] tokio::task::JoinError),
}
