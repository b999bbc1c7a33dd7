use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Remote detector unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("Remote detector rejected the API key")]
    Unauthorized,

    #[error("Remote detector returned status {0}")]
    Status(StatusCode),

    #[error("Remote response was not valid JSON: {0}")]
    MalformedResponse(#[source] reqwest::Error),

    #[error("Remote response carries no predictions field")]
    MissingPredictions,
}
