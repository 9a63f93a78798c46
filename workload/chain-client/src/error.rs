use reqwest::StatusCode;
use thiserror::Error;

/// Unified error surfaced when talking to a node's RPC endpoint.
#[derive(Debug, Error)]
pub enum RpcClientError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected HTTP status: {0}")]
    HttpStatus(StatusCode),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("rpc response carried neither result nor error")]
    EmptyResponse,
    #[error("failed to decode rpc result: {0}")]
    Decode(#[from] serde_json::Error),
}
