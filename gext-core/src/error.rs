use thiserror::Error;

/// Errors surfaced by `gext-core`. Framing/codec/dispatch failures are
/// fatal for the connection; send-path failures are not (see
/// [`crate::runtime::Runtime::send_to_client`]).
#[derive(Debug, Error)]
pub enum GextError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("framing error: {0}")]
    Framing(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("could not resolve deferred packet identifier {0:?}")]
    Resolution(String),

    #[error("invalid state transition: {0}")]
    State(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GextError>;
