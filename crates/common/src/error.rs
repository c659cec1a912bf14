use thiserror::Error;

/// Errors surfaced across crate boundaries. Admission rejections and
/// transport failures are deliberately not here: the former is a structured
/// decision, the latter is handled locally by connection teardown.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;
