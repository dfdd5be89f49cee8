use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaytraceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("export error: {0}")]
    Export(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PaytraceError>;

impl From<std::io::Error> for PaytraceError {
    fn from(err: std::io::Error) -> Self {
        PaytraceError::Io(err.to_string())
    }
}
