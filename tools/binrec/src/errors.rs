use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordStreamError {
    #[error("record stream already started on {0}, finish it before next usage")]
    HandlerAlreadyActive(String),
    #[error("error opening {target}: {reason}")]
    HandlerOpenFailed { target: String, reason: String },
    #[error("no active handle: {0}")]
    NoActiveHandle(String),
    #[error("wrong mode: {0}")]
    WrongMode(String),
    #[error("corrupt data in {target}: {reason}")]
    CorruptData { target: String, reason: String },
    #[error("record stream dropped before finishing {0}")]
    MisuseOnTeardown(String),
    #[error("error closing {target}: {reason}")]
    CloseFailed { target: String, reason: String },
    #[error("record too large: {0}")]
    RecordTooLarge(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
}
