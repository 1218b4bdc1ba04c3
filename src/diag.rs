use thiserror::Error;

/// Backend failure categories. Malformed IR is logged and survived
/// (best-effort emission); the rest surface through `Result`.
#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("malformed IR: {0}")]
    MalformedIr(String),

    #[error("scratch register pool exhausted: {0}")]
    ScratchExhausted(String),

    #[error("unsupported construct: {0}")]
    Unsupported(String),

    #[error("value {0} has neither a register nor a memory address")]
    UnplacedValue(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

macro_rules! log_error {
    ($($arg:tt)*) => {
        eprintln!("[ERROR] {}", format!($($arg)*))
    };
}

pub(crate) use log_error;
