//! Server error types

use thiserror::Error;

use lavavu_core::LavaVuError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("no free port from {start} after {retries} attempts")]
    PortExhausted { start: u16, retries: u32 },

    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    #[error("server runtime failed: {0}")]
    Runtime(String),

    #[error("session is gone")]
    SessionGone,

    #[error(transparent)]
    Session(#[from] LavaVuError),
}

pub type ServerResult<T> = Result<T, ServerError>;
