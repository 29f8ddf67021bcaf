//! Error type shared by the registry, accessors, route resolver and persister.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Control channel used before `init` or after `clean`.
    #[error("network uninitialized")]
    Uninitialized,

    #[error("interface {0} not found")]
    NotFound(String),

    #[error("too many interfaces (limit {0})")]
    Capacity(usize),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{op} is not supported on {interface}")]
    Unsupported { op: &'static str, interface: String },

    #[error("interface {0} is not up and running")]
    DeviceDown(String),

    #[error("routing protocol error: {0}")]
    Protocol(String),

    #[error("{op} on {interface} rejected by kernel: {source}")]
    Kernel {
        op: &'static str,
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("lease client failed for {interface}: {reason}")]
    DelegateFailure { interface: String, reason: String },
}

impl Error {
    pub(crate) fn kernel(op: &'static str, interface: &str, source: io::Error) -> Self {
        Error::Kernel { op, interface: interface.to_owned(), source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
