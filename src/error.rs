//! Transfer error taxonomy
//!
//! Every variant is fatal to the transfer. `DestinationConflict` only escapes
//! when the conflict policy could neither overwrite nor rename.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("could not connect to {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Server-side validation failure, message reported verbatim.
    #[error("{0}")]
    Rejected(String),

    /// Data connection closed before the sentinel arrived.
    #[error("transfer truncated: connection closed after {received} bytes without end-of-file marker")]
    Truncated { received: u64 },

    #[error("destination {} already exists and no alternate name is free", .0.display())]
    DestinationConflict(PathBuf),

    /// Bytes that are not UTF-8 and not merely a split character.
    #[error("payload is not valid UTF-8 at byte {offset}")]
    Decode { offset: u64 },

    /// Interrupted locally (Ctrl-C) while waiting for data.
    #[error("transfer cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, TransferError>;

impl TransferError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, TransferError::Rejected(_))
    }
}
