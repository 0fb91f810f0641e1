//! ftclient library
//!
//! Two-connection text transfer client: a control connection carries the
//! request (and any rejection), a data connection carries the payload, which
//! for files is terminated by an in-band end-of-file marker.

pub mod cli;
pub mod client;
pub mod config;
pub mod control;
pub mod error;
pub mod framer;
pub mod logger;
pub mod net;
pub mod progress;
pub mod protocol;
pub mod sink;

pub use client::{Client, TransferOutcome};
pub use error::TransferError;
pub use protocol::{Request, RequestKind};
