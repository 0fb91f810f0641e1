//! Command-line surface: `ftclient <host> <control-port> <data-port> (-l | -g <file>)`

use anyhow::{bail, Result};
use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::config::ClientConfig;
use crate::protocol::{port_out_of_range, Request, MAX_PORT, MIN_PORT};
use crate::sink::{AlwaysOverwrite, ConflictResolver, NeverOverwrite, StdinPrompt, TruncationPolicy};

/// Files must look like text; the payload is decoded as UTF-8.
const TEXT_EXTENSION: &str = ".txt";

#[derive(Clone, Debug, Parser)]
#[command(
    author,
    version,
    about = "Fetch a directory listing or a text file over a control + data connection pair"
)]
pub struct ClientArgs {
    /// Server host identifier
    pub host: String,

    /// Server control port
    pub control_port: u16,

    /// Port the server opens for the data connection
    pub data_port: u16,

    /// List the server's directory
    #[arg(short = 'l', long = "list", conflicts_with = "get", required_unless_present = "get")]
    pub list: bool,

    /// Fetch a text file
    #[arg(short = 'g', long = "get", value_name = "FILENAME")]
    pub get: Option<String>,

    /// Local name for the fetched file (default: the remote name)
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Config file (default: <config dir>/ftclient.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// How long to wait for a rejection on the control connection
    #[arg(long = "timeout-ms")]
    pub timeout_ms: Option<u64>,

    /// Keep data received before a truncated transfer as <file>.partial
    #[arg(long)]
    pub keep_partial: bool,

    /// Append transfer events to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Show a receive spinner
    #[arg(short, long)]
    pub progress: bool,

    /// Connection diagnostics on stderr
    #[arg(short, long, action = ArgAction::SetTrue)]
    pub verbose: bool,

    /// Overwrite an existing local file without asking
    #[arg(short = 'y', long, conflicts_with = "no_clobber")]
    pub yes: bool,

    /// Never overwrite; write to an alternate name instead
    #[arg(short = 'n', long = "no-clobber")]
    pub no_clobber: bool,
}

impl ClientArgs {
    /// Check ports and filename, and build the request.
    pub fn validate(&self) -> Result<Request> {
        if port_out_of_range(self.control_port) || port_out_of_range(self.data_port) {
            bail!(
                "Please choose a valid port between {} and {}.",
                MIN_PORT,
                MAX_PORT
            );
        }
        match &self.get {
            Some(name) if !name.contains(TEXT_EXTENSION) => {
                bail!("only text files can be fetched: {:?} is not a {} file", name, TEXT_EXTENSION)
            }
            Some(name) if self.list => bail!("-l and -g {} are mutually exclusive", name),
            Some(name) => Ok(Request::fetch(self.data_port, name.clone())),
            None if self.list => Ok(Request::list(self.data_port)),
            None => bail!("one of -l or -g <filename> is required"),
        }
    }

    /// Fold command-line overrides into the file config.
    pub fn apply(&self, cfg: &mut ClientConfig) {
        if let Some(ms) = self.timeout_ms {
            cfg.control_timeout_ms = ms;
        }
        if self.keep_partial {
            cfg.truncation = TruncationPolicy::Keep;
        }
        if let Some(p) = &self.log_file {
            cfg.log_file = Some(p.clone());
        }
    }

    pub fn resolver(&self) -> Box<dyn ConflictResolver> {
        if self.yes {
            Box::new(AlwaysOverwrite)
        } else if self.no_clobber {
            Box::new(NeverOverwrite)
        } else {
            Box::new(StdinPrompt)
        }
    }
}
