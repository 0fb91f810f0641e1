//! ftclient - fetch a directory listing or a text file from an ftserver
//!
//! The server validates the request on the control connection and streams
//! the payload over a second connection on the port named in the request.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ftclient::cli::ClientArgs;
use ftclient::config::load_config;
use ftclient::logger::{NoopLogger, TextLogger, TransferLogger};
use ftclient::{Client, RequestKind, TransferError};

fn main() -> ExitCode {
    // First Ctrl-C stops the transfer so the temp file is cleaned up;
    // a second one exits at once
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            // Exit immediately with 130 (128 + SIGINT)
            std::process::exit(130);
        }
        eprintln!("\nInterrupted by user. Stopping transfer (Ctrl-C again to force)...");
    }) {
        eprintln!("warning: could not install Ctrl-C handler: {}", e);
    }

    let args = ClientArgs::parse();

    match run(&args, cancel) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<TransferError>() {
            // Server text is shown as-is
            Some(TransferError::Rejected(msg)) => {
                eprintln!("{}", msg);
                ExitCode::FAILURE
            }
            Some(TransferError::Cancelled) => {
                eprintln!("Transfer cancelled.");
                ExitCode::from(130)
            }
            _ => {
                eprintln!("Error: {:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

fn run(args: &ClientArgs, cancel: Arc<AtomicBool>) -> Result<()> {
    let request = args.validate()?;

    let mut config = load_config(args.config.as_deref())?;
    args.apply(&mut config);

    // Choose logger once; zero overhead with NoopLogger
    let logger: Arc<dyn TransferLogger> = match &config.log_file {
        Some(p) => Arc::new(
            TextLogger::new(p).with_context(|| format!("Failed to open log file {}", p.display()))?,
        ),
        None => Arc::new(NoopLogger),
    };

    if args.verbose {
        eprintln!("ftclient {}", env!("CARGO_PKG_VERSION"));
        eprintln!("  Host: {}", config.host_name(&args.host));
        eprintln!("  Control port: {}", args.control_port);
        eprintln!("  Data port: {}", args.data_port);
        eprintln!("  Request: {}", String::from_utf8_lossy(&request.encode()));
        eprintln!("  Control timeout: {}ms", config.control_timeout_ms);
        eprintln!("  On truncation: {:?}", config.truncation);
    }

    let client = Client::new(config)
        .with_logger(logger)
        .with_progress(args.progress)
        .with_announce(true)
        .with_cancel(cancel);
    let mut resolver = args.resolver();

    let outcome = client.run(
        &args.host,
        args.control_port,
        &request,
        args.output.as_deref(),
        resolver.as_mut(),
    )?;

    match outcome.kind {
        RequestKind::ListDirectory => {
            println!("{}", outcome.listing.unwrap_or_default());
        }
        RequestKind::FetchFile => {
            println!("File transfer complete.");
            if args.verbose {
                if let Some(dest) = &outcome.destination {
                    eprintln!(
                        "  {} bytes received, {} characters written to {} in {:.2}s",
                        outcome.bytes_received,
                        outcome.chars_written,
                        dest.display(),
                        outcome.elapsed.as_secs_f64()
                    );
                }
            }
        }
    }
    Ok(())
}
