//! Transfer orchestration: control connection, request, classification, then
//! the data connection for the payload.
//!
//! Sequence:
//!   connect(control) -> send request -> classify control response
//!   Rejection  -> Err(Rejected), no data connection is opened
//!   Acceptance -> connect(data) -> classify control again
//!              -> listing (one read) | file (framed loop)
//!   A leading `Invalid` on the data connection is a rejection as well.
//!
//! Both sockets and the temp file are owned by this call and released on
//! every return path.

use std::io::{self, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ClientConfig;
use crate::control::{classify, classify_bytes, ControlResponse};
use crate::error::{Result, TransferError};
use crate::framer::StreamFramer;
use crate::logger::{NoopLogger, TransferLogger};
use crate::net;
use crate::progress::ReceiveProgress;
use crate::protocol::{timeouts, Request, RequestKind, LISTING_BUFFER};
use crate::sink::{resolve_destination, ConflictResolver, FileSink, TruncationPolicy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub kind: RequestKind,
    /// Directory text, for listing requests.
    pub listing: Option<String>,
    /// Where the file landed, for fetch requests.
    pub destination: Option<PathBuf>,
    pub renamed: bool,
    pub bytes_received: u64,
    pub chars_written: u64,
    /// True only when the end-of-file marker was observed.
    pub complete: bool,
    pub elapsed: Duration,
}

pub struct Client {
    config: ClientConfig,
    logger: Arc<dyn TransferLogger>,
    show_progress: bool,
    announce: bool,
    cancel: Arc<AtomicBool>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Client {
            config,
            logger: Arc::new(NoopLogger),
            show_progress: false,
            announce: false,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked while waiting on the data connection. Setting it ends the
    /// transfer with `Cancelled` and the truncation policy applied.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn TransferLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_progress(mut self, on: bool) -> Self {
        self.show_progress = on;
        self
    }

    /// Print the user-facing status lines ("Receiving ...").
    pub fn with_announce(mut self, on: bool) -> Self {
        self.announce = on;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run one request against `host:control_port`.
    ///
    /// `output` overrides the local name for fetches (defaults to the remote
    /// filename). `resolver` is consulted only if that name already exists.
    pub fn run(
        &self,
        host: &str,
        control_port: u16,
        request: &Request,
        output: Option<&Path>,
        resolver: &mut dyn ConflictResolver,
    ) -> Result<TransferOutcome> {
        let result = self.run_inner(host, control_port, request, output, resolver);
        if let Err(e) = &result {
            if !e.is_rejection() {
                self.logger.error("transfer", &e.to_string());
            }
        }
        result
    }

    fn run_inner(
        &self,
        host: &str,
        control_port: u16,
        request: &Request,
        output: Option<&Path>,
        resolver: &mut dyn ConflictResolver,
    ) -> Result<TransferOutcome> {
        let start = Instant::now();
        let host = self.config.host_name(host);

        self.logger
            .connect("control", &format!("{}:{}", host, control_port));
        let mut control = net::connect(&host, control_port, self.config.connect_timeout())?;

        let line = request.encode();
        control.write_all(&line)?;
        control.flush()?;
        self.logger.request_sent(&String::from_utf8_lossy(&line));

        match classify(&mut control, self.config.control_timeout())? {
            ControlResponse::Rejection(msg) => {
                self.logger.rejected(&msg);
                return Err(TransferError::Rejected(msg));
            }
            ControlResponse::Acceptance => self.logger.accepted(),
        }

        // Settle the local name before the payload starts flowing
        let dest = match request.kind() {
            RequestKind::FetchFile => {
                let wanted = output
                    .map(Path::to_path_buf)
                    .or_else(|| request.filename().map(PathBuf::from))
                    .ok_or_else(|| {
                        io::Error::new(ErrorKind::InvalidInput, "fetch request without a filename")
                    })?;
                Some(resolve_destination(&wanted, resolver)?)
            }
            RequestKind::ListDirectory => None,
        };

        let data_addr = format!("{}:{}", host, request.data_port());
        self.logger.connect("data", &data_addr);
        let mut data = net::connect(&host, request.data_port(), self.config.connect_timeout())?;
        data.set_read_timeout(Some(self.poll_interval()))?;
        self.logger.data_open(&data_addr);

        // The server may still refuse once the data connection is up
        let late = classify(&mut control, self.config.control_timeout())?;
        if let ControlResponse::Rejection(msg) = late {
            self.logger.rejected(&msg);
            return Err(TransferError::Rejected(msg));
        }

        let mut outcome = match dest {
            None => {
                if self.announce {
                    println!("Receiving directory structure from {}", data_addr);
                }
                self.receive_listing(&mut data)?
            }
            Some(dest) => {
                if self.announce {
                    if dest.renamed {
                        println!("Writing \"{}.\"", dest.path.display());
                    }
                    println!(
                        "Receiving \"{}\" from {}",
                        request.filename().unwrap_or_default(),
                        data_addr
                    );
                }
                let mut outcome = self.receive_file(&mut data, &dest.path)?;
                outcome.renamed = dest.renamed;
                outcome
            }
        };
        outcome.elapsed = start.elapsed();
        Ok(outcome)
    }

    /// A listing is one message: one read, no sentinel framing.
    fn receive_listing(&self, data: &mut TcpStream) -> Result<TransferOutcome> {
        let mut buf = vec![0u8; LISTING_BUFFER.max(self.config.chunk_size)];
        let n = self.read_chunk(data, &mut buf)?;
        let bytes = &buf[..n];
        self.logger.chunk(n);

        if let ControlResponse::Rejection(msg) = classify_bytes(bytes) {
            self.logger.rejected(&msg);
            return Err(TransferError::Rejected(msg));
        }

        let mut listing = String::from_utf8_lossy(bytes).into_owned();
        if let Some(idx) = listing.find(self.config.sentinel.as_str()) {
            listing.truncate(idx);
        }
        Ok(TransferOutcome {
            kind: RequestKind::ListDirectory,
            chars_written: listing.chars().count() as u64,
            listing: Some(listing),
            destination: None,
            renamed: false,
            bytes_received: n as u64,
            complete: true,
            elapsed: Duration::ZERO,
        })
    }

    fn receive_file(&self, data: &mut TcpStream, dest: &Path) -> Result<TransferOutcome> {
        let start = Instant::now();
        let mut sink = FileSink::create(dest)?;
        let mut framer = StreamFramer::with_sentinel(self.config.sentinel.clone())?;
        let mut progress = if self.show_progress {
            ReceiveProgress::new("Waiting for data")
        } else {
            ReceiveProgress::hidden()
        };
        let mut buf = vec![0u8; self.config.chunk_size];

        let mut first = true;
        loop {
            let n = match self.read_chunk(data, &mut buf) {
                Ok(n) => n,
                Err(e) => return Err(self.fail(&progress, sink, &mut framer, e)),
            };
            if n == 0 {
                break;
            }
            self.logger.chunk(n);
            progress.add_bytes(n);

            // An error message in place of the file; nothing of it is payload
            if first {
                first = false;
                if let ControlResponse::Rejection(msg) = classify_bytes(&buf[..n]) {
                    progress.finish_error(&msg);
                    self.logger.rejected(&msg);
                    drop(sink);
                    return Err(TransferError::Rejected(msg));
                }
            }

            let frame = match framer.feed(&buf[..n]) {
                Ok(f) => f,
                Err(e) => return Err(self.fail(&progress, sink, &mut framer, e)),
            };
            if let Err(e) = sink.write_str(&frame.text) {
                return Err(self.fail(&progress, sink, &mut framer, e));
            }
            if frame.done {
                break;
            }
        }

        if let Err(e) = framer.finish() {
            return Err(self.fail(&progress, sink, &mut framer, e));
        }

        let chars_written = sink.chars_written();
        let path = sink.commit()?;
        progress.finish_success();
        self.logger
            .complete(&path, framer.received(), start.elapsed().as_secs_f64());
        Ok(TransferOutcome {
            kind: RequestKind::FetchFile,
            listing: None,
            destination: Some(path),
            renamed: false,
            bytes_received: framer.received(),
            chars_written,
            complete: true,
            elapsed: Duration::ZERO,
        })
    }

    /// Every error after the sink exists ends here: the spinner is closed,
    /// the truncation policy applied, and `err` passed on.
    fn fail(
        &self,
        progress: &ReceiveProgress,
        sink: FileSink,
        framer: &mut StreamFramer,
        err: TransferError,
    ) -> TransferError {
        match &err {
            TransferError::Truncated { .. } => {
                progress.finish_error("connection closed before end-of-file marker")
            }
            other => progress.finish_error(&other.to_string()),
        }
        self.give_up(sink, framer, err)
    }

    /// Apply the truncation policy to an unfinished sink and pass `err` on.
    fn give_up(
        &self,
        mut sink: FileSink,
        framer: &mut StreamFramer,
        err: TransferError,
    ) -> TransferError {
        let policy = self.config.truncation;
        if policy == TruncationPolicy::Keep {
            let rest = framer.take_remainder();
            if let Err(e) = sink.write_str(&rest) {
                self.logger.error("partial", &e.to_string());
            }
        }
        match sink.abandon(policy) {
            Ok(kept) => self.logger.truncated(framer.received(), kept.as_deref()),
            Err(e) => self.logger.error("partial", &e.to_string()),
        }
        err
    }

    /// Socket read timeout used to poll for cancellation; never longer than
    /// the configured data read timeout.
    fn poll_interval(&self) -> Duration {
        let poll = Duration::from_millis(timeouts::CANCEL_POLL_MS);
        match self.config.data_read_timeout() {
            Some(limit) => poll.min(limit.max(Duration::from_millis(1))),
            None => poll,
        }
    }

    /// Blocking read that retries on EINTR and wakes up every poll interval
    /// to check for cancellation. Only a configured data read timeout ends
    /// the wait; it surfaces as an I/O error.
    fn read_chunk(&self, stream: &mut TcpStream, buf: &mut [u8]) -> Result<usize> {
        let limit = self.config.data_read_timeout();
        let started = Instant::now();
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(TransferError::Cancelled);
            }
            match stream.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    if limit.map_or(false, |l| started.elapsed() >= l) {
                        return Err(e.into());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
