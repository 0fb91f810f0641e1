use anyhow::Result;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Transfer event hooks. Every method defaults to a no-op.
pub trait TransferLogger: Send + Sync {
    fn connect(&self, _channel: &str, _addr: &str) {}
    fn request_sent(&self, _request: &str) {}
    fn rejected(&self, _msg: &str) {}
    fn accepted(&self) {}
    fn data_open(&self, _addr: &str) {}
    fn chunk(&self, _bytes: usize) {}
    fn complete(&self, _dest: &Path, _bytes: u64, _seconds: f64) {}
    fn truncated(&self, _bytes: u64, _kept: Option<&Path>) {}
    fn error(&self, _context: &str, _msg: &str) {}
}

pub struct NoopLogger;
impl TransferLogger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl TransferLogger for TextLogger {
    fn connect(&self, channel: &str, addr: &str) {
        self.line(&format!("CONNECT channel={} addr={}", channel, addr));
    }
    fn request_sent(&self, request: &str) {
        self.line(&format!("REQUEST line={:?}", request));
    }
    fn rejected(&self, msg: &str) {
        self.line(&format!("REJECTED msg={:?}", msg));
    }
    fn accepted(&self) {
        self.line("ACCEPTED");
    }
    fn data_open(&self, addr: &str) {
        self.line(&format!("DATA_OPEN addr={}", addr));
    }
    // Per-chunk events are too chatty for the text log
    fn complete(&self, dest: &Path, bytes: u64, seconds: f64) {
        self.line(&format!(
            "COMPLETE dest={} bytes={} seconds={:.3}",
            dest.display(),
            bytes,
            seconds
        ));
    }
    fn truncated(&self, bytes: u64, kept: Option<&Path>) {
        match kept {
            Some(p) => self.line(&format!("TRUNCATED bytes={bytes} kept={}", p.display())),
            None => self.line(&format!("TRUNCATED bytes={bytes} discarded")),
        }
    }
    fn error(&self, context: &str, msg: &str) {
        self.line(&format!("ERROR ctx={} msg={}", context, msg));
    }
}
