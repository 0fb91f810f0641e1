//! Control-channel response classification
//!
//! The protocol has no acknowledgment envelope: the server either writes an
//! error promptly or stays silent while the payload goes over the data
//! connection. So the client races one bounded read against a timeout. A
//! server slower than the timeout is misread as acceptance; the timeout is
//! configurable for that reason.

use std::io::{self, ErrorKind, Read};
use std::net::TcpStream;
use std::time::Duration;

use crate::error::Result;
use crate::protocol::{CHUNK_SIZE, REJECTION_MARKER};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlResponse {
    /// Server refused the request; message is reported verbatim.
    Rejection(String),
    /// Nothing (or nothing recognizable) arrived in time.
    Acceptance,
}

/// A readable channel whose blocking reads can be bounded.
pub trait ControlChannel: Read {
    fn set_read_deadline(&mut self, timeout: Option<Duration>) -> io::Result<()>;
}

impl ControlChannel for TcpStream {
    fn set_read_deadline(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)
    }
}

/// Classify raw control bytes. Only a leading `Invalid` marks a rejection.
pub fn classify_bytes(bytes: &[u8]) -> ControlResponse {
    if bytes.starts_with(REJECTION_MARKER.as_bytes()) {
        let msg = String::from_utf8_lossy(bytes);
        ControlResponse::Rejection(msg.trim_end_matches(&['\0', '\r', '\n'][..]).to_string())
    } else {
        ControlResponse::Acceptance
    }
}

/// One read bounded by `timeout`. Timeout and orderly close both count as
/// acceptance. The channel is left in blocking mode again afterwards.
pub fn classify<C: ControlChannel>(conn: &mut C, timeout: Duration) -> Result<ControlResponse> {
    // A zero duration means "no timeout" to the socket API
    conn.set_read_deadline(Some(timeout.max(Duration::from_millis(1))))?;
    let mut buf = [0u8; CHUNK_SIZE];
    let read = loop {
        match conn.read(&mut buf) {
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            other => break other,
        }
    };
    conn.set_read_deadline(None)?;

    match read {
        Ok(n) => Ok(classify_bytes(&buf[..n])),
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
            Ok(ControlResponse::Acceptance)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;

    struct Scripted {
        reply: io::Result<Vec<u8>>,
        deadlines: Vec<Option<Duration>>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match &self.reply {
                Ok(bytes) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                Err(e) => Err(io::Error::new(e.kind(), "scripted")),
            }
        }
    }

    impl ControlChannel for Scripted {
        fn set_read_deadline(&mut self, timeout: Option<Duration>) -> io::Result<()> {
            self.deadlines.push(timeout);
            Ok(())
        }
    }

    #[test]
    fn test_classify_bytes() {
        assert_eq!(
            classify_bytes(b"Invalid command"),
            ControlResponse::Rejection("Invalid command".into())
        );
        assert_eq!(classify_bytes(b""), ControlResponse::Acceptance);
        assert_eq!(classify_bytes(b"hello"), ControlResponse::Acceptance);
        // Marker must lead the message
        assert_eq!(classify_bytes(b" Invalid"), ControlResponse::Acceptance);
    }

    #[test]
    fn test_rejection_strips_trailing_nul() {
        assert_eq!(
            classify_bytes(b"Invalid command. USAGE: <port> -l/-g [file]\0"),
            ControlResponse::Rejection("Invalid command. USAGE: <port> -l/-g [file]".into())
        );
    }

    #[test]
    fn test_timeout_is_acceptance_and_restores_blocking() {
        let mut chan = Scripted {
            reply: Err(io::Error::from(ErrorKind::WouldBlock)),
            deadlines: Vec::new(),
        };
        let resp = classify(&mut chan, Duration::from_millis(250)).unwrap();
        assert_eq!(resp, ControlResponse::Acceptance);
        assert_eq!(
            chan.deadlines,
            vec![Some(Duration::from_millis(250)), None]
        );
    }

    #[test]
    fn test_reset_is_an_error() {
        let mut chan = Scripted {
            reply: Err(io::Error::from(ErrorKind::ConnectionReset)),
            deadlines: Vec::new(),
        };
        assert!(classify(&mut chan, Duration::from_millis(10)).is_err());
    }

    #[test]
    fn test_classify_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut rejecting, _) = listener.accept().unwrap();
            rejecting.write_all(b"Invalid command").unwrap();
            let (silent, _) = listener.accept().unwrap();
            std::thread::sleep(Duration::from_millis(400));
            drop(silent);
            drop(rejecting);
        });

        let mut first = TcpStream::connect(addr).unwrap();
        assert_eq!(
            classify(&mut first, Duration::from_secs(1)).unwrap(),
            ControlResponse::Rejection("Invalid command".into())
        );

        let mut second = TcpStream::connect(addr).unwrap();
        assert_eq!(
            classify(&mut second, Duration::from_millis(100)).unwrap(),
            ControlResponse::Acceptance
        );
        server.join().unwrap();
    }
}
