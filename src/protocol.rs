//! Shared protocol constants and the control-channel request encoder
//!
//! Wire format (plaintext, sent once on the control connection):
//!   `<data_port> -l`             list the server's working directory
//!   `<data_port> -g <filename>`  fetch a text file
//!
//! The server answers on the control connection only to reject a request.
//! Payload flows over the data connection; file payloads end with [`SENTINEL`].

/// End-of-transfer marker appended by the server after file content.
/// Plain text, so a file containing it terminates early.
pub const SENTINEL: &str = "@@EOF@@";

/// Prefix of every server-side rejection message.
pub const REJECTION_MARKER: &str = "Invalid";

/// Default size of a single socket read.
pub const CHUNK_SIZE: usize = 1024;

/// Read size for a directory listing, which arrives as one message.
pub const LISTING_BUFFER: usize = 64 * 1024;

/// Ports below this are reserved; both sides refuse them.
pub const MIN_PORT: u16 = 1028;
pub const MAX_PORT: u16 = 65535;

// Centralized timeout constants
pub mod timeouts {
    // Window in which the server may write a rejection on the control channel (ms)
    pub const CONTROL_CLASSIFY_MS: u64 = 1000;

    // Granularity at which a blocked data read notices cancellation (ms)
    pub const CANCEL_POLL_MS: u64 = 250;

    // Connection establishment timeout (ms)
    pub const CONNECT_MS: u64 = 5000;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    ListDirectory,
    FetchFile,
}

impl RequestKind {
    pub fn flag(self) -> &'static str {
        match self {
            RequestKind::ListDirectory => "-l",
            RequestKind::FetchFile => "-g",
        }
    }
}

/// A single request, built once at the CLI boundary.
///
/// `filename` is present iff `kind` is [`RequestKind::FetchFile`]; the
/// constructors enforce that.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    kind: RequestKind,
    data_port: u16,
    filename: Option<String>,
}

impl Request {
    pub fn list(data_port: u16) -> Self {
        Request {
            kind: RequestKind::ListDirectory,
            data_port,
            filename: None,
        }
    }

    pub fn fetch(data_port: u16, filename: impl Into<String>) -> Self {
        Request {
            kind: RequestKind::FetchFile,
            data_port,
            filename: Some(filename.into()),
        }
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn data_port(&self) -> u16 {
        self.data_port
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Encode the control-channel request line. No trailing newline.
    pub fn encode(&self) -> Vec<u8> {
        let mut line = format!("{} {}", self.data_port, self.kind.flag());
        if let Some(name) = &self.filename {
            line.push(' ');
            line.push_str(name);
        }
        line.into_bytes()
    }
}

/// True if `port` is outside the range the server accepts.
pub fn port_out_of_range(port: u16) -> bool {
    !(MIN_PORT..=MAX_PORT).contains(&port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_fetch() {
        let req = Request::fetch(5000, "x.txt");
        assert_eq!(req.encode(), b"5000 -g x.txt");
    }

    #[test]
    fn test_encode_list() {
        let req = Request::list(5000);
        assert_eq!(req.encode(), b"5000 -l");
        assert_eq!(req.filename(), None);
    }

    #[test]
    fn test_encode_keeps_filename_verbatim() {
        // Spaces are not escaped; the server splits on the first two only
        let req = Request::fetch(30021, "dir/notes.txt");
        assert_eq!(
            String::from_utf8(req.encode()).unwrap(),
            "30021 -g dir/notes.txt"
        );
        assert_eq!(req.kind(), RequestKind::FetchFile);
        assert_eq!(req.data_port(), 30021);
    }

    #[test]
    fn test_port_range() {
        assert!(port_out_of_range(80));
        assert!(port_out_of_range(1027));
        assert!(!port_out_of_range(1028));
        assert!(!port_out_of_range(65535));
    }
}
