//! Connector: plain blocking TCP for both the control and data connections

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{Result, TransferError};

/// Open a TCP connection to `host:port`. Single attempt per resolved
/// address, no retries; the last failure is reported.
pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let addr = format!("{}:{}", host, port);
    let resolved: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransferError::Connection {
            addr: addr.clone(),
            source,
        })?
        .collect();

    let mut last_err = io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");
    for sa in resolved {
        match TcpStream::connect_timeout(&sa, timeout) {
            Ok(stream) => {
                tune_socket(&stream);
                return Ok(stream);
            }
            Err(e) => last_err = e,
        }
    }
    Err(TransferError::Connection {
        addr,
        source: last_err,
    })
}

// Socket tuning: disable Nagle so the short request goes out at once, and
// enable keepalive so a vanished peer eventually errors the blocking read
#[allow(unused_variables)]
pub fn tune_socket(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
    #[cfg(unix)]
    {
        use std::os::fd::AsRawFd;
        let fd = stream.as_raw_fd();
        let keepalive: libc::c_int = 1;
        // SAFETY: fd is a live socket owned by `stream`; optval points to a c_int
        unsafe {
            let _ = libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_KEEPALIVE,
                &keepalive as *const _ as *const libc::c_void,
                std::mem::size_of_val(&keepalive) as libc::socklen_t,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_connect_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let stream = connect("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        assert!(stream.nodelay().unwrap());
        let (_peer, _) = listener.accept().unwrap();
    }

    #[test]
    fn test_connect_refused_is_connection_error() {
        let port = {
            let sock = TcpListener::bind("127.0.0.1:0").unwrap();
            sock.local_addr().unwrap().port()
        };
        match connect("127.0.0.1", port, Duration::from_secs(2)) {
            Err(TransferError::Connection { addr, .. }) => {
                assert_eq!(addr, format!("127.0.0.1:{}", port))
            }
            other => panic!("expected connection error, got {:?}", other),
        }
    }
}
