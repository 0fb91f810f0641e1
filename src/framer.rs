//! Receive-side framing for sentinel-terminated text streams
//!
//! The data connection delivers arbitrary-sized chunks with no alignment to
//! character or sentinel boundaries. `StreamFramer` keeps two carry buffers
//! between chunks:
//! - `pending_bytes`: the tail of an incomplete UTF-8 sequence (at most 3 bytes)
//! - `pending_text`: decoded text that may be the start of the sentinel
//!
//! Both are re-prepended to the next chunk before anything else happens, so
//! the concatenated output is independent of how the stream was chunked.

use std::io;

use crate::error::{Result, TransferError};
use crate::protocol::SENTINEL;

/// Output of one `feed` call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    /// Text that is safe to write out: fully decoded, sentinel-free.
    pub text: String,
    /// True once the sentinel has been seen. Later input is ignored.
    pub done: bool,
}

#[derive(Debug)]
pub struct StreamFramer {
    sentinel: String,
    pending_bytes: Vec<u8>,
    pending_text: String,
    received: u64,
    decoded: u64,
    done: bool,
}

impl Default for StreamFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFramer {
    pub fn new() -> Self {
        Self::build(SENTINEL.to_string())
    }

    /// Frame on a different terminator. An empty one would end every stream
    /// at byte zero, so it is refused.
    pub fn with_sentinel(sentinel: impl Into<String>) -> Result<Self> {
        let sentinel = sentinel.into();
        if sentinel.is_empty() {
            return Err(TransferError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "end-of-file marker must not be empty",
            )));
        }
        Ok(Self::build(sentinel))
    }

    fn build(sentinel: String) -> Self {
        StreamFramer {
            sentinel,
            pending_bytes: Vec::new(),
            pending_text: String::new(),
            received: 0,
            decoded: 0,
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Raw bytes fed so far, including any after the sentinel.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Consume one chunk. Chunks must be fed in arrival order.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Frame> {
        self.received += chunk.len() as u64;
        if self.done {
            // Anything after the sentinel is not part of the payload
            return Ok(Frame {
                text: String::new(),
                done: true,
            });
        }

        let mut bytes = std::mem::take(&mut self.pending_bytes);
        bytes.extend_from_slice(chunk);

        let valid = match std::str::from_utf8(&bytes) {
            Ok(_) => bytes.len(),
            // error_len() == None: input ends mid-character, keep the tail
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                return Err(TransferError::Decode {
                    offset: self.decoded + e.valid_up_to() as u64,
                })
            }
        };
        self.pending_bytes = bytes.split_off(valid);
        self.decoded += valid as u64;
        let decoded = String::from_utf8(bytes).map_err(|e| TransferError::Decode {
            offset: self.decoded - valid as u64 + e.utf8_error().valid_up_to() as u64,
        })?;

        let mut text = std::mem::take(&mut self.pending_text);
        text.push_str(&decoded);

        if let Some(idx) = text.find(self.sentinel.as_str()) {
            text.truncate(idx);
            self.pending_bytes.clear();
            self.done = true;
            return Ok(Frame { text, done: true });
        }

        let held = sentinel_prefix_len(&text, &self.sentinel);
        self.pending_text = text.split_off(text.len() - held);
        Ok(Frame { text, done: false })
    }

    /// Call when the peer closes the connection. Errors unless the sentinel
    /// was already observed.
    pub fn finish(&self) -> Result<()> {
        if self.done {
            Ok(())
        } else {
            Err(TransferError::Truncated {
                received: self.received,
            })
        }
    }

    /// Drain whatever is still held back after a truncated stream: the
    /// withheld sentinel-like text plus any split character (lossily).
    pub fn take_remainder(&mut self) -> String {
        let mut rest = std::mem::take(&mut self.pending_text);
        let bytes = std::mem::take(&mut self.pending_bytes);
        rest.push_str(&String::from_utf8_lossy(&bytes));
        rest
    }
}

/// Length of the longest strict prefix of `sentinel` that `text` ends with.
fn sentinel_prefix_len(text: &str, sentinel: &str) -> usize {
    let max = sentinel.len().saturating_sub(1).min(text.len());
    (1..=max)
        .rev()
        .find(|&k| sentinel.is_char_boundary(k) && text.ends_with(&sentinel[..k]))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(chunks: &[&[u8]]) -> (String, bool) {
        let mut framer = StreamFramer::new();
        let mut out = String::new();
        for chunk in chunks {
            let frame = framer.feed(chunk).unwrap();
            out.push_str(&frame.text);
            if frame.done {
                return (out, true);
            }
        }
        (out, false)
    }

    #[test]
    fn test_sentinel_split_across_chunks() {
        let (out, done) = run(&[b"hello wor", b"ld@@EO", b"F@@"]);
        assert_eq!(out, "hello world");
        assert!(done);
    }

    #[test]
    fn test_done_only_after_last_piece() {
        let mut framer = StreamFramer::new();
        assert!(!framer.feed(b"hello wor").unwrap().done);
        let second = framer.feed(b"ld@@EO").unwrap();
        assert_eq!(second.text, "ld");
        assert!(!second.done);
        let third = framer.feed(b"F@@").unwrap();
        assert_eq!(third.text, "");
        assert!(third.done);
        assert!(framer.finish().is_ok());
    }

    #[test]
    fn test_three_byte_char_split() {
        let euro = "€".as_bytes();
        assert_eq!(euro.len(), 3);
        let mut second = vec![euro[2]];
        second.extend_from_slice(b"@@EOF@@");
        let (out, done) = run(&[&euro[..2], &second]);
        assert_eq!(out, "€");
        assert!(done);
    }

    #[test]
    fn test_false_sentinel_prefix_is_released() {
        let (out, done) = run(&[b"a@@E", b"x and more", b"@@EOF@@"]);
        assert_eq!(out, "a@@Ex and more");
        assert!(done);
    }

    #[test]
    fn test_overlapping_prefix() {
        // "@@@EOF@@" contains the sentinel starting at the second '@'
        let (out, done) = run(&[b"x@", b"@", b"@EOF@@"]);
        assert_eq!(out, "x@");
        assert!(done);
    }

    #[test]
    fn test_data_after_sentinel_is_dropped() {
        let mut framer = StreamFramer::new();
        let frame = framer.feed(b"body@@EOF@@trailing").unwrap();
        assert_eq!(frame.text, "body");
        assert!(frame.done);
        let after = framer.feed(b"more").unwrap();
        assert_eq!(after.text, "");
        assert!(after.done);
        assert_eq!(framer.received(), 23);
    }

    #[test]
    fn test_truncated_without_sentinel() {
        let mut framer = StreamFramer::new();
        let frame = framer.feed(b"partial data, no sentinel").unwrap();
        assert_eq!(frame.text, "partial data, no sentinel");
        match framer.finish() {
            Err(TransferError::Truncated { received }) => assert_eq!(received, 25),
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[test]
    fn test_remainder_after_truncation() {
        let mut framer = StreamFramer::new();
        let mut bytes = b"tail@@E".to_vec();
        bytes.extend_from_slice(&"é".as_bytes()[..1]);
        let frame = framer.feed(&bytes).unwrap();
        assert_eq!(frame.text, "tail");
        assert!(framer.finish().is_err());
        assert_eq!(framer.take_remainder(), "@@E\u{FFFD}");

        let mut framer = StreamFramer::new();
        let frame = framer.feed(b"tail@@E").unwrap();
        assert_eq!(frame.text, "tail");
        assert_eq!(framer.take_remainder(), "@@E");
    }

    #[test]
    fn test_invalid_utf8_is_fatal() {
        let mut framer = StreamFramer::new();
        framer.feed(b"ok ").unwrap();
        match framer.feed(&[b'a', 0xFF, b'b']) {
            Err(TransferError::Decode { offset }) => assert_eq!(offset, 4),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_sentinel() {
        let mut framer = StreamFramer::with_sentinel("<<END>>").unwrap();
        let a = framer.feed(b"abc<<EN").unwrap();
        assert_eq!(a.text, "abc");
        let b = framer.feed(b"D>>zzz").unwrap();
        assert!(b.done);
        assert_eq!(b.text, "");
    }

    #[test]
    fn test_single_chunk_matches_byte_by_byte() {
        let payload = "naïve café — 日本語 🦀 done@@EOF@@ignored".as_bytes();

        let (whole, whole_done) = run(&[payload]);

        let singles: Vec<&[u8]> = payload.chunks(1).collect();
        let (bytewise, bytewise_done) = run(&singles);

        assert!(whole_done && bytewise_done);
        assert_eq!(whole, bytewise);
        assert_eq!(whole, "naïve café — 日本語 🦀 done");
    }

    #[test]
    fn test_every_two_way_and_three_way_split() {
        let content = "ab€c🦀@d@@Eé";
        let mut payload = content.as_bytes().to_vec();
        payload.extend_from_slice(b"@@EOF@@after");
        let n = payload.len();

        for i in 0..=n {
            let (out, done) = run(&[&payload[..i], &payload[i..]]);
            assert!(done, "split at {}", i);
            assert_eq!(out, content, "split at {}", i);

            for j in i..=n {
                let (out, done) = run(&[&payload[..i], &payload[i..j], &payload[j..]]);
                assert!(done, "split at {},{}", i, j);
                assert_eq!(out, content, "split at {},{}", i, j);
            }
        }
    }

    #[test]
    fn test_empty_sentinel_refused() {
        match StreamFramer::with_sentinel("") {
            Err(TransferError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::InvalidInput),
            other => panic!("expected invalid input, got {:?}", other),
        }
        assert_eq!(sentinel_prefix_len("abc", ""), 0);
    }

    #[test]
    fn test_empty_chunks_are_harmless() {
        let (out, done) = run(&[b"", b"x@@", b"", b"EOF@@"]);
        assert_eq!(out, "x");
        assert!(done);
    }

    #[test]
    fn test_sentinel_prefix_len() {
        assert_eq!(sentinel_prefix_len("abc", SENTINEL), 0);
        assert_eq!(sentinel_prefix_len("abc@", SENTINEL), 1);
        assert_eq!(sentinel_prefix_len("abc@@EOF@", SENTINEL), 6);
        assert_eq!(sentinel_prefix_len("", SENTINEL), 0);
        assert_eq!(sentinel_prefix_len("@@E", SENTINEL), 3);
    }
}
