// MIT License - Copyright (c) 2026 Peter Wright
// Envisalink TPI client

//! Splits the inbound byte stream into frames.
//!
//! Frames end in CR LF and the protocol has no escaping, so a payload can
//! never contain the delimiter. A delimiter may be split across two reads;
//! the trailing CR is held back until the next chunk arrives.

use crate::codec::DELIMITER;
use crate::error::FrameError;

/// Default upper bound on a single frame.
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024;

/// Incremental CR LF framer.
#[derive(Debug)]
pub struct FrameReader {
    buf: Vec<u8>,
    max_frame_len: usize,
    // Set after an oversized frame was reported; bytes are dropped until
    // the next delimiter.
    discarding: bool,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_len,
            discarding: false,
        }
    }

    /// Feed a chunk and return every frame it completes, delimiter stripped.
    ///
    /// Empty frames (bare CR LF) are skipped. A frame longer than the limit
    /// yields one `FrameError::Oversized` and its bytes are discarded up to
    /// the next delimiter.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Vec<u8>, FrameError>> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = find_delimiter(&self.buf) {
            let frame: Vec<u8> = self.buf.drain(..pos + DELIMITER.len()).take(pos).collect();
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if frame.is_empty() {
                continue;
            }
            if frame.len() > self.max_frame_len {
                out.push(Err(FrameError::Oversized {
                    len: frame.len(),
                    max: self.max_frame_len,
                }));
                continue;
            }
            out.push(Ok(frame));
        }

        if self.buf.len() > self.max_frame_len {
            if !self.discarding {
                out.push(Err(FrameError::Oversized {
                    len: self.buf.len(),
                    max: self.max_frame_len,
                }));
                self.discarding = true;
            }
            // keep a trailing CR so a split delimiter still ends the discard
            let keep_cr = self.buf.last() == Some(&DELIMITER[0]);
            self.buf.clear();
            if keep_cr {
                self.buf.push(DELIMITER[0]);
            }
        }

        out
    }

    /// Number of bytes waiting for a delimiter.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }
}

fn find_delimiter(buf: &[u8]) -> Option<usize> {
    buf.windows(DELIMITER.len()).position(|w| w == DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(results: Vec<Result<Vec<u8>, FrameError>>) -> Vec<Vec<u8>> {
        results.into_iter().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_single_chunk_two_frames() {
        let mut reader = FrameReader::new();
        let out = frames(reader.push(b"5053CD\r\n6501CC\r\n"));
        assert_eq!(out, vec![b"5053CD".to_vec(), b"6501CC".to_vec()]);
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn test_every_split_point() {
        let stream = b"5053CD\r\n6501CC\r\n";
        for split in 0..=stream.len() {
            let mut reader = FrameReader::new();
            let mut out = frames(reader.push(&stream[..split]));
            out.extend(frames(reader.push(&stream[split..])));
            assert_eq!(
                out,
                vec![b"5053CD".to_vec(), b"6501CC".to_vec()],
                "split at {split}"
            );
        }
    }

    #[test]
    fn test_delimiter_split_across_reads() {
        let mut reader = FrameReader::new();
        assert!(reader.push(b"00191\r").is_empty());
        assert_eq!(reader.buffered(), 6);
        assert_eq!(frames(reader.push(b"\n")), vec![b"00191".to_vec()]);
    }

    #[test]
    fn test_empty_lines_skipped() {
        let mut reader = FrameReader::new();
        let out = frames(reader.push(b"\r\n\r\n00191\r\n\r\n"));
        assert_eq!(out, vec![b"00191".to_vec()]);
    }

    #[test]
    fn test_bare_lf_is_payload() {
        let mut reader = FrameReader::new();
        let out = frames(reader.push(b"abc\ndef\r\n"));
        assert_eq!(out, vec![b"abc\ndef".to_vec()]);
    }

    #[test]
    fn test_oversized_frame_discarded() {
        let mut reader = FrameReader::with_max_frame_len(8);
        let out = reader.push(b"0123456789");
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(FrameError::Oversized { max: 8, .. })));

        // rest of the long frame is dropped, following frame survives
        let out = reader.push(b"abc\r\n00191\r\n");
        assert_eq!(frames(out), vec![b"00191".to_vec()]);
    }

    #[test]
    fn test_oversized_complete_frame() {
        let mut reader = FrameReader::with_max_frame_len(5);
        let out = reader.push(b"0123456\r\n00191\r\n");
        assert_eq!(out.len(), 2);
        assert!(out[0].is_err());
        assert_eq!(out[1].as_ref().unwrap(), b"00191");
    }

    #[test]
    fn test_reset() {
        let mut reader = FrameReader::new();
        reader.push(b"partial");
        reader.reset();
        assert_eq!(reader.buffered(), 0);
        assert_eq!(frames(reader.push(b"00191\r\n")), vec![b"00191".to_vec()]);
    }
}
