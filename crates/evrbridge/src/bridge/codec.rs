//! Line codec for helper communication.
//!
//! Uses LinesCodec for framing: requests are serialized to a JSON line, responses
//! come back as raw text lines and are decoded by the caller, which knows what
//! shape to expect. Works over any AsyncRead/AsyncWrite (pipes in practice).

use std::io;

use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use super::protocol::Request;

/// Default cap on a response line, matching the helper's historical 4 KiB reads.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

/// Codec that frames requests as JSON lines and yields response lines.
///
/// Responses split across several pipe reads are reassembled; a line longer
/// than the limit is reported as `InvalidData` instead of being truncated.
pub struct HelperCodec {
    inner: LinesCodec,
}

impl Default for HelperCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl HelperCodec {
    pub fn new(max_line_length: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_line_length),
        }
    }

    pub fn max_line_length(&self) -> usize {
        self.inner.max_length()
    }
}

fn into_io(err: LinesCodecError) -> io::Error {
    match err {
        LinesCodecError::MaxLineLengthExceeded => {
            io::Error::new(io::ErrorKind::InvalidData, "response line too long")
        }
        LinesCodecError::Io(e) => e,
    }
}

impl Decoder for HelperCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.inner.decode(src).map_err(into_io)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.inner.decode_eof(src).map_err(into_io)
    }
}

impl Encoder<Request> for HelperCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = serde_json::to_string(&item)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        tracing::trace!(bytes = line.len(), action = item.action(), "Encoding request");
        self.inner.encode(line, dst).map_err(into_io)
    }
}
