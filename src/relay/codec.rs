/// Newline framing for the relay connection
///
/// Frames are split on raw bytes first and decoded as UTF-8 afterwards, so a
/// line that is not UTF-8 or is too long is reported as skipped while the
/// stream keeps going.

use bytes::BytesMut;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, Encoder};

/// Upper bound for a single inbound line
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// One inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Line(String),
    /// A line that could not be used, with the reason
    Skipped(String),
}

#[derive(Debug)]
pub struct RelayLineCodec {
    inner: AnyDelimiterCodec,
}

impl RelayLineCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            inner: AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), b"\n".to_vec(), max_length),
        }
    }

    fn classify(
        &self,
        chunk: Result<Option<impl AsRef<[u8]>>, AnyDelimiterCodecError>,
    ) -> Result<Option<Frame>, AnyDelimiterCodecError> {
        match chunk {
            Ok(Some(chunk)) => Ok(Some(match std::str::from_utf8(chunk.as_ref()) {
                Ok(line) => Frame::Line(line.trim_end_matches('\r').to_string()),
                Err(e) => Frame::Skipped(format!("invalid UTF-8: {}", e)),
            })),
            Ok(None) => Ok(None),
            // the inner codec discards up to the next newline and carries on
            Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => Ok(Some(Frame::Skipped(
                format!("line longer than {} bytes", self.inner.max_length()),
            ))),
            Err(e) => Err(e),
        }
    }
}

impl Default for RelayLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RelayLineCodec {
    type Item = Frame;
    type Error = AnyDelimiterCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        let chunk = self.inner.decode(src);
        self.classify(chunk)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        let chunk = self.inner.decode_eof(src);
        self.classify(chunk)
    }
}

impl Encoder<String> for RelayLineCodec {
    type Error = AnyDelimiterCodecError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner.encode(line, dst)
    }
}
