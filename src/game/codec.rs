//! Newline-delimited JSON codec for the game link.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::common::error::LinkError;
use crate::game::frames::{InboundFrame, OutboundFrame};

/// Longest accepted line, newline excluded.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// A decoded line: a frame, or a line that was not a valid frame.
///
/// Malformed lines are reported per item so one bad frame does not end the
/// stream.
pub type DecodedLine = Result<InboundFrame, LinkError>;

/// Codec for game link frames.
#[derive(Debug, Default)]
pub struct JsonLineCodec {
    /// Bytes already scanned for a newline.
    next_index: usize,
}

impl JsonLineCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for JsonLineCodec {
    type Item = DecodedLine;
    type Error = LinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                if src.len() > MAX_FRAME_LEN {
                    return Err(LinkError::FrameTooLong {
                        len: src.len(),
                        max: MAX_FRAME_LEN,
                    });
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let newline = self.next_index + offset;
            self.next_index = 0;
            let line = src.split_to(newline + 1);
            let line = trim_line_end(&line);

            if line.len() > MAX_FRAME_LEN {
                return Err(LinkError::FrameTooLong {
                    len: line.len(),
                    max: MAX_FRAME_LEN,
                });
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let frame = serde_json::from_slice(line).map_err(|e| LinkError::InvalidFrame {
                message: e.to_string(),
            });
            return Ok(Some(frame));
        }
    }
}

impl Encoder<OutboundFrame> for JsonLineCodec {
    type Error = LinkError;

    fn encode(&mut self, item: OutboundFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        serde_json::to_writer(dst.writer(), &item).map_err(|e| LinkError::InvalidFrame {
            message: e.to_string(),
        })?;
        dst.put_u8(b'\n');
        Ok(())
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// A framed game link connection.
pub type LinkConnection<S> = Framed<S, JsonLineCodec>;

/// Create a new link connection from a stream.
pub fn new_link_connection<S: AsyncRead + AsyncWrite>(stream: S) -> LinkConnection<S> {
    Framed::new(stream, JsonLineCodec::new())
}
