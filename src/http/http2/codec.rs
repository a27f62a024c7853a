use crate::http::http2::frames::*;
use crate::http::{Error, Result, Success};
use std::io::{Read, Write};
use tracing::{trace, warn};

/// Reads and writes whole frames over a byte stream.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: u32,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(crate::http::http2::settings::DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameCodec {
    /// `max_frame_size` is the largest payload this endpoint accepts.
    pub fn new(max_frame_size: u32) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    pub fn set_max_frame_size(&mut self, max_frame_size: u32) {
        self.max_frame_size = max_frame_size;
    }

    pub fn expect_frame_header<R: Read>(reader: &mut R) -> Result<[u8; HEADER_LEN]> {
        let mut buffer = [0; HEADER_LEN];
        reader.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    /// Reads the next frame. Frames of an unknown type are consumed and
    /// discarded, which is reported as `Ok(None)`.
    pub fn read_frame<R: Read>(&self, reader: &mut R) -> Result<Option<Frame>> {
        let raw = Self::expect_frame_header(reader)?;
        let (length, kind, flags, stream_identifier) = FrameHeader::split(&raw);
        if length > self.max_frame_size {
            return Err(Error::frame_size(&format!(
                "frame of {length} bytes exceeds the maximum of {}",
                self.max_frame_size
            )));
        }
        let payload = Self::try_read_buf(reader, length)?;
        let kind = match FrameKind::try_from(kind) {
            Ok(kind) => kind,
            Err(kind) => {
                warn!(kind, length, stream_id = stream_identifier, "discarding unknown frame");
                return Ok(None);
            }
        };
        let header = FrameHeader {
            length,
            kind,
            flags,
            stream_identifier,
        };
        trace!(%header, "read frame");

        Frame::parse(header, &payload).map(Some)
    }

    pub fn write_frame<W: Write>(writer: &mut W, frame: Frame) -> Success {
        trace!(header = %frame.header, "write frame");
        writer.write_all(&frame.encode())?;

        Ok(())
    }

    pub fn write_preface<W: Write>(writer: &mut W) -> Success {
        writer.write_all(PREFACE)?;

        Ok(())
    }

    /// Reads exactly the preface length and compares it byte for byte.
    pub fn expect_preface<R: Read>(reader: &mut R) -> Success {
        let received = Self::try_read_buf(reader, PREFACE.len())?;
        match received.as_slice() == PREFACE {
            true => Ok(()),
            false => Err(Error::protocol(
                ErrorCode::ProtocolError,
                "invalid connection preface",
            )),
        }
    }

    fn try_read_buf<R, T>(reader: &mut R, size: T) -> Result<Vec<u8>>
    where
        R: Read,
        T: TryInto<usize>,
    {
        let size = size
            .try_into()
            .map_err(|_| Error::user("could not convert buffer length to usize"))?;
        let mut buffer = vec![0; size];
        reader.read_exact(&mut buffer)?;

        Ok(buffer)
    }
}
