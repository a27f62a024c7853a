use super::*;

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq)]
pub struct Priority {
    pub is_exclusive: bool,
    pub stream_dependency: u32,
    pub weight: u8,
}

impl From<[u8; 5]> for Priority {
    fn from(bytes: [u8; 5]) -> Self {
        Self {
            is_exclusive: flag_is_present(RESERVED, bytes[0]),
            stream_dependency: read_stream_id([bytes[0], bytes[1], bytes[2], bytes[3]]),
            weight: bytes[4],
        }
    }
}

impl FramePayload for Priority {
    const KIND: FrameKind = FrameKind::Priority;

    fn parse(bytes: &[u8], _flags: u8) -> Result<Self> {
        let bytes = <[u8; 5]>::try_from(bytes)
            .map_err(|_| Error::frame_size("PRIORITY payload must be 5 bytes"))?;

        Ok(Self::from(bytes))
    }

    fn encode(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(5);
        let mut stream_dependency = (self.stream_dependency & MAX_STREAM_ID).to_be_bytes();
        if self.is_exclusive {
            stream_dependency[0] |= RESERVED;
        }
        bytes.extend(stream_dependency);
        bytes.push(self.weight);

        bytes
    }
}
