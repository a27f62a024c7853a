use super::*;

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq)]
pub struct Ping {
    pub opaque_data: [u8; 8],
}

impl FramePayload for Ping {
    const KIND: FrameKind = FrameKind::Ping;

    fn parse(bytes: &[u8], _flags: u8) -> Result<Self> {
        let opaque_data = <[u8; 8]>::try_from(bytes)
            .map_err(|_| Error::frame_size("PING payload must be 8 bytes"))?;

        Ok(Self { opaque_data })
    }

    fn encode(self) -> Vec<u8> {
        self.opaque_data.to_vec()
    }
}
