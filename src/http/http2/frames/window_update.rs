use super::*;

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq)]
pub struct WindowUpdate {
    pub window_size_increment: u32,
}

impl FramePayload for WindowUpdate {
    const KIND: FrameKind = FrameKind::WindowUpdate;

    fn parse(bytes: &[u8], _flags: u8) -> Result<Self> {
        let bytes = <[u8; 4]>::try_from(bytes)
            .map_err(|_| Error::frame_size("WINDOW_UPDATE payload must be 4 bytes"))?;

        Ok(Self {
            window_size_increment: read_stream_id(bytes),
        })
    }

    fn encode(self) -> Vec<u8> {
        (self.window_size_increment & MAX_STREAM_ID)
            .to_be_bytes()
            .to_vec()
    }
}
