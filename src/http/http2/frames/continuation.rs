use super::*;

#[derive(Debug, Clone, Default, Ord, PartialOrd, Eq, PartialEq)]
pub struct Continuation {
    pub header_block: Vec<u8>,
}

impl FramePayload for Continuation {
    const KIND: FrameKind = FrameKind::Continuation;

    fn parse(bytes: &[u8], _flags: u8) -> Result<Self> {
        Ok(Self {
            header_block: bytes.to_vec(),
        })
    }

    fn encode(self) -> Vec<u8> {
        self.header_block
    }
}
