use super::*;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushPromise {
    pub promised_stream_id: u32,
    pub header_block: Vec<u8>,
    pub padding: Option<Vec<u8>>,
}

impl FramePayload for PushPromise {
    const KIND: FrameKind = FrameKind::PushPromise;

    fn parse(bytes: &[u8], flags: u8) -> Result<Self> {
        let (body, padding) = split_padding(bytes, flags)?;
        let (promised_stream_id, header_block) = take_array::<4>(body, Self::KIND)?;

        Ok(Self {
            promised_stream_id: read_stream_id(promised_stream_id),
            header_block: header_block.to_vec(),
            padding,
        })
    }

    fn encode(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.header_block.len() + 5);
        let padding = encode_padding(&mut bytes, self.padding);
        bytes.extend((self.promised_stream_id & MAX_STREAM_ID).to_be_bytes());
        bytes.extend(self.header_block);
        bytes.extend(padding);

        bytes
    }

    fn flags(&self, flags: u8) -> u8 {
        match self.padding {
            Some(_) => flags | PADDED,
            None => flags & !PADDED,
        }
    }
}
