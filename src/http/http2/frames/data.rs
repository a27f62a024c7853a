use super::*;

/// DATA payload. Padding is kept so the frame can be re-encoded byte for byte,
/// but it is never delivered to the application.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Data {
    pub data: Vec<u8>,
    pub padding: Option<Vec<u8>>,
}

impl Data {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            padding: None,
        }
    }

    pub fn pad_length(&self) -> Option<u8> {
        pad_length(&self.padding)
    }
}

impl FramePayload for Data {
    const KIND: FrameKind = FrameKind::Data;

    fn parse(bytes: &[u8], flags: u8) -> Result<Self> {
        let (data, padding) = split_padding(bytes, flags)?;

        Ok(Self {
            data: data.to_vec(),
            padding,
        })
    }

    fn encode(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.data.len() + 1);
        let padding = encode_padding(&mut bytes, self.padding);
        bytes.extend(self.data);
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
