use super::*;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    pub priority: Option<Priority>,
    pub header_block: Vec<u8>,
    pub padding: Option<Vec<u8>>,
}

impl Headers {
    pub fn new(header_block: Vec<u8>) -> Self {
        Self {
            priority: None,
            header_block,
            padding: None,
        }
    }

    pub fn pad_length(&self) -> Option<u8> {
        pad_length(&self.padding)
    }
}

impl FramePayload for Headers {
    const KIND: FrameKind = FrameKind::Headers;

    fn parse(bytes: &[u8], flags: u8) -> Result<Self> {
        let (body, padding) = split_padding(bytes, flags)?;
        let (priority, header_block) = match flag_is_present(PRIORITY, flags) {
            true => {
                let (raw, rest) = take_array::<5>(body, Self::KIND)?;
                (Some(Priority::from(raw)), rest)
            }
            false => (None, body),
        };

        Ok(Self {
            priority,
            header_block: header_block.to_vec(),
            padding,
        })
    }

    fn encode(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.header_block.len() + 6);
        let padding = encode_padding(&mut bytes, self.padding);
        if let Some(priority) = self.priority {
            bytes.extend(priority.encode());
        }
        bytes.extend(self.header_block);
        bytes.extend(padding);

        bytes
    }

    fn flags(&self, flags: u8) -> u8 {
        let mut flags = flags & !(PADDED | PRIORITY);
        if self.padding.is_some() {
            flags |= PADDED;
        }
        if self.priority.is_some() {
            flags |= PRIORITY;
        }

        flags
    }
}
