use super::*;

pub const SETTINGS_HEADER_TABLE_SIZE: u16 = 0x01;
pub const SETTINGS_ENABLE_PUSH: u16 = 0x02;
pub const SETTINGS_MAX_CONCURRENT_STREAMS: u16 = 0x03;
pub const SETTINGS_INITIAL_WINDOW_SIZE: u16 = 0x04;
pub const SETTINGS_MAX_FRAME_SIZE: u16 = 0x05;
pub const SETTINGS_MAX_HEADER_LIST_SIZE: u16 = 0x06;

/// SETTINGS payload. An ACK carries no items.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Settings {
    pub items: Vec<Setting>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Setting {
    pub identifier: u16,
    pub value: u32,
}

impl Display for Setting {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.identifier {
            SETTINGS_HEADER_TABLE_SIZE => write!(f, "HEADER_TABLE_SIZE: {}", self.value),
            SETTINGS_ENABLE_PUSH => write!(f, "ENABLE_PUSH: {}", self.value),
            SETTINGS_MAX_CONCURRENT_STREAMS => write!(f, "MAX_CONCURRENT_STREAMS: {}", self.value),
            SETTINGS_INITIAL_WINDOW_SIZE => write!(f, "INITIAL_WINDOW_SIZE: {}", self.value),
            SETTINGS_MAX_FRAME_SIZE => write!(f, "MAX_FRAME_SIZE: {}", self.value),
            SETTINGS_MAX_HEADER_LIST_SIZE => write!(f, "MAX_HEADER_LIST_SIZE: {}", self.value),
            id => write!(f, "UNKNOWN({id:#x}): {}", self.value),
        }
    }
}

impl Setting {
    pub fn new(identifier: u16, value: u32) -> Self {
        Self { identifier, value }
    }

    fn encode(self) -> [u8; 6] {
        let id = self.identifier.to_be_bytes();
        let value = self.value.to_be_bytes();

        [id[0], id[1], value[0], value[1], value[2], value[3]]
    }
}

impl From<[u8; 6]> for Setting {
    fn from(bytes: [u8; 6]) -> Self {
        Self {
            identifier: u16::from_be_bytes([bytes[0], bytes[1]]),
            value: u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
        }
    }
}

impl From<(u16, u32)> for Setting {
    fn from((identifier, value): (u16, u32)) -> Self {
        Self { identifier, value }
    }
}

impl FramePayload for Settings {
    const KIND: FrameKind = FrameKind::Settings;

    fn parse(bytes: &[u8], _flags: u8) -> Result<Self> {
        if bytes.len() % 6 != 0 {
            return Err(Error::frame_size(
                "SETTINGS payload must be a multiple of 6 bytes",
            ));
        }
        let items = bytes
            .chunks_exact(6)
            .map(|chunk| {
                let mut raw = [0u8; 6];
                raw.copy_from_slice(chunk);
                Setting::from(raw)
            })
            .collect();

        Ok(Self { items })
    }

    fn encode(self) -> Vec<u8> {
        self.items.into_iter().flat_map(Setting::encode).collect()
    }
}
