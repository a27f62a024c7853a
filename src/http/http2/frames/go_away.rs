use super::*;

#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub struct GoAway {
    pub last_stream_id: u32,
    pub error_code: ErrorCode,
    pub additional_debug_data: Vec<u8>,
}

impl GoAway {
    pub fn debug_message(&self) -> String {
        String::from_utf8_lossy(&self.additional_debug_data).to_string()
    }
}

impl FramePayload for GoAway {
    const KIND: FrameKind = FrameKind::GoAway;

    fn parse(bytes: &[u8], _flags: u8) -> Result<Self> {
        let (last_stream_id, rest) = take_array::<4>(bytes, Self::KIND)?;
        let (error_code, additional_debug_data) = take_array::<4>(rest, Self::KIND)?;

        Ok(Self {
            last_stream_id: read_stream_id(last_stream_id),
            error_code: ErrorCode::from(error_code),
            additional_debug_data: additional_debug_data.to_vec(),
        })
    }

    fn encode(self) -> Vec<u8> {
        let mut bytes = (self.last_stream_id & MAX_STREAM_ID).to_be_bytes().to_vec();
        bytes.extend(self.error_code.to_be_bytes());
        bytes.extend(self.additional_debug_data);

        bytes
    }
}
